//! REST route handlers that are not part of a feature module.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive
//! an OpenAPI document automatically. Authentication routes live in
//! [`crate::auth::routes`].

pub mod health;
