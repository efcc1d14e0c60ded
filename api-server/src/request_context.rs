//! Per-request identity storage.
//!
//! Every request gets exactly one [`RequestContext`], created on entry and
//! kept in Rocket's request-local cache. Code that runs without access to the
//! Rocket request (GraphQL resolvers, services) reaches the same instance
//! through a Tokio task-local installed by [`RequestContext::scope`]. Nothing
//! here is global, so concurrent requests never see each other's user.

use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::request::{FromRequest, Outcome};
use rocket::{Data, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::auth::jwt::TokenPair;
use crate::models::User;

tokio::task_local! {
    static CURRENT_REQUEST: Arc<RequestContext>;
}

#[derive(Debug, Default)]
pub struct RequestContext {
    authorization: Option<String>,
    user: RwLock<Option<User>>,
    issued_tokens: Mutex<Option<TokenPair>>,
}

impl RequestContext {
    pub fn new(authorization: Option<String>) -> Self {
        Self {
            authorization,
            ..Default::default()
        }
    }

    /// Snapshot the parts of the transport request that authentication needs.
    pub fn from_request(request: &Request<'_>) -> Self {
        Self::new(request.headers().get_one("Authorization").map(str::to_owned))
    }

    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    pub fn set_current_user(&self, user: User) {
        *self.user.write() = Some(user);
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.read().clone()
    }

    /// Remember the token pair issued while handling this request so the
    /// transport can mirror it into cookies. A request that issues several
    /// pairs (two token-issuing fields in one GraphQL document) keeps only
    /// the most recent one; every pair is still returned in the body.
    pub fn record_issued_tokens(&self, tokens: TokenPair) {
        *self.issued_tokens.lock() = Some(tokens);
    }

    pub fn take_issued_tokens(&self) -> Option<TokenPair> {
        self.issued_tokens.lock().take()
    }

    /// Run `future` with `self` installed as the ambient request context.
    pub async fn scope<F: Future>(self: Arc<Self>, future: F) -> F::Output {
        CURRENT_REQUEST.scope(self, future).await
    }

    /// The ambient context, or `None` outside [`RequestContext::scope`].
    pub fn current() -> Option<Arc<RequestContext>> {
        CURRENT_REQUEST.try_with(Arc::clone).ok()
    }
}

/// Store `user` in the ambient context. Returns `false` when called outside a
/// request scope, in which case nothing is stored.
pub fn set_current_user(user: User) -> bool {
    match RequestContext::current() {
        Some(context) => {
            context.set_current_user(user);
            true
        }
        None => false,
    }
}

/// The authenticated user of the ambient request, if any.
pub fn current_user() -> Option<User> {
    RequestContext::current().and_then(|context| context.current_user())
}

/// Fetch (or lazily create) the context attached to `request`.
pub fn request_context(request: &Request<'_>) -> Arc<RequestContext> {
    request
        .local_cache(|| Arc::new(RequestContext::from_request(request)))
        .clone()
}

/// Fairing that seeds the request context before any guard or handler runs.
pub struct RequestContextFairing;

#[rocket::async_trait]
impl Fairing for RequestContextFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request Context",
            kind: Kind::Request,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request_context(request);
    }
}

/// Request guard handing a route its [`RequestContext`].
#[derive(Debug, Clone)]
pub struct RequestScope(pub Arc<RequestContext>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestScope {
    type Error = std::convert::Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestScope(request_context(request)))
    }
}

impl<'r> OpenApiFromRequest<'r> for RequestScope {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            first_name: "A".into(),
            last_name: "B".into(),
            password_hash: "hash".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn outside_a_scope_there_is_no_user() {
        assert!(current_user().is_none());
        assert!(!set_current_user(user("nobody@example.com")));
        assert!(RequestContext::current().is_none());
    }

    #[test]
    fn the_latest_issued_pair_is_mirrored() {
        let context = RequestContext::default();
        let pair = |n: u8| TokenPair {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
        };

        context.record_issued_tokens(pair(1));
        context.record_issued_tokens(pair(2));

        assert_eq!(context.take_issued_tokens(), Some(pair(2)));
        assert_eq!(context.take_issued_tokens(), None);
    }

    #[tokio::test]
    async fn scope_exposes_the_context_ambiently() {
        let context = Arc::new(RequestContext::new(Some("Bearer abc".into())));
        let alice = user("alice@example.com");

        let seen = context
            .clone()
            .scope(async {
                assert!(current_user().is_none());
                assert!(set_current_user(alice.clone()));
                current_user()
            })
            .await;

        assert_eq!(seen, Some(alice.clone()));
        assert_eq!(context.current_user(), Some(alice));
        assert_eq!(context.authorization(), Some("Bearer abc"));
        assert!(current_user().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_never_share_identity() {
        let mut handles = Vec::new();
        for index in 0..64 {
            handles.push(tokio::spawn(async move {
                let context = Arc::new(RequestContext::default());
                let mine = user(&format!("user{index}@example.com"));
                context
                    .scope(async move {
                        set_current_user(mine.clone());
                        for _ in 0..10 {
                            tokio::task::yield_now().await;
                            assert_eq!(current_user().map(|u| u.id), Some(mine.id));
                        }
                    })
                    .await;
            }));
        }

        for handle in handles {
            handle.await.expect("task completes");
        }
    }

    #[test]
    fn issued_tokens_are_taken_once() {
        let context = RequestContext::default();
        context.record_issued_tokens(TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
        });
        assert!(context.take_issued_tokens().is_some());
        assert!(context.take_issued_tokens().is_none());
    }
}
