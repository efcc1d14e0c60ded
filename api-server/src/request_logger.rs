use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::time::Instant;

use crate::request_context::request_context;

/// Fairing to log one line per HTTP request with timing and the
/// authenticated user, if any.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let duration = request.local_cache(Instant::now).elapsed();

        let remote_user = request_context(request)
            .current_user()
            .map(|user| format!("id:{}", user.id))
            .unwrap_or_else(|| "-".to_string());
        let user_agent = request.headers().get_one("User-Agent").unwrap_or("-");

        log::info!(
            "{} {} -> {} ({:.2}ms) user={} agent=\"{}\"",
            request.method(),
            request.uri(),
            response.status().code,
            duration.as_secs_f64() * 1000.0,
            remote_user,
            user_agent
        );
    }
}
