use rocket::http::{Cookie, CookieJar, SameSite};
use time::Duration as TimeDuration;

use crate::auth::AuthConfig;
use crate::auth::jwt::TokenPair;

/// Mirror an issued token pair into the `accessToken` and `refreshToken`
/// cookies. Browser clients read these from script, so they are not
/// `HttpOnly`.
pub fn set_token_cookies(cookies: &CookieJar<'_>, config: &AuthConfig, tokens: &TokenPair) {
    cookies.add(token_cookie(
        config,
        config.access_cookie_name.clone(),
        tokens.access_token.clone(),
    ));
    cookies.add(token_cookie(
        config,
        config.refresh_cookie_name.clone(),
        tokens.refresh_token.clone(),
    ));
}

fn token_cookie(config: &AuthConfig, name: String, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, value))
        .path("/")
        .http_only(false)
        .same_site(SameSite::Lax)
        .secure(config.cookie_secure)
        .max_age(TimeDuration::seconds(config.token_cookie_max_age_secs))
        .build();

    if let Some(domain) = &config.cookie_domain {
        cookie.set_domain(domain.clone());
    }

    cookie
}
