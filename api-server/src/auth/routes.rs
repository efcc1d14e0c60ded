use rocket::http::CookieJar;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;

use crate::auth::cookies::set_token_cookies;
use crate::auth::guards::AuthType;
use crate::auth::responses::{
    LoginResponse, RefreshRequest, SignInRequest, SignUpRequest, SignUpResponse, UserSummary,
};
use crate::auth::{AuthError, AuthState};
use crate::request_context::RequestScope;

type AuthRouteResult<T> = Result<Json<T>, status::Custom<Json<AuthErrorResponse>>>;

#[derive(Debug, serde::Serialize, serde::Deserialize, JsonSchema)]
pub struct AuthErrorResponse {
    pub status: u16,
    pub message: String,
}

#[openapi(tag = "Auth")]
#[post("/auth/signup", data = "<payload>")]
pub async fn signup(
    state: &State<AuthState>,
    payload: Json<SignUpRequest>,
) -> AuthRouteResult<SignUpResponse> {
    let user = state
        .authentication
        .sign_up(payload.into_inner().into())
        .await
        .map_err(respond_error)?;

    Ok(Json(SignUpResponse {
        user: UserSummary::from(user),
    }))
}

#[openapi(tag = "Auth")]
#[post("/auth/signin", data = "<payload>")]
pub async fn signin(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    payload: Json<SignInRequest>,
) -> AuthRouteResult<LoginResponse> {
    let tokens = state
        .authentication
        .sign_in(&payload.email, &payload.password)
        .await
        .map_err(respond_error)?;

    set_token_cookies(cookies, &state.config, &tokens);
    Ok(Json(LoginResponse::from(tokens)))
}

#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<payload>")]
pub async fn refresh(
    state: &State<AuthState>,
    cookies: &CookieJar<'_>,
    payload: Json<RefreshRequest>,
) -> AuthRouteResult<LoginResponse> {
    let tokens = state
        .authentication
        .refresh_tokens(&payload.refresh_token)
        .await
        .map_err(respond_error)?;

    set_token_cookies(cookies, &state.config, &tokens);
    Ok(Json(LoginResponse::from(tokens)))
}

/// The user bound to the request by the bearer guard.
#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(scope: RequestScope, state: &State<AuthState>) -> AuthRouteResult<UserSummary> {
    let RequestScope(context) = scope;
    state
        .guard_chain
        .authorize(&[AuthType::Bearer], &context)
        .await
        .map_err(respond_error)?;

    let user = context
        .current_user()
        .ok_or_else(AuthError::unauthorized)
        .map_err(respond_error)?;
    Ok(Json(UserSummary::from(user)))
}

fn respond_error(err: AuthError) -> status::Custom<Json<AuthErrorResponse>> {
    let status = err.status();
    status::Custom(
        status,
        Json(AuthErrorResponse {
            status: status.code,
            message: err.public_message(),
        }),
    )
}
