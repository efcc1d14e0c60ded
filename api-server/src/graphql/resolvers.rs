use async_graphql::{Context, ErrorExtensions, Object, Result};

use crate::auth::jwt::TokenPair;
use crate::auth::{AuthError, AuthState};
use crate::graphql::types::{
    LoginResponse, RefreshTokenInput, SignInInput, SignUpInput, SignUpResponse, UpdateUserInput,
    UserObject,
};
use crate::request_context::{RequestContext, current_user};

#[derive(Default)]
pub struct QueryRoot;

#[Object(name = "Query")]
impl QueryRoot {
    /// The authenticated user.
    async fn me(&self) -> Option<UserObject> {
        current_user().map(UserObject::from)
    }
}

#[derive(Default)]
pub struct MutationRoot;

#[Object(name = "Mutation")]
impl MutationRoot {
    async fn sign_up(&self, ctx: &Context<'_>, sign_up_input: SignUpInput) -> Result<SignUpResponse> {
        let state = ctx.data::<AuthState>()?;
        let user = state
            .authentication
            .sign_up(sign_up_input.into())
            .await
            .map_err(|err| err.extend())?;

        Ok(SignUpResponse {
            user: UserObject::from(user),
        })
    }

    /// Also sets the `accessToken` and `refreshToken` cookies.
    async fn sign_in(&self, ctx: &Context<'_>, sign_in_input: SignInInput) -> Result<LoginResponse> {
        let state = ctx.data::<AuthState>()?;
        let tokens = state
            .authentication
            .sign_in(&sign_in_input.email, &sign_in_input.password)
            .await
            .map_err(|err| err.extend())?;

        Ok(issue(tokens))
    }

    /// Also sets the `accessToken` and `refreshToken` cookies.
    async fn refresh_tokens(
        &self,
        ctx: &Context<'_>,
        refresh_token_input: RefreshTokenInput,
    ) -> Result<LoginResponse> {
        let state = ctx.data::<AuthState>()?;
        let tokens = state
            .authentication
            .refresh_tokens(&refresh_token_input.refresh_token)
            .await
            .map_err(|err| err.extend())?;

        Ok(issue(tokens))
    }

    async fn update_me(
        &self,
        ctx: &Context<'_>,
        update_user_input: UpdateUserInput,
    ) -> Result<UserObject> {
        let state = ctx.data::<AuthState>()?;
        let user = current_user().ok_or_else(|| AuthError::unauthorized().extend())?;
        let updated = state
            .users
            .update(user.id, update_user_input.into())
            .await
            .map_err(|err| err.extend())?;

        if let Some(context) = RequestContext::current() {
            context.set_current_user(updated.clone());
        }
        Ok(UserObject::from(updated))
    }
}

fn issue(tokens: TokenPair) -> LoginResponse {
    if let Some(context) = RequestContext::current() {
        context.record_issued_tokens(tokens.clone());
    }
    LoginResponse::from(tokens)
}
