use async_graphql::{InputObject, SimpleObject};
use chrono::{DateTime, Utc};

use crate::auth::jwt::TokenPair;
use crate::models::{ProfileUpdate, Registration, User};

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "User")]
pub struct UserObject {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserObject {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for LoginResponse {
    fn from(tokens: TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct SignUpResponse {
    pub user: UserObject,
}

#[derive(Debug, Clone, InputObject)]
pub struct SignUpInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl From<SignUpInput> for Registration {
    fn from(input: SignUpInput) -> Self {
        Registration {
            email: input.email,
            password: input.password,
            first_name: input.first_name,
            last_name: input.last_name,
        }
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, InputObject)]
pub struct RefreshTokenInput {
    pub refresh_token: String,
}

/// Omitted fields keep their stored value.
#[derive(Debug, Clone, Default, InputObject)]
pub struct UpdateUserInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl From<UpdateUserInput> for ProfileUpdate {
    fn from(input: UpdateUserInput) -> Self {
        ProfileUpdate {
            email: input.email,
            first_name: input.first_name,
            last_name: input.last_name,
            password: input.password,
        }
    }
}
