//! GraphQL transport: schema, resolvers, and the Rocket handlers serving it.

use async_graphql::http::GraphiQLSource;
use async_graphql::{EmptySubscription, Schema};
use async_graphql_rocket::{GraphQLRequest, GraphQLResponse};
use rocket::http::CookieJar;
use rocket::response::content::RawHtml;
use rocket::{Route, State, get, post, routes};

use crate::auth::cookies::set_token_cookies;
use crate::auth::{AppConfig, AuthMetadata, AuthState, AuthType};
use crate::request_context::RequestScope;

pub mod extension;
pub mod resolvers;
pub mod types;

pub use extension::AuthenticationExtension;
pub use resolvers::{MutationRoot, QueryRoot};

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Accepted strategies per operation. Mutations are public unless listed.
pub fn auth_metadata() -> AuthMetadata {
    AuthMetadata::new()
        .class("Mutation", [AuthType::None])
        .handler("Mutation", "updateMe", [AuthType::Bearer])
        .handler("Query", "me", [AuthType::Bearer])
}

pub fn build_schema(state: AuthState) -> AppSchema {
    let extension = AuthenticationExtension::new(auth_metadata(), state.guard_chain.clone());

    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(state)
        .extension(extension)
        .finish()
}

pub fn routes() -> Vec<Route> {
    routes![graphql_request, graphiql]
}

/// Executes the operation inside the request's identity scope, then mirrors
/// any tokens issued by it into cookies.
#[post("/graphql", data = "<request>")]
pub async fn graphql_request(
    scope: RequestScope,
    schema: &State<AppSchema>,
    auth: &State<AuthState>,
    cookies: &CookieJar<'_>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let RequestScope(context) = scope;
    let response = context.clone().scope(request.execute(schema.inner())).await;

    if let Some(tokens) = context.take_issued_tokens() {
        set_token_cookies(cookies, &auth.config, &tokens);
    }

    response
}

#[get("/graphql")]
pub fn graphiql(app: &State<AppConfig>) -> Option<RawHtml<String>> {
    app.is_development
        .then(|| RawHtml(GraphiQLSource::build().endpoint("/graphql").finish()))
}
