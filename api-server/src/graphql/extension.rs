use std::sync::Arc;

use async_graphql::extensions::{
    Extension, ExtensionContext, ExtensionFactory, NextResolve, ResolveInfo,
};
use async_graphql::{ErrorExtensionValues, ServerError, ServerResult, Value};

use crate::auth::{AuthError, AuthMetadata, GuardChain};
use crate::request_context::RequestContext;

/// Runs the guard chain before every root field, using the metadata entry
/// for `(parent type, field name)`.
pub struct AuthenticationExtension {
    metadata: Arc<AuthMetadata>,
    guard_chain: GuardChain,
}

impl AuthenticationExtension {
    pub fn new(metadata: AuthMetadata, guard_chain: GuardChain) -> Self {
        Self {
            metadata: Arc::new(metadata),
            guard_chain,
        }
    }
}

impl ExtensionFactory for AuthenticationExtension {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(AuthenticationGuardExtension {
            metadata: self.metadata.clone(),
            guard_chain: self.guard_chain.clone(),
        })
    }
}

struct AuthenticationGuardExtension {
    metadata: Arc<AuthMetadata>,
    guard_chain: GuardChain,
}

#[async_trait::async_trait]
impl Extension for AuthenticationGuardExtension {
    async fn resolve(
        &self,
        ctx: &ExtensionContext<'_>,
        info: ResolveInfo<'_>,
        next: NextResolve<'_>,
    ) -> ServerResult<Option<Value>> {
        if info.path_node.parent.is_none() && !info.is_for_introspection {
            let auth_types = self.metadata.resolve(info.parent_type, info.name);
            // Executions outside a request scope are treated as anonymous.
            let request = RequestContext::current().unwrap_or_default();

            if let Err(err) = self.guard_chain.authorize(auth_types, &request).await {
                log::debug!("{}.{} rejected: {}", info.parent_type, info.name, err);
                return Err(to_server_error(&err));
            }
        }

        next.run(ctx, info).await
    }
}

fn to_server_error(err: &AuthError) -> ServerError {
    let mut error = ServerError::new(err.public_message(), None);
    let mut extensions = ErrorExtensionValues::default();
    extensions.set("code", err.code());
    error.extensions = Some(extensions);
    error
}
