use std::sync::Arc;

use common_resilience::{Classify, ErrorClass};

use crate::error::AuthError;
use crate::provider::{AuthProvider, Principal, TokenType};

/// Sequences providers in registration order and returns the first match
/// (§4.D). Declared-unsupported providers are skipped without being
/// invoked; among providers that `supports` the declared type, a
/// [`ErrorClass::Permanent`] failure short-circuits the whole pipeline,
/// while a transient one (upstream JWKS unavailable, say) is remembered and
/// the next candidate is tried.
///
/// Stateless beyond the provider list itself — safe to share across many
/// concurrent request handlers (§4.D "Scheduling").
#[derive(Clone)]
pub struct AuthenticationPipeline {
    providers: Vec<Arc<dyn AuthProvider>>,
}

impl AuthenticationPipeline {
    pub fn new(providers: Vec<Arc<dyn AuthProvider>>) -> Self {
        Self { providers }
    }

    pub async fn authenticate(
        &self,
        token: &str,
        declared: Option<TokenType>,
    ) -> Result<Principal, AuthError> {
        let mut last_transient: Option<AuthError> = None;

        for provider in &self.providers {
            if !provider.supports(declared) {
                continue;
            }

            match provider.authenticate(token).await {
                Ok(principal) => return Ok(principal),
                Err(err) => {
                    if matches!(err.error_class(), ErrorClass::Permanent) {
                        return Err(err);
                    }
                    last_transient = Some(err);
                }
            }
        }

        Err(last_transient.unwrap_or(AuthError::Unsupported))
    }
}
