use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts};

use crate::error::{AuthError, AuthResult};
use crate::pipeline::AuthenticationPipeline;
use crate::provider::Principal;

/// Axum extractor that authenticates the `Authorization: Bearer` header
/// through the configured [`AuthenticationPipeline`] (§4.D "verify-token"
/// contract, §6). The declared token type is left unknown — providers
/// decide via `supports` whether they recognise the credential.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    Arc<AuthenticationPipeline>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let pipeline = Arc::<AuthenticationPipeline>::from_ref(state);

        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;

        let token = parse_bearer(header_value)?;
        pipeline.authenticate(&token, None).await
    }
}

fn parse_bearer(value: &axum::http::HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthorization)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
