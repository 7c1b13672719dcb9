use async_trait::async_trait;
use tracing::debug;

use crate::authority::{resolve_authorities, AuthoritySet};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::key_provider::KeyProvider;
use crate::token::{algorithm_from_header, decode_header_only, verify_signature};

/// Declared or inferred shape of a credential presented to the pipeline
/// (§4.D). `LocalJwt` covers both the HS256 and RS256 local-issue
/// sub-modes; the provider that actually holds a local key decides which.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    LocalJwt,
    Oidc,
}

/// An authenticated caller, produced by whichever provider in the pipeline
/// first accepted the credential (§4.D output).
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
    pub authorities: AuthoritySet,
    pub token: String,
    pub token_type: TokenType,
}

impl Principal {
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}

/// One entry in the authentication pipeline (§4.D). `supports` is a pure
/// predicate over the declared type only — it must never need the token
/// itself, so the pipeline can skip providers without touching the network.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn supports(&self, declared: Option<TokenType>) -> bool;

    async fn authenticate(&self, token: &str) -> AuthResult<Principal>;
}

/// Verifies locally-issued tokens, either HS256 or RS256 depending on which
/// key the configured [`KeyProvider`] loaded (§2 "dual-mode ... HS/RS256").
pub struct LocalJwtProvider {
    key_provider: KeyProvider,
    config: AuthConfig,
}

impl LocalJwtProvider {
    pub fn new(key_provider: KeyProvider, config: AuthConfig) -> Self {
        Self {
            key_provider,
            config,
        }
    }
}

#[async_trait]
impl AuthProvider for LocalJwtProvider {
    fn supports(&self, declared: Option<TokenType>) -> bool {
        matches!(declared, Some(TokenType::LocalJwt) | None) && self.key_provider.has_local()
    }

    async fn authenticate(&self, token: &str) -> AuthResult<Principal> {
        let key = self.key_provider.local_verification_key()?;
        let claims = verify_signature(
            token,
            key.decoding_key(),
            key.algorithm(),
            std::slice::from_ref(&self.config.local.issuer),
            None,
            self.config.clock_skew_seconds,
        )?;
        let authorities = resolve_authorities(&claims, "local");
        debug!(subject = %claims.subject, "verified local JWT");
        Ok(Principal {
            subject: claims.subject,
            authorities,
            token: token.to_string(),
            token_type: TokenType::LocalJwt,
        })
    }
}

/// Verifies externally-issued OIDC tokens against a remote JWK set, keyed by
/// the token's `kid` header (§2 "externally-issued OIDC tokens ... remote
/// JWK sets").
pub struct OidcProvider {
    key_provider: KeyProvider,
    config: AuthConfig,
}

impl OidcProvider {
    pub fn new(key_provider: KeyProvider, config: AuthConfig) -> Self {
        Self {
            key_provider,
            config,
        }
    }
}

#[async_trait]
impl AuthProvider for OidcProvider {
    fn supports(&self, declared: Option<TokenType>) -> bool {
        matches!(declared, Some(TokenType::Oidc) | None) && self.key_provider.has_remote()
    }

    async fn authenticate(&self, token: &str) -> AuthResult<Principal> {
        let (kid, alg) = decode_header_only(token)?;
        let kid = kid.ok_or(AuthError::MissingKeyId)?;
        let key = self.key_provider.remote_verification_key(&kid).await?;
        let algorithm = algorithm_from_header(&alg, &kid)?;

        let issuer = self
            .config
            .oidc
            .issuer_uri
            .clone()
            .ok_or(AuthError::IssuerNotConfigured)?;
        let audience = if self.config.oidc.verify_audience {
            self.config.oidc.client_id.as_deref()
        } else {
            None
        };

        let claims = verify_signature(
            token,
            &key,
            algorithm,
            std::slice::from_ref(&issuer),
            audience,
            self.config.clock_skew_seconds,
        )?;

        let client_id = self.config.oidc.client_id.as_deref().unwrap_or("");
        let authorities = resolve_authorities(&claims, client_id);
        debug!(subject = %claims.subject, kid, "verified OIDC JWT");
        Ok(Principal {
            subject: claims.subject,
            authorities,
            token: token.to_string(),
            token_type: TokenType::Oidc,
        })
    }
}
