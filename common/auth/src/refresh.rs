use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::authority::AuthoritySet;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::issuer::{IssuedRefreshToken, TokenIssuer, REFRESH_TOKEN_TYPE};
use crate::key_provider::KeyProvider;
use crate::token::verify_signature;

/// Outcome of a successful `refresh` call (§4.E): a brand new access token
/// plus the refresh token that replaces the one just consumed.
#[derive(Debug, Clone)]
pub struct RotatedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Stateless-token refresh rotator with a revocation list for theft
/// detection (§3.2, §4.E). Tokens themselves carry everything needed to
/// validate; the maps below exist only to reject a nonce or family that has
/// already been consumed or flagged, per §5 "small revocation list MAY be
/// consulted".
pub struct RefreshRotator<'a> {
    key_provider: &'a KeyProvider,
    config: &'a AuthConfig,
    /// Nonces that have been consumed by a prior `refresh`, kept until
    /// their original token would have expired anyway.
    revoked_nonces: DashMap<String, DateTime<Utc>>,
    /// Families flagged after a revoked nonce was presented again —
    /// every token in the family is rejected from this point on (§4.E
    /// "revoke the entire family").
    revoked_families: DashMap<String, DateTime<Utc>>,
}

impl<'a> RefreshRotator<'a> {
    pub fn new(key_provider: &'a KeyProvider, config: &'a AuthConfig) -> Self {
        Self {
            key_provider,
            config,
            revoked_nonces: DashMap::new(),
            revoked_families: DashMap::new(),
        }
    }

    /// `issue(subject)`.
    pub fn issue(&self, subject: &str) -> AuthResult<IssuedRefreshToken> {
        self.purge_expired();
        TokenIssuer::new(self.key_provider, self.config).issue_refresh_token(subject)
    }

    /// `refresh(oldRefreshToken)`: verifies the presented token, checks it
    /// against both revocation maps, mints a fresh access/refresh pair, and
    /// revokes the old nonce. Reuse of an already-revoked nonce revokes the
    /// whole family and fails with [`AuthError::RefreshReuseDetected`].
    pub fn refresh(&self, old_refresh_token: &str) -> AuthResult<RotatedTokens> {
        self.purge_expired();

        let key = self.key_provider.local_verification_key()?;
        let claims = verify_signature(
            old_refresh_token,
            key.decoding_key(),
            key.algorithm(),
            std::slice::from_ref(&self.config.local.issuer),
            None,
            self.config.clock_skew_seconds,
        )
        .map_err(|_| AuthError::InvalidRefreshToken)?;

        let typ = claims
            .claim("typ")
            .and_then(|v| v.as_str())
            .ok_or(AuthError::InvalidRefreshToken)?;
        if typ != REFRESH_TOKEN_TYPE {
            return Err(AuthError::InvalidRefreshToken);
        }

        let nonce = claims
            .claim("nonce")
            .and_then(|v| v.as_str())
            .ok_or(AuthError::InvalidRefreshToken)?
            .to_string();
        let family_id = claims
            .claim("family_id")
            .and_then(|v| v.as_str())
            .ok_or(AuthError::InvalidRefreshToken)?
            .to_string();

        if self.revoked_families.contains_key(&family_id) {
            return Err(AuthError::RefreshReuseDetected);
        }

        if self.revoked_nonces.contains_key(&nonce) {
            self.revoked_families.insert(family_id, Utc::now());
            return Err(AuthError::RefreshReuseDetected);
        }

        self.revoked_nonces.insert(nonce, claims.expires_at);

        let issuer = TokenIssuer::new(self.key_provider, self.config);
        let access_token = issuer.issue_access_token(&claims.subject, &AuthoritySet::new())?;
        let next = issuer.issue_refresh_token_in_family(&claims.subject, &family_id)?;

        Ok(RotatedTokens {
            access_token,
            refresh_token: next.token,
        })
    }

    /// `revoke(refreshToken)`: adds the token's nonce to the revocation
    /// list without issuing anything new (§4.E logout path).
    pub fn revoke(&self, refresh_token: &str) -> AuthResult<()> {
        let key = self.key_provider.local_verification_key()?;
        let claims = verify_signature(
            refresh_token,
            key.decoding_key(),
            key.algorithm(),
            std::slice::from_ref(&self.config.local.issuer),
            None,
            self.config.clock_skew_seconds,
        )
        .map_err(|_| AuthError::InvalidRefreshToken)?;

        let nonce = claims
            .claim("nonce")
            .and_then(|v| v.as_str())
            .ok_or(AuthError::InvalidRefreshToken)?
            .to_string();

        self.revoked_nonces.insert(nonce, claims.expires_at);
        Ok(())
    }

    /// Drops revocation entries whose underlying token would already have
    /// expired — keeps the map bounded by active refresh-token lifetime
    /// rather than growing forever (§5 "self-expire").
    fn purge_expired(&self) {
        let now = Utc::now();
        self.revoked_nonces.retain(|_, expires_at| *expires_at > now);
    }
}
