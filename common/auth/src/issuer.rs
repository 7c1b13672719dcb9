use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Header};
use serde_json::json;

use crate::authority::AuthoritySet;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::key_provider::KeyProvider;

/// `typ` claim stamped on refresh tokens so a presented access token can
/// never be replayed through `refresh` (§3.2, §4.E).
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Issues locally-signed access and refresh tokens (§6 "Authentication
/// out"). Only meaningful when [`KeyProvider::has_local`] holds — issuance
/// is not defined for the remote-OIDC mode, which has no local signing key.
pub struct TokenIssuer<'a> {
    key_provider: &'a KeyProvider,
    config: &'a AuthConfig,
}

impl<'a> TokenIssuer<'a> {
    pub fn new(key_provider: &'a KeyProvider, config: &'a AuthConfig) -> Self {
        Self {
            key_provider,
            config,
        }
    }

    /// `issueAccessToken(subject, authorities)`: exp = now + access-lifetime
    /// (default 15 min, §6).
    pub fn issue_access_token(&self, subject: &str, authorities: &AuthoritySet) -> AuthResult<String> {
        let key = self.key_provider.local_signing_key()?;
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_lifetime)
                .map_err(|err| AuthError::Malformed(err.to_string()))?;

        let roles: Vec<&str> = authorities.iter().collect();
        let claims = json!({
            "sub": subject,
            "iss": self.config.local.issuer,
            "iat": now.timestamp(),
            "exp": exp.timestamp(),
            "roles": roles,
        });

        let header = Header::new(key.algorithm());
        encode(&header, &claims, key.encoding_key()?).map_err(AuthError::from)
    }

    /// `issueRefreshToken(subject)`: exp = now + refresh-lifetime (default 7
    /// days, §6), carrying a fresh high-entropy nonce and family id (§3.2).
    pub fn issue_refresh_token(&self, subject: &str) -> AuthResult<IssuedRefreshToken> {
        let key = self.key_provider.local_signing_key()?;
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.refresh_token_lifetime)
                .map_err(|err| AuthError::Malformed(err.to_string()))?;

        let nonce = new_nonce();
        let family_id = new_nonce();

        self.encode_refresh(key, subject, &nonce, &family_id, now, exp)
            .map(|token| IssuedRefreshToken {
                token,
                nonce,
                family_id,
                expires_at: exp,
            })
    }

    /// Re-issues a refresh token carrying an existing `family_id`, used by
    /// the rotator (§4.E) so the whole chain stays traceable to one family.
    pub fn issue_refresh_token_in_family(
        &self,
        subject: &str,
        family_id: &str,
    ) -> AuthResult<IssuedRefreshToken> {
        let key = self.key_provider.local_signing_key()?;
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.refresh_token_lifetime)
                .map_err(|err| AuthError::Malformed(err.to_string()))?;

        let nonce = new_nonce();

        self.encode_refresh(key, subject, &nonce, family_id, now, exp)
            .map(|token| IssuedRefreshToken {
                token,
                nonce,
                family_id: family_id.to_string(),
                expires_at: exp,
            })
    }

    fn encode_refresh(
        &self,
        key: &crate::key_provider::LocalKey,
        subject: &str,
        nonce: &str,
        family_id: &str,
        now: chrono::DateTime<Utc>,
        exp: chrono::DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = json!({
            "sub": subject,
            "iss": self.config.local.issuer,
            "typ": REFRESH_TOKEN_TYPE,
            "iat": now.timestamp(),
            "exp": exp.timestamp(),
            "nonce": nonce,
            "family_id": family_id,
        });

        let header = Header::new(key.algorithm());
        encode(&header, &claims, key.encoding_key()?).map_err(AuthError::from)
    }
}

/// Result of an issuance call: the compact token plus the bookkeeping
/// fields the rotator needs without re-parsing the token it just minted.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub nonce: String,
    pub family_id: String,
    pub expires_at: chrono::DateTime<Utc>,
}

fn new_nonce() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
    use base64::Engine as _;
    use rand::Rng;

    let bytes: [u8; 24] = rand::thread_rng().gen();
    BASE64_URL.encode(bytes)
}
