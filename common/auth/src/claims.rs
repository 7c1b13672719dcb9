use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::{AuthError, AuthResult};

/// Structured view over a decoded token's claims (§3.1 Token). Produced
/// either by [`crate::token::decode_compact`] (unverified, structural parse
/// only) or after signature verification; callers distinguish the two by
/// how they obtained the value, not by any flag on the struct itself.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub subject: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    /// Full claim set as received; the authority resolver reaches into
    /// provider-specific shapes here (`realm_access`, `resource_access`, ...).
    pub raw: serde_json::Value,
}

impl Claims {
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.raw.get(name)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, leeway_seconds: u32) -> bool {
        now >= self.expires_at + chrono::Duration::seconds(leeway_seconds as i64)
    }

    pub fn audience_set(&self) -> HashSet<&str> {
        self.audience.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, serde::Deserialize)]
struct ClaimsRepr {
    sub: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    iss: String,
    #[serde(default)]
    aud: Option<AudienceRepr>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value.clone())
            .map_err(|err| AuthError::InvalidJson(err.to_string()))?;

        let expires_at = Utc
            .timestamp_opt(repr.exp, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidClaim("exp", repr.exp.to_string()))?;

        let issued_at = match repr.iat {
            Some(iat) => Some(
                Utc.timestamp_opt(iat, 0)
                    .single()
                    .ok_or_else(|| AuthError::InvalidClaim("iat", iat.to_string()))?,
            ),
            None => None,
        };

        let audience = match repr.aud {
            Some(AudienceRepr::Single(item)) => vec![item],
            Some(AudienceRepr::Many(items)) => items,
            None => Vec::new(),
        };

        Ok(Self {
            subject: repr.sub,
            issuer: repr.iss,
            audience,
            expires_at,
            issued_at,
            raw: value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_single_and_multi_audience() {
        let now = Utc::now().timestamp();
        let single = Claims::try_from(json!({
            "sub": "user-1", "iss": "https://issuer", "exp": now + 3600, "aud": "client-a"
        }))
        .unwrap();
        assert_eq!(single.audience, vec!["client-a".to_string()]);

        let many = Claims::try_from(json!({
            "sub": "user-1", "iss": "https://issuer", "exp": now + 3600,
            "aud": ["client-a", "client-b"]
        }))
        .unwrap();
        assert_eq!(many.audience.len(), 2);
    }

    #[test]
    fn exact_expiry_boundary_is_expired() {
        let now = Utc::now();
        let claims = Claims::try_from(json!({
            "sub": "user-1", "iss": "https://issuer", "exp": now.timestamp()
        }))
        .unwrap();
        assert!(claims.is_expired_at(now, 0));
    }

    #[test]
    fn leeway_tolerates_small_skew() {
        let now = Utc::now();
        let claims = Claims::try_from(json!({
            "sub": "user-1", "iss": "https://issuer", "exp": (now.timestamp()) - 5
        }))
        .unwrap();
        assert!(!claims.is_expired_at(now, 30));
        assert!(claims.is_expired_at(now, 0));
    }
}
