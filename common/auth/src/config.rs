use std::time::Duration;

/// Runtime configuration for the local token issuer/verifier (§6 `auth`
/// group, local-* keys).
#[derive(Debug, Clone)]
pub struct LocalIssuerConfig {
    pub enabled: bool,
    pub public_key_path: Option<String>,
    pub private_key_path: Option<String>,
    /// When no RSA key pair is configured, HS256 with this shared secret is
    /// used instead (§2 "dual-mode ... locally-issued HS/RS256 tokens").
    pub hmac_secret: Option<String>,
    /// `iss` claim stamped on locally-issued tokens and required on
    /// verification; there is no remote authority to consult for this mode.
    pub issuer: String,
}

impl LocalIssuerConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            public_key_path: None,
            private_key_path: None,
            hmac_secret: None,
            issuer: "local-issuer".to_string(),
        }
    }
}

/// Runtime configuration for the remote OIDC provider (§6 `auth` group,
/// oidc-* keys).
#[derive(Debug, Clone)]
pub struct OidcProviderConfig {
    pub enabled: bool,
    pub issuer_uri: Option<String>,
    pub jwk_set_uri: Option<String>,
    pub client_id: Option<String>,
    /// Defaults to `true` per spec.md §9's recommendation.
    pub verify_audience: bool,
}

impl OidcProviderConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            issuer_uri: None,
            jwk_set_uri: None,
            client_id: None,
            verify_audience: true,
        }
    }
}

/// Top-level `auth` configuration group (§6).
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub local: LocalIssuerConfig,
    pub oidc: OidcProviderConfig,
    pub clock_skew_seconds: u32,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    /// TTL for cached remote JWKS entries (§4.A, default 10 min).
    pub jwks_cache_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            local: LocalIssuerConfig::disabled(),
            oidc: OidcProviderConfig::disabled(),
            clock_skew_seconds: 30,
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
            jwks_cache_ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl AuthConfig {
    /// Read the `auth.*` group from uppercase/underscore environment
    /// variables (§6 "Environment variables"), falling back to the same
    /// defaults as [`AuthConfig::default`] for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let local = LocalIssuerConfig {
            enabled: env_bool("AUTH_LOCAL_ISSUER_ENABLED", defaults.local.enabled),
            public_key_path: std::env::var("AUTH_LOCAL_PUBLIC_KEY_PATH").ok(),
            private_key_path: std::env::var("AUTH_LOCAL_PRIVATE_KEY_PATH").ok(),
            hmac_secret: std::env::var("AUTH_LOCAL_HMAC_SECRET").ok(),
            issuer: std::env::var("AUTH_LOCAL_ISSUER")
                .unwrap_or_else(|_| defaults.local.issuer.clone()),
        };

        let oidc = OidcProviderConfig {
            enabled: env_bool("AUTH_OIDC_ENABLED", defaults.oidc.enabled),
            issuer_uri: std::env::var("AUTH_OIDC_ISSUER_URI").ok(),
            jwk_set_uri: std::env::var("AUTH_OIDC_JWK_SET_URI").ok(),
            client_id: std::env::var("AUTH_OIDC_CLIENT_ID").ok(),
            verify_audience: env_bool("AUTH_OIDC_VERIFY_AUDIENCE", defaults.oidc.verify_audience),
        };

        Self {
            clock_skew_seconds: env_parse("AUTH_CLOCK_SKEW_SECONDS", defaults.clock_skew_seconds),
            local,
            oidc,
            access_token_lifetime: defaults.access_token_lifetime,
            refresh_token_lifetime: defaults.refresh_token_lifetime,
            jwks_cache_ttl: defaults.jwks_cache_ttl,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_leaves_both_providers_disabled() {
        let config = AuthConfig::default();
        assert!(!config.local.enabled);
        assert!(!config.oidc.enabled);
        assert_eq!(config.clock_skew_seconds, 30);
    }
}
