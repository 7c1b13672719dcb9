use std::sync::Arc;
use std::time::Duration;

use common_resilience::{Backoff, Classify, Jitter, RetryPolicy};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use moka::future::Cache;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

/// A local signing/verification key, issued for either HS256 (shared
/// secret) or RS256 (PEM key pair) per §2's "dual-mode" requirement.
#[derive(Clone)]
pub enum LocalKey {
    Hmac {
        algorithm: Algorithm,
        encoding: EncodingKey,
        decoding: DecodingKey,
    },
    Rsa {
        algorithm: Algorithm,
        encoding: Option<EncodingKey>,
        decoding: DecodingKey,
    },
}

impl LocalKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            LocalKey::Hmac { algorithm, .. } => *algorithm,
            LocalKey::Rsa { algorithm, .. } => *algorithm,
        }
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        match self {
            LocalKey::Hmac { decoding, .. } => decoding,
            LocalKey::Rsa { decoding, .. } => decoding,
        }
    }

    pub fn encoding_key(&self) -> AuthResult<&EncodingKey> {
        match self {
            LocalKey::Hmac { encoding, .. } => Ok(encoding),
            LocalKey::Rsa {
                encoding: Some(encoding),
                ..
            } => Ok(encoding),
            LocalKey::Rsa { encoding: None, .. } => Err(AuthError::IssuerNotConfigured),
        }
    }
}

fn load_local_key(config: &AuthConfig) -> AuthResult<Option<LocalKey>> {
    if !config.local.enabled {
        return Ok(None);
    }

    if let (Some(public_path), Some(private_path)) = (
        &config.local.public_key_path,
        &config.local.private_key_path,
    ) {
        let public_pem = std::fs::read(public_path)
            .map_err(|err| AuthError::KeyParse(public_path.clone(), err.to_string()))?;
        let private_pem = std::fs::read(private_path)
            .map_err(|err| AuthError::KeyParse(private_path.clone(), err.to_string()))?;
        let decoding = DecodingKey::from_rsa_pem(&public_pem)
            .map_err(|err| AuthError::KeyParse(public_path.clone(), err.to_string()))?;
        let encoding = EncodingKey::from_rsa_pem(&private_pem)
            .map_err(|err| AuthError::KeyParse(private_path.clone(), err.to_string()))?;
        return Ok(Some(LocalKey::Rsa {
            algorithm: Algorithm::RS256,
            encoding: Some(encoding),
            decoding,
        }));
    }

    if let Some(secret) = &config.local.hmac_secret {
        let bytes = secret.as_bytes();
        return Ok(Some(LocalKey::Hmac {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }));
    }

    Ok(None)
}

/// Fetches and caches a remote provider's JWK set (§4.A
/// `getRemoteVerificationKey`). Concurrent misses for the same `kid`
/// de-duplicate behind a single in-flight fetch, grounded in the same
/// `Arc<Mutex<()>>` single-flight guard pattern used for upstream JWKS
/// refresh elsewhere in the ecosystem.
#[derive(Clone)]
pub struct RemoteKeyProvider {
    client: Client,
    jwk_set_uri: String,
    cache: Cache<String, DecodingKey>,
    single_flight: Arc<Mutex<()>>,
}

impl RemoteKeyProvider {
    pub fn new(jwk_set_uri: impl Into<String>, ttl: Duration) -> Self {
        Self::with_client(Client::new(), jwk_set_uri, ttl)
    }

    pub fn with_client(client: Client, jwk_set_uri: impl Into<String>, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).build();
        Self {
            client,
            jwk_set_uri: jwk_set_uri.into(),
            cache,
            single_flight: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get(&self, kid: &str) -> AuthResult<DecodingKey> {
        if let Some(key) = self.cache.get(kid).await {
            return Ok(key);
        }

        let _guard = self.single_flight.lock().await;
        if let Some(key) = self.cache.get(kid).await {
            return Ok(key);
        }

        self.refresh().await?;

        self.cache
            .get(kid)
            .await
            .ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()))
    }

    /// Fetches and parses the JWK set, retrying transient transport/5xx
    /// failures with capped backoff before surfacing `KeyUnavailable`
    /// (§4.A "remote fetch failures are retried with capped backoff;
    /// persistent failure surfaces as `KeyUnavailable`").
    async fn refresh(&self) -> AuthResult<()> {
        let policy = RetryPolicy::<AuthError>::builder()
            .max_attempts(3)
            .expect("3 is a valid attempt count")
            .backoff(Backoff::exponential(
                Duration::from_millis(100),
                Duration::from_secs(2),
            ))
            .jitter(Jitter::Symmetric { factor: 0.1 })
            .classify_with(|err: &AuthError| err.error_class())
            .build();

        let jwk_set = policy
            .execute(|_attempt| self.fetch_jwk_set())
            .await
            .map_err(|err| {
                err.into_inner().unwrap_or_else(|| {
                    AuthError::KeyUnavailable(format!(
                        "jwks fetch from {} exhausted retries",
                        self.jwk_set_uri
                    ))
                })
            })?;

        for jwk in &jwk_set.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(decoding) => self.cache.insert(kid, decoding).await,
                Err(err) => warn!(kid, error = %err, "skipping unsupported JWK"),
            }
        }

        debug!(uri = %self.jwk_set_uri, keys = jwk_set.keys.len(), "refreshed remote JWK set");
        Ok(())
    }

    async fn fetch_jwk_set(&self) -> AuthResult<JwkSet> {
        let response = self
            .client
            .get(&self.jwk_set_uri)
            .send()
            .await
            .map_err(|err| AuthError::KeyUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                self.jwk_set_uri
            )));
        }

        response
            .json()
            .await
            .map_err(|err| AuthError::JwksDecode(err.to_string()))
    }
}

/// Supplies signing/verification keys for both local-issue and remote-OIDC
/// modes (§4.A).
#[derive(Clone)]
pub struct KeyProvider {
    local: Option<LocalKey>,
    remote: Option<RemoteKeyProvider>,
}

impl KeyProvider {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        let local = load_local_key(config)?;
        let remote = if config.oidc.enabled {
            config
                .oidc
                .jwk_set_uri
                .as_ref()
                .map(|uri| RemoteKeyProvider::new(uri.clone(), config.jwks_cache_ttl))
        } else {
            None
        };
        Ok(Self { local, remote })
    }

    pub fn with_parts(local: Option<LocalKey>, remote: Option<RemoteKeyProvider>) -> Self {
        Self { local, remote }
    }

    pub fn local_signing_key(&self) -> AuthResult<&LocalKey> {
        self.local.as_ref().ok_or(AuthError::IssuerNotConfigured)
    }

    pub fn local_verification_key(&self) -> AuthResult<&LocalKey> {
        self.local.as_ref().ok_or(AuthError::IssuerNotConfigured)
    }

    pub async fn remote_verification_key(&self, kid: &str) -> AuthResult<DecodingKey> {
        match &self.remote {
            Some(remote) => remote.get(kid).await,
            None => Err(AuthError::Unsupported),
        }
    }

    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use httpmock::prelude::*;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;

    fn rsa_jwk_json(kid: &str) -> serde_json::Value {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("generate rsa key");
        let public = private.to_public_key();
        serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": kid,
                "alg": "RS256",
                "use": "sig",
                "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
            }]
        })
    }

    #[tokio::test]
    async fn fetches_and_caches_then_dedupes_concurrent_misses() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200).json_body(rsa_jwk_json("key-1"));
            })
            .await;

        let provider = RemoteKeyProvider::new(server.url("/jwks"), Duration::from_secs(60));

        let a = provider.get("key-1");
        let b = provider.get("key-1");
        let (a, b) = tokio::join!(a, b);
        assert!(a.is_ok());
        assert!(b.is_ok());
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn unknown_kid_after_refresh_is_unknown_key_id() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/jwks");
                then.status(200)
                    .json_body(serde_json::json!({"keys": []}));
            })
            .await;

        let provider = RemoteKeyProvider::new(server.url("/jwks"), Duration::from_secs(60));
        let result = provider.get("missing").await;
        assert!(matches!(result, Err(AuthError::UnknownKeyId(_))));
    }
}
