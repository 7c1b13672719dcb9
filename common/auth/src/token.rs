use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine as _;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};

/// Implements §4.B `verify`: signature under `key`/`algorithm`, `exp` with
/// `leeway_seconds` of clock skew, `iss` in `issuers`, and — when `audience`
/// is `Some` — `aud` containing it.
pub fn verify_signature(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    issuers: &[String],
    audience: Option<&str>,
    leeway_seconds: u32,
) -> AuthResult<Claims> {
    let mut validation = Validation::new(algorithm);
    validation.set_issuer(issuers);
    validation.leeway = leeway_seconds.into();
    match audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<Value>(token, key, &validation)?;
    Claims::try_from(token_data.claims)
}

/// A token's three dot-separated compact segments, split but not decoded.
/// `encode(decode(t)) == t` holds because this never re-serialises the
/// header/payload, only slices the original string (§8 round-trip law).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactSegments<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
    original: &'a str,
}

impl<'a> CompactSegments<'a> {
    pub fn encode(&self) -> &'a str {
        self.original
    }
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    kid: Option<String>,
    alg: String,
}

/// Structural parse of a compact token per §4.B `decode`: splits the three
/// segments and base64url-decodes the header and payload into JSON, WITHOUT
/// checking the signature. Fails with [`AuthError::Malformed`] if the token
/// is not three dot-separated segments or either JSON segment is invalid.
pub fn decode_compact(token: &str) -> AuthResult<(CompactSegments<'_>, Claims)> {
    let mut parts = token.split('.');
    let (header_b64, payload_b64, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s)) if parts.next().is_none() && !h.is_empty() && !p.is_empty() => {
            (h, p, s)
        }
        _ => return Err(AuthError::Malformed("expected 3 dot-separated segments".into())),
    };

    let payload_bytes = BASE64_URL
        .decode(payload_b64)
        .map_err(|err| AuthError::Malformed(format!("invalid base64url payload: {err}")))?;
    let payload_json: Value = serde_json::from_slice(&payload_bytes)
        .map_err(|err| AuthError::Malformed(format!("invalid JSON payload: {err}")))?;

    let claims = Claims::try_from(payload_json)?;

    let segments = CompactSegments {
        header: header_b64,
        payload: payload_b64,
        signature: sig_b64,
        original: token,
    };

    Ok((segments, claims))
}

/// Maps a JWT header's `alg` onto the `jsonwebtoken` algorithm enum,
/// covering the RSA, RSA-PSS and EC families §4.A requires a remote
/// provider to parse. `kid` is only used to identify the offending key in
/// the error.
pub fn algorithm_from_header(alg: &str, kid: &str) -> AuthResult<Algorithm> {
    match alg {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        other => Err(AuthError::JwksUnsupportedAlg {
            kid: kid.to_string(),
            alg: other.to_string(),
        }),
    }
}

/// Decode the header segment only, enough to read `kid`/`alg` without
/// touching the payload (used by the key provider to pick a verification
/// key before committing to a full decode).
pub fn decode_header_only(token: &str) -> AuthResult<(Option<String>, String)> {
    let header_b64 = token
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::Malformed("missing header segment".into()))?;
    let bytes = BASE64_URL
        .decode(header_b64)
        .map_err(|err| AuthError::Malformed(format!("invalid base64url header: {err}")))?;
    let header: Header = serde_json::from_slice(&bytes)
        .map_err(|err| AuthError::Malformed(format!("invalid JSON header: {err}")))?;
    Ok((header.kid, header.alg))
}
