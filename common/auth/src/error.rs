use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Structural parse failure: not three dot-separated base64url segments.
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token missing kid header")]
    MissingKeyId,
    #[error("no decoding key registered for kid '{0}'")]
    UnknownKeyId(String),
    #[error("failed to decode token header: {0}")]
    InvalidHeader(String),
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("failed to parse decoding key for kid '{0}': {1}")]
    KeyParse(String, String),
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("failed to fetch JWKS: {0}")]
    JwksFetch(String),
    #[error("failed to parse JWKS response: {0}")]
    JwksDecode(String),
    #[error("JWKS entry missing key id (kid)")]
    JwksMissingKid,
    #[error("JWKS key '{0}' missing required RSA components")]
    JwksMissingComponents(String),
    #[error("JWKS key '{kid}' uses unsupported key type '{kty}'")]
    JwksUnsupportedKey { kid: String, kty: String },
    #[error("JWKS key '{kid}' uses unsupported alg '{alg}'")]
    JwksUnsupportedAlg { kid: String, alg: String },
    /// A key lookup (local or remote) could not complete, but may succeed
    /// on retry — surfaced so the caller's retry executor can distinguish
    /// this from a verification failure.
    #[error("signing/verification key temporarily unavailable: {0}")]
    KeyUnavailable(String),
    /// No configured provider declares itself able to handle this token.
    #[error("no authentication provider supports this credential")]
    Unsupported,
    /// A provider recognised the credential's shape but verification
    /// failed for reasons that will not change on retry.
    #[error("credential rejected: {0}")]
    BadCredentials(String),
    /// Refresh-token specific failures.
    #[error("refresh token is malformed or expired")]
    InvalidRefreshToken,
    #[error("refresh token reuse detected; token family revoked")]
    RefreshReuseDetected,
    /// No local signing key is configured but issuance was requested.
    #[error("local issuer is not configured")]
    IssuerNotConfigured,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::Verification(value.to_string())
    }
}

impl common_resilience::Classify for AuthError {
    fn error_class(&self) -> common_resilience::ErrorClass {
        use common_resilience::ErrorClass;
        match self {
            AuthError::JwksFetch(_) | AuthError::KeyUnavailable(_) => ErrorClass::Transient,
            AuthError::Malformed(_)
            | AuthError::MissingKeyId
            | AuthError::UnknownKeyId(_)
            | AuthError::InvalidHeader(_)
            | AuthError::Verification(_)
            | AuthError::InvalidClaim(_, _)
            | AuthError::InvalidJson(_)
            | AuthError::KeyParse(_, _)
            | AuthError::MissingAuthorization
            | AuthError::InvalidAuthorization
            | AuthError::JwksDecode(_)
            | AuthError::JwksMissingKid
            | AuthError::JwksMissingComponents(_)
            | AuthError::JwksUnsupportedKey { .. }
            | AuthError::JwksUnsupportedAlg { .. }
            | AuthError::Unsupported
            | AuthError::BadCredentials(_)
            | AuthError::InvalidRefreshToken
            | AuthError::RefreshReuseDetected
            | AuthError::IssuerNotConfigured => ErrorClass::Permanent,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::Malformed(_) => (StatusCode::UNAUTHORIZED, "AUTH_MALFORMED"),
            AuthError::IssuerNotConfigured => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_ISSUER_DISABLED")
            }
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                (StatusCode::UNAUTHORIZED, "AUTH_HEADER")
            }
            AuthError::MissingKeyId | AuthError::UnknownKeyId(_) => {
                (StatusCode::UNAUTHORIZED, "AUTH_KEY")
            }
            AuthError::InvalidHeader(_) | AuthError::Verification(_) => {
                (StatusCode::UNAUTHORIZED, "AUTH_TOKEN")
            }
            AuthError::InvalidClaim(_, _)
            | AuthError::InvalidJson(_)
            | AuthError::KeyParse(_, _) => (StatusCode::BAD_REQUEST, "AUTH_CLAIMS"),
            AuthError::JwksFetch(_)
            | AuthError::JwksDecode(_)
            | AuthError::JwksMissingKid
            | AuthError::JwksMissingComponents(_)
            | AuthError::JwksUnsupportedKey { .. }
            | AuthError::JwksUnsupportedAlg { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_JWKS")
            }
            AuthError::KeyUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "AUTH_KEY_UNAVAILABLE"),
            AuthError::Unsupported => (StatusCode::UNAUTHORIZED, "AUTH_UNSUPPORTED"),
            AuthError::BadCredentials(_) => (StatusCode::UNAUTHORIZED, "AUTH_BAD_CREDENTIALS"),
            AuthError::InvalidRefreshToken => (StatusCode::UNAUTHORIZED, "AUTH_REFRESH_INVALID"),
            AuthError::RefreshReuseDetected => (StatusCode::UNAUTHORIZED, "AUTH_REFRESH_REUSE"),
        };

        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
