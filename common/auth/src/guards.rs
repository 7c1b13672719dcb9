use axum::http::StatusCode;

use crate::provider::Principal;

#[derive(Debug, Clone)]
pub enum GuardError {
    Forbidden { required: Vec<String> },
}

impl GuardError {
    pub fn into_response(self) -> (StatusCode, String) {
        match self {
            GuardError::Forbidden { required } => (
                StatusCode::FORBIDDEN,
                if required.is_empty() {
                    "Insufficient authority".to_string()
                } else {
                    format!(
                        "Insufficient authority. Required one of: {}",
                        required.join(", ")
                    )
                },
            ),
        }
    }
}

impl From<GuardError> for (StatusCode, String) {
    fn from(value: GuardError) -> Self {
        value.into_response()
    }
}

/// Rejects unless `principal` carries at least one of `allowed` (§3.3
/// authority set, canonicalised `ROLE_<UPPER>`). An empty allow-list admits
/// any authenticated principal.
pub fn ensure_role(principal: &Principal, allowed: &[&str]) -> Result<(), GuardError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let has_authority = allowed
        .iter()
        .any(|required| principal.has_authority(required));

    if has_authority {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            required: allowed.iter().map(|value| value.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::ROLE_USER;
    use crate::provider::TokenType;

    fn principal_with(authorities: Vec<&str>) -> Principal {
        Principal {
            subject: "user-1".into(),
            authorities: authorities
                .into_iter()
                .map(str::to_string)
                .collect(),
            token: String::new(),
            token_type: TokenType::LocalJwt,
        }
    }

    #[test]
    fn empty_allow_list_admits_any_principal() {
        let principal = principal_with(vec![ROLE_USER]);
        assert!(ensure_role(&principal, &[]).is_ok());
    }

    #[test]
    fn matching_authority_is_admitted() {
        let principal = principal_with(vec!["ROLE_ADMIN"]);
        assert!(ensure_role(&principal, &["ROLE_ADMIN", "ROLE_MANAGER"]).is_ok());
    }

    #[test]
    fn missing_authority_is_forbidden() {
        let principal = principal_with(vec![ROLE_USER]);
        let err = ensure_role(&principal, &["ROLE_ADMIN"]).unwrap_err();
        assert!(matches!(err, GuardError::Forbidden { .. }));
    }
}
