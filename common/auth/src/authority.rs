use std::collections::BTreeSet;

use crate::claims::Claims;

/// Default authority injected when no other source contributes one (§3.3).
pub const ROLE_USER: &str = "ROLE_USER";

/// An unordered, de-duplicated collection of `ROLE_<UPPER>` authority
/// strings (§3.3). Canonicalisation strips any existing `ROLE_` prefix,
/// uppercases, and re-prefixes, so `"admin"`, `"Admin"`, `"ROLE_ADMIN"` all
/// collapse to the same entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthoritySet(BTreeSet<String>);

impl AuthoritySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, authority: &str) -> bool {
        self.0.contains(&canonicalize(authority))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn insert_all<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for value in values {
            self.0.insert(canonicalize(value.as_ref()));
        }
    }
}

impl FromIterator<String> for AuthoritySet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::default();
        set.insert_all(iter);
        set
    }
}

impl IntoIterator for AuthoritySet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn canonicalize(raw: &str) -> String {
    let stripped = raw.strip_prefix("ROLE_").unwrap_or(raw);
    format!("ROLE_{}", stripped.to_uppercase())
}

/// Implements §4.C: collect authorities from `realm_access.roles`,
/// `resource_access.<client_id>.roles`, and a provider-specific `roles`
/// claim, in that order; canonicalise and de-duplicate; fall back to
/// [`ROLE_USER`] if the union is empty.
pub fn resolve_authorities(claims: &Claims, client_id: &str) -> AuthoritySet {
    let mut authorities = AuthoritySet::new();

    if let Some(roles) = claims
        .claim("realm_access")
        .and_then(|v| v.get("roles"))
        .and_then(|v| v.as_array())
    {
        authorities.insert_all(roles.iter().filter_map(|v| v.as_str()));
    }

    if let Some(roles) = claims
        .claim("resource_access")
        .and_then(|v| v.get(client_id))
        .and_then(|v| v.get("roles"))
        .and_then(|v| v.as_array())
    {
        authorities.insert_all(roles.iter().filter_map(|v| v.as_str()));
    }

    if let Some(roles) = claims.claim("roles").and_then(|v| v.as_array()) {
        authorities.insert_all(roles.iter().filter_map(|v| v.as_str()));
    }

    if authorities.is_empty() {
        authorities.insert_all([ROLE_USER]);
    }

    authorities
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims_with(raw: serde_json::Value) -> Claims {
        let mut value = raw;
        value["sub"] = json!("user-1");
        value["iss"] = json!("https://issuer");
        value["exp"] = json!(chrono::Utc::now().timestamp() + 3600);
        Claims::try_from(value).unwrap()
    }

    #[test]
    fn canonicalises_mixed_case_and_prefix() {
        let set: AuthoritySet = vec!["admin".into(), "ROLE_manager".into(), "CASHIER".into()]
            .into_iter()
            .collect();
        assert!(set.contains("admin"));
        assert!(set.contains("ROLE_ADMIN"));
        assert!(set.contains("manager"));
        assert!(set.contains("cashier"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn empty_result_collapses_to_role_user() {
        let claims = claims_with(json!({}));
        let authorities = resolve_authorities(&claims, "auth-service-client");
        assert_eq!(authorities.len(), 1);
        assert!(authorities.contains(ROLE_USER));
    }

    #[test]
    fn realm_roles_do_not_get_default_user_added() {
        let claims = claims_with(json!({
            "realm_access": {"roles": ["admin"]}
        }));
        let authorities = resolve_authorities(&claims, "auth-service-client");
        assert_eq!(authorities.len(), 1);
        assert!(authorities.contains("ROLE_ADMIN"));
        assert!(!authorities.contains(ROLE_USER));
    }

    #[test]
    fn collects_realm_client_and_plain_roles_claims() {
        let claims = claims_with(json!({
            "realm_access": {"roles": ["admin"]},
            "resource_access": {"auth-service-client": {"roles": ["manager"]}},
            "roles": ["cashier"]
        }));
        let authorities = resolve_authorities(&claims, "auth-service-client");
        assert_eq!(authorities.len(), 3);
        assert!(authorities.contains("ROLE_ADMIN"));
        assert!(authorities.contains("ROLE_MANAGER"));
        assert!(authorities.contains("ROLE_CASHIER"));
    }

    #[test]
    fn resource_access_only_considers_configured_client() {
        let claims = claims_with(json!({
            "resource_access": {"other-client": {"roles": ["admin"]}}
        }));
        let authorities = resolve_authorities(&claims, "auth-service-client");
        assert!(authorities.contains(ROLE_USER));
        assert!(!authorities.contains("ROLE_ADMIN"));
    }
}
