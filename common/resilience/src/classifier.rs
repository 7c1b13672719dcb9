use std::collections::HashSet;

use crate::error::{Classify, ErrorClass};

/// Tag identifying an error's concrete kind for the purposes of
/// allow/deny-list overrides (e.g. `"timeout"`, `"connection_reset"`,
/// `"invalid_credentials"`). Subsystems pick their own tag vocabulary;
/// the classifier only ever compares tags as opaque strings.
pub trait Tagged {
    fn tag(&self) -> &str;
}

/// Classifies failures into [`ErrorClass`], consulting an allow-list and a
/// deny-list of tags before falling back to the error's own [`Classify`]
/// implementation.
///
/// An allow-listed tag is always treated as retryable even if the built-in
/// heuristic would call it permanent; a deny-listed tag is always treated as
/// permanent even if the heuristic would call it transient. The allow-list
/// takes precedence when a tag appears in both (§4.G "allow-list beats
/// deny-list").
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allow_list<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_deny_list<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Classify an error that exposes both a semantic class and a tag.
    pub fn classify<E>(&self, error: &E) -> ErrorClass
    where
        E: Classify + Tagged,
    {
        let tag = error.tag();
        if self.allow.contains(tag) {
            return ErrorClass::Transient;
        }
        if self.deny.contains(tag) {
            return ErrorClass::Permanent;
        }
        error.error_class()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        tag: &'static str,
        class: ErrorClass,
    }

    impl Classify for Fake {
        fn error_class(&self) -> ErrorClass {
            self.class
        }
    }

    impl Tagged for Fake {
        fn tag(&self) -> &str {
            self.tag
        }
    }

    #[test]
    fn deny_list_overrides_transient_heuristic() {
        let c = ErrorClassifier::new().with_deny_list(["rate_limited"]);
        let e = Fake {
            tag: "rate_limited",
            class: ErrorClass::Transient,
        };
        assert_eq!(c.classify(&e), ErrorClass::Permanent);
    }

    #[test]
    fn allow_list_overrides_permanent_heuristic() {
        let c = ErrorClassifier::new().with_allow_list(["stale_read"]);
        let e = Fake {
            tag: "stale_read",
            class: ErrorClass::Permanent,
        };
        assert_eq!(c.classify(&e), ErrorClass::Transient);
    }

    #[test]
    fn allow_list_wins_over_deny_list() {
        let c = ErrorClassifier::new()
            .with_allow_list(["flaky"])
            .with_deny_list(["flaky"]);
        let e = Fake {
            tag: "flaky",
            class: ErrorClass::Permanent,
        };
        assert_eq!(c.classify(&e), ErrorClass::Transient);
    }

    #[test]
    fn unlisted_tag_falls_back_to_heuristic() {
        let c = ErrorClassifier::new();
        let e = Fake {
            tag: "unmapped",
            class: ErrorClass::Unknown,
        };
        assert_eq!(c.classify(&e), ErrorClass::Unknown);
    }
}
