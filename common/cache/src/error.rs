use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("L1 tier failure for '{0}': {1}")]
    L1(String, String),
    #[error("L2 tier failure for '{0}': {1}")]
    L2(String, String),
    #[error("value for '{0}' could not be (de)serialised: {1}")]
    Codec(String, String),
    /// Both tiers failed on an `evict`/`clear` call. Per §4.J, removal is
    /// still attempted on both tiers even when one already failed; this
    /// error is only raised once neither succeeded.
    #[error("evict/clear failed on both tiers for '{0}'")]
    BothTiersFailed(String),
}

impl common_resilience::Classify for CacheError {
    fn error_class(&self) -> common_resilience::ErrorClass {
        use common_resilience::ErrorClass;
        match self {
            CacheError::L1(_, _) | CacheError::L2(_, _) | CacheError::BothTiersFailed(_) => {
                ErrorClass::Transient
            }
            CacheError::Codec(_, _) => ErrorClass::Permanent,
        }
    }
}
