use thiserror::Error;

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Failure taxonomy for `common-messaging` (§7: `Transient`, `Permanent`,
/// `Unknown`, `Unavailable`). Every variant maps onto
/// [`common_resilience::ErrorClass`] so the retry executor and circuit
/// breaker can act on it without a second classification step.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("produce to '{topic}' failed: {reason}")]
    Produce { topic: String, reason: String },
    #[error("envelope could not be serialised: {0}")]
    Serialization(String),
    #[error("record payload could not be decoded as an event envelope: {0}")]
    Deserialization(String),
    #[error("dead-letter publish to '{0}' failed: {1}")]
    DeadLetterPublish(String, String),
    #[error("no partitions assigned for topic set {0:?} under group '{1}'")]
    NoPartitionsAssigned(Vec<String>, String),
}

impl common_resilience::Classify for MessagingError {
    fn error_class(&self) -> common_resilience::ErrorClass {
        use common_resilience::ErrorClass;
        match self {
            MessagingError::Unavailable(_) | MessagingError::Produce { .. } => {
                ErrorClass::Transient
            }
            MessagingError::Serialization(_)
            | MessagingError::Deserialization(_)
            | MessagingError::DeadLetterPublish(_, _)
            | MessagingError::NoPartitionsAssigned(_, _) => ErrorClass::Permanent,
        }
    }
}

impl common_resilience::classifier::Tagged for MessagingError {
    fn tag(&self) -> &str {
        match self {
            MessagingError::Unavailable(_) => "unavailable",
            MessagingError::Produce { .. } => "produce",
            MessagingError::Serialization(_) => "serialization",
            MessagingError::Deserialization(_) => "deserialization",
            MessagingError::DeadLetterPublish(_, _) => "dlq_publish",
            MessagingError::NoPartitionsAssigned(_, _) => "no_partitions",
        }
    }
}
