use thiserror::Error;

pub type OtsResult<T> = Result<T, OtsError>;

#[derive(Debug, Error)]
pub enum OtsError {
    #[error("secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("invalid expiry: {0}")]
    InvalidExpiry(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    /// Tag verification failed. Carries no detail on purpose: wrong key,
    /// tampering and corruption are indistinguishable.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("tamper detected: ciphertext failed authentication after a valid fetch")]
    TamperDetected,

    #[error("secret not found")]
    NotFound,

    #[error("secret already consumed")]
    Consumed,

    #[error("secret expired")]
    Expired,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("unexpected backend response: {0}")]
    UnexpectedResponse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OtsError {
    /// Normal end-of-life outcomes for a secret, as opposed to defects.
    pub fn is_lifecycle_outcome(&self) -> bool {
        matches!(self, Self::NotFound | Self::Consumed | Self::Expired)
    }

    /// Integrity violations. These must never be downgraded.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::TamperDetected)
    }

    /// Only transport failures may be retried, and only by the caller for
    /// non-destructive operations.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}
