use std::time::Duration;

/// Failures talking to the broker
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Connection could not be established (or timed out)
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The channel was usable but an operation on it failed
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Publish circuit breaker is open ({0:?} since last failure)")]
    CircuitOpen(Duration),

    #[error("Broker operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<lapin::Error> for BrokerError {
    fn from(e: lapin::Error) -> Self {
        BrokerError::Channel(e.to_string())
    }
}

impl From<BrokerError> for murmur_error::AppError {
    fn from(e: BrokerError) -> Self {
        murmur_error::AppError::BrokerUnavailable(e.to_string())
    }
}

/// Failure reported by an event handler. Every variant means "do not ack".
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Retryable condition (remote storage down, catalog unreachable, ...)
    #[error("{0}")]
    Retryable(String),

    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

impl HandlerError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        HandlerError::Retryable(msg.into())
    }
}

impl From<HandlerError> for murmur_error::AppError {
    fn from(e: HandlerError) -> Self {
        murmur_error::AppError::HandlerFailure(e.to_string())
    }
}
