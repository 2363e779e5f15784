use thiserror::Error;

/// Everything that can go wrong while acquiring a signal.
///
/// None of these are fatal: watchers log them and either skip the tick or keep running on
/// whatever source still works.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("no default audio output device")]
    NoDevice,

    #[error("failed to read {what} (status {status})")]
    ReadFailure { what: &'static str, status: i32 },

    #[error("key event interception unavailable: {0}")]
    InterceptUnavailable(String),

    #[error("no display answered the brightness query")]
    QueryUnsupported,

    #[error("failed to register {what} listener (status {status})")]
    ListenerRejected { what: &'static str, status: i32 },
}

pub type SignalResult<T> = std::result::Result<T, SignalError>;
