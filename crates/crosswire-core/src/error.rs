//! Shared error type across crosswire crates.

use thiserror::Error;

use crate::value::Status;

/// Shared result type.
pub type Result<T> = std::result::Result<T, CrosswireError>;

/// Unified error type used by core and hub.
#[derive(Debug, Error)]
pub enum CrosswireError {
    /// A handler or middleware on the remote side raised an error.
    #[error("{}", Status::ApiError.tag())]
    ApiError,
    /// No handler is registered for the called name on the remote side.
    #[error("{}", Status::NotFound.tag())]
    ApiNotFound,
    /// No correlated response arrived within the call's timeout window.
    #[error("{}", Status::Timeout.tag())]
    ApiTimeout,
    /// Error description captured on the serving side and carried back.
    #[error("remote error: {0}")]
    Remote(String),
    #[error("cant serialize packet in [{name}]: {reason}")]
    Serialize { name: String, reason: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("coder tag {0:#04x} is reserved")]
    ReservedTag(u8),
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("transport: {0}")]
    Transport(String),
    #[error("bad config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl CrosswireError {
    /// Stable client-facing code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CrosswireError::ApiError => Status::ApiError.tag(),
            CrosswireError::ApiNotFound => Status::NotFound.tag(),
            CrosswireError::ApiTimeout => Status::Timeout.tag(),
            CrosswireError::Remote(_) => "REMOTE",
            CrosswireError::Serialize { .. } => "SERIALIZE",
            CrosswireError::Decode(_) => "DECODE",
            CrosswireError::ReservedTag(_) => "RESERVED_TAG",
            CrosswireError::UnsupportedVersion => "UNSUPPORTED_VERSION",
            CrosswireError::Transport(_) => "TRANSPORT",
            CrosswireError::Config(_) => "BAD_CONFIG",
            CrosswireError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<Status> for CrosswireError {
    /// Map a status sentinel to its rejection error.
    fn from(s: Status) -> Self {
        match s {
            Status::ApiError => CrosswireError::ApiError,
            Status::NotFound => CrosswireError::ApiNotFound,
            Status::Timeout => CrosswireError::ApiTimeout,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn status_rejections_carry_the_sentinel_tag() {
        for s in [Status::NotFound, Status::Timeout, Status::ApiError] {
            let err = CrosswireError::from(s);
            assert_eq!(err.code(), s.tag());
            assert_eq!(err.to_string(), s.tag());
        }
    }
}
