//! Error types for the evet consumer

use thiserror::Error;

/// Conditions reported by an event transport system
#[derive(Error, Debug)]
pub enum TransportError {
    /// The transport system is dead or has been torn down
    #[error("Event system is dead")]
    Dead,

    /// A timed wait expired before any event arrived
    #[error("Timed out waiting for events")]
    Timeout,

    /// No events were available
    #[error("No events available")]
    Empty,

    /// The station is busy serving another request
    #[error("Station is busy")]
    Busy,

    /// The attachment was told to wake up
    #[error("Attachment was woken up")]
    Woken,

    /// Communication with the system failed
    #[error("Transport IO error: {0}")]
    Io(String),

    /// The attachment id is unknown to the system
    #[error("Invalid attachment: {0}")]
    InvalidAttachment(u32),

    /// Bad station or system configuration
    #[error("Transport configuration error: {0}")]
    Configuration(String),
}

impl TransportError {
    /// Fatal conditions mean the consumer should stop asking for events
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Dead
                | TransportError::Io(_)
                | TransportError::InvalidAttachment(_)
                | TransportError::Configuration(_)
        )
    }

    /// Transient conditions may succeed when retried
    pub fn is_transient(&self) -> bool {
        !self.is_fatal()
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Record codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Buffer too short: {available} bytes, need {needed}")]
    TooShort { available: usize, needed: usize },

    #[error("Invalid block magic: 0x{0:08x}")]
    BadMagic(u32),

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid block header length: {0} words")]
    BadHeaderLength(u32),

    #[error("{what} of {words} words at byte {offset} overruns the buffer")]
    Overrun {
        what: &'static str,
        offset: usize,
        words: usize,
    },

    #[error("Zero-length bank at byte {0}")]
    EmptyBank(usize),

    #[error("Reader failure: {0}")]
    Reader(String),
}

/// Errors surfaced by an evet session
#[derive(Error, Debug)]
pub enum EvetError {
    /// The session has no transport bound (never opened, or already closed)
    #[error("evet session not initialized")]
    NotInitialized,

    /// Invalid session parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The event batch could not be allocated
    #[error("Out of memory allocating {requested} event slots")]
    Allocation { requested: usize },

    /// Transport get/put failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Record codec failure
    #[error("Record codec error: {0}")]
    Codec(#[from] CodecError),

    /// A new batch was requested while the previous one is still held
    #[error("Refill requested while holding {held} unreleased events")]
    BatchHeld { held: usize },

    /// A freshly opened chunk had no records either
    #[error("Chunk in slot {slot} holds no records")]
    ChunkExhausted { slot: usize },
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, EvetError>;

impl EvetError {
    /// Check if calling the operation again may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            EvetError::Transport(err) => err.is_transient(),
            EvetError::ChunkExhausted { .. } => true,
            EvetError::Codec(_) => false,
            EvetError::NotInitialized
            | EvetError::BatchHeld { .. }
            | EvetError::Configuration(_)
            | EvetError::Allocation { .. } => false,
        }
    }

    /// Get error category for logging and stats
    pub fn category(&self) -> ErrorCategory {
        match self {
            EvetError::NotInitialized | EvetError::BatchHeld { .. } => ErrorCategory::Usage,
            EvetError::Configuration(_) => ErrorCategory::Configuration,
            EvetError::Allocation { .. } => ErrorCategory::Resource,
            EvetError::Transport(err) if err.is_fatal() => ErrorCategory::TransportFatal,
            EvetError::Transport(_) => ErrorCategory::TransportTransient,
            EvetError::Codec(_) => ErrorCategory::Codec,
            EvetError::ChunkExhausted { .. } => ErrorCategory::Codec,
        }
    }
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Usage,
    Configuration,
    Resource,
    TransportTransient,
    TransportFatal,
    Codec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_split() {
        assert!(TransportError::Dead.is_fatal());
        assert!(TransportError::Io("socket closed".to_string()).is_fatal());
        assert!(TransportError::Timeout.is_transient());
        assert!(TransportError::Empty.is_transient());
        assert!(TransportError::Busy.is_transient());
        assert!(TransportError::Woken.is_transient());
    }

    #[test]
    fn test_error_recovery() {
        let timeout = EvetError::from(TransportError::Timeout);
        assert!(timeout.is_recoverable());
        assert_eq!(timeout.category(), ErrorCategory::TransportTransient);

        let dead = EvetError::from(TransportError::Dead);
        assert!(!dead.is_recoverable());
        assert_eq!(dead.category(), ErrorCategory::TransportFatal);

        assert!(!EvetError::NotInitialized.is_recoverable());
        assert_eq!(EvetError::NotInitialized.category(), ErrorCategory::Usage);
    }

    #[test]
    fn test_codec_error_is_hard() {
        let err = EvetError::from(CodecError::BadMagic(0xdeadbeef));
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), ErrorCategory::Codec);
        assert!(err.to_string().contains("0xdeadbeef"));
    }
}
