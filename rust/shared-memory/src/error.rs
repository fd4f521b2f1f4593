//! Local event system error types

use evet_core::TransportError;
use thiserror::Error;

/// Local event system errors
#[derive(Error, Debug)]
pub enum SharedMemoryError {
    /// Invalid arena geometry
    #[error("Invalid {what}: {size}, must be between {min} and {max}")]
    InvalidSize {
        what: &'static str,
        size: usize,
        min: usize,
        max: usize,
    },

    /// Invalid station name
    #[error("Invalid station name: {0:?}")]
    InvalidName(String),

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MappingFailed(String),

    /// Backing file already present
    #[error("Arena file already exists: {}", .0.display())]
    FileExists(std::path::PathBuf),

    /// Events still held by an attachment
    #[error("Attachment {attachment} still holds {held} events")]
    EventsHeld { attachment: u32, held: usize },

    /// Station limit reached
    #[error("Too many stations (max {max})")]
    TooManyStations { max: usize },

    /// Unknown station id
    #[error("Station not found: {0}")]
    StationNotFound(u32),

    /// Unknown attachment id
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(u32),

    /// Station feature the local system does not provide
    #[error("Unsupported station configuration: {0}")]
    Unsupported(String),

    /// Payload larger than an event slot
    #[error("Payload of {size} bytes exceeds event size {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Event returned by an attachment that does not hold it
    #[error("Event in slot {slot} is not held by attachment {attachment}")]
    NotOwned { slot: usize, attachment: u32 },

    /// The system has been killed
    #[error("Event system is dead")]
    Dead,

    /// A timed wait expired
    #[error("Operation timed out")]
    Timeout,

    /// Nothing queued for a non-waiting get
    #[error("No events queued")]
    Empty,

    /// The attachment was woken up
    #[error("Attachment was woken up")]
    Woken,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias
pub type Result<T> = std::result::Result<T, SharedMemoryError>;

impl SharedMemoryError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            SharedMemoryError::Timeout | SharedMemoryError::Empty | SharedMemoryError::Woken => true,
            SharedMemoryError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

impl From<SharedMemoryError> for TransportError {
    fn from(err: SharedMemoryError) -> Self {
        match err {
            SharedMemoryError::Dead => TransportError::Dead,
            SharedMemoryError::Timeout => TransportError::Timeout,
            SharedMemoryError::Empty => TransportError::Empty,
            SharedMemoryError::Woken => TransportError::Woken,
            SharedMemoryError::AttachmentNotFound(id) => TransportError::InvalidAttachment(id),
            SharedMemoryError::Io(err) => TransportError::Io(err.to_string()),
            SharedMemoryError::MappingFailed(msg) => TransportError::Io(msg),
            other => TransportError::Configuration(other.to_string()),
        }
    }
}
