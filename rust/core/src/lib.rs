//! evet core
//!
//! Batch manager and record cursor for consuming events from a station of an
//! event transport system, plus the block/bank record codec used to split
//! event payloads into records.

pub mod codec;
pub mod error;
pub mod evio;
pub mod session;
pub mod stats;
pub mod transport;

pub use codec::*;
pub use error::*;
pub use session::*;
pub use stats::*;
pub use transport::*;

/// Re-export common types
pub mod prelude {
    pub use crate::{
        codec::{Record, RecordCodec, RecordReader},
        error::{CodecError, EvetError, Result, TransportError},
        evio::{BankWriter, EvioCodec},
        session::{BatchState, EvetSession},
        transport::{AttachmentId, Endian, EventTransport, WaitPolicy},
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
