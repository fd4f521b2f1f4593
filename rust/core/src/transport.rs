//! Event transport abstractions
//!
//! The transport system owns every event. A consumer borrows handles in
//! batches through [`EventTransport::get_events`] and hands them back with
//! [`EventTransport::put_events`].

use crate::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a station attachment, issued by the transport system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttachmentId(pub u32);

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "att#{}", self.0)
    }
}

/// How long a get may wait for events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Block until events arrive or the attachment is woken
    Sleep,
    /// Block at most the given duration
    Timed(Duration),
    /// Return immediately
    Async,
}

/// Declared byte order of an event payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// Byte order of the running host
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    /// Whether data in this order must be swapped on this host
    pub fn needs_swap(self) -> bool {
        self != Self::native()
    }
}

impl fmt::Display for Endian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endian::Big => f.write_str("BIG"),
            Endian::Little => f.write_str("LITTLE"),
        }
    }
}

/// Narrow interface to an event transport system
///
/// Handles are opaque to the consumer; everything it needs to know about an
/// event is asked of the transport through the accessors.
pub trait EventTransport {
    /// Opaque event handle
    type Event;

    /// Append up to `capacity` events for `attachment` to `out`, returning
    /// how many were appended
    fn get_events(
        &self,
        attachment: AttachmentId,
        capacity: usize,
        wait: WaitPolicy,
        out: &mut Vec<Self::Event>,
    ) -> Result<usize, TransportError>;

    /// Return every event in `events` to the system in one bulk call
    ///
    /// `events` is drained on success and left untouched on failure.
    fn put_events(
        &self,
        attachment: AttachmentId,
        events: &mut Vec<Self::Event>,
    ) -> Result<(), TransportError>;

    /// Payload bytes of an event
    fn event_data<'a>(&'a self, event: &'a Self::Event) -> &'a [u8];

    /// Payload length in bytes
    fn event_length(&self, event: &Self::Event) -> usize {
        self.event_data(event).len()
    }

    /// Byte order the producer declared for the payload
    fn event_endian(&self, event: &Self::Event) -> Endian;

    /// Whether the payload must be swapped to host order
    fn event_needs_swap(&self, event: &Self::Event) -> bool {
        self.event_endian(event).needs_swap()
    }
}

impl<T: EventTransport + ?Sized> EventTransport for &T {
    type Event = T::Event;

    fn get_events(
        &self,
        attachment: AttachmentId,
        capacity: usize,
        wait: WaitPolicy,
        out: &mut Vec<Self::Event>,
    ) -> Result<usize, TransportError> {
        (**self).get_events(attachment, capacity, wait, out)
    }

    fn put_events(
        &self,
        attachment: AttachmentId,
        events: &mut Vec<Self::Event>,
    ) -> Result<(), TransportError> {
        (**self).put_events(attachment, events)
    }

    fn event_data<'a>(&'a self, event: &'a Self::Event) -> &'a [u8] {
        (**self).event_data(event)
    }

    fn event_length(&self, event: &Self::Event) -> usize {
        (**self).event_length(event)
    }

    fn event_endian(&self, event: &Self::Event) -> Endian {
        (**self).event_endian(event)
    }

    fn event_needs_swap(&self, event: &Self::Event) -> bool {
        (**self).event_needs_swap(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_endian_never_swaps() {
        assert!(!Endian::native().needs_swap());
        let foreign = match Endian::native() {
            Endian::Big => Endian::Little,
            Endian::Little => Endian::Big,
        };
        assert!(foreign.needs_swap());
    }

    #[test]
    fn test_display() {
        assert_eq!(Endian::Big.to_string(), "BIG");
        assert_eq!(AttachmentId(7).to_string(), "att#7");
    }
}
