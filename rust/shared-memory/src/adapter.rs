//! Adapter exposing a local event system through the core `EventTransport` trait

use crate::{LocalEvent, LocalEventSystem};
use evet_core::{AttachmentId, Endian, EventTransport, TransportError, WaitPolicy};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where released events go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseMode {
    /// On to the next station
    #[default]
    Put,
    /// Straight back to the free pool
    Dump,
}

/// Consumer-side view of a [`LocalEventSystem`]
#[derive(Debug, Clone)]
pub struct LocalTransport {
    system: LocalEventSystem,
    release: ReleaseMode,
}

impl LocalTransport {
    pub fn new(system: LocalEventSystem, release: ReleaseMode) -> Self {
        Self { system, release }
    }

    pub fn system(&self) -> &LocalEventSystem {
        &self.system
    }

    pub fn release_mode(&self) -> ReleaseMode {
        self.release
    }
}

impl EventTransport for LocalTransport {
    type Event = LocalEvent;

    fn get_events(
        &self,
        attachment: AttachmentId,
        capacity: usize,
        wait: WaitPolicy,
        out: &mut Vec<LocalEvent>,
    ) -> Result<usize, TransportError> {
        self.system
            .get_events(attachment, capacity, wait, out)
            .map_err(TransportError::from)
    }

    fn put_events(&self, attachment: AttachmentId, events: &mut Vec<LocalEvent>) -> Result<(), TransportError> {
        let result = match self.release {
            ReleaseMode::Put => self.system.put_events(attachment, events),
            ReleaseMode::Dump => self.system.dump_events(attachment, events),
        };
        result.map_err(|e| {
            warn!("Failed to release events of {}: {}", attachment, e);
            TransportError::from(e)
        })
    }

    fn event_data<'a>(&'a self, event: &'a LocalEvent) -> &'a [u8] {
        self.system.event_data(event)
    }

    fn event_length(&self, event: &LocalEvent) -> usize {
        event.length()
    }

    fn event_endian(&self, event: &LocalEvent) -> Endian {
        event.endian()
    }
}
