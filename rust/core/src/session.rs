//! Consumer session: batch manager and record cursor
//!
//! A session holds one batch of events borrowed from the transport and one
//! record reader opened on the event under the cursor. Records are read from
//! the current event until its reader runs dry; the cursor then moves to the
//! next event, and a fully consumed batch goes back to the transport before
//! the next one is requested.

use crate::{
    AttachmentId, Endian, EventTransport, EvetError, Record, RecordCodec, RecordReader, Result,
    SessionStats, TransportError, WaitPolicy,
};
use std::ops::Range;
use tracing::{debug, info, instrument, warn};

/// Fill state of the event batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// No events held
    Empty,
    /// The last get delivered this many events
    Filled(usize),
}

/// Metadata of the event under the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStat {
    /// Batch slot of the event
    pub slot: usize,
    /// Payload length in bytes
    pub length: usize,
    /// Declared payload byte order
    pub endian: Endian,
    /// Whether the payload must be swapped to host order
    pub swap: bool,
}

/// One consumer attachment draining a station through a record codec
///
/// All methods take `&mut self`: a session belongs to exactly one consumer
/// loop. Once [`close`](Self::close) has run, every operation fails with
/// [`EvetError::NotInitialized`].
pub struct EvetSession<T: EventTransport, C: RecordCodec> {
    transport: Option<T>,
    attachment: AttachmentId,
    codec: C,
    batch: Vec<T::Event>,
    requested: usize,
    fill: BatchState,
    cursor: Option<usize>,
    chunk: Option<ChunkStat>,
    reader: Option<C::Reader>,
    verbose: bool,
    stats: SessionStats,
}

impl<T: EventTransport, C: RecordCodec> EvetSession<T, C> {
    /// Bind a session to an attachment, with room for `chunk_size` events
    ///
    /// Nothing is fetched until the first read.
    pub fn open(transport: T, attachment: AttachmentId, chunk_size: usize, codec: C) -> Result<Self> {
        if chunk_size == 0 {
            return Err(EvetError::Configuration(
                "chunk size must be at least 1".to_string(),
            ));
        }

        let mut batch = Vec::new();
        batch
            .try_reserve_exact(chunk_size)
            .map_err(|_| EvetError::Allocation {
                requested: chunk_size,
            })?;

        debug!("Opened session on {} with chunk size {}", attachment, chunk_size);

        Ok(Self {
            transport: Some(transport),
            attachment,
            codec,
            batch,
            requested: chunk_size,
            fill: BatchState::Empty,
            cursor: None,
            chunk: None,
            reader: None,
            verbose: false,
            stats: SessionStats::default(),
        })
    }

    /// Enable per-chunk diagnostics
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_initialized(&self) -> bool {
        self.transport.is_some()
    }

    pub fn attachment(&self) -> AttachmentId {
        self.attachment
    }

    /// Configured batch capacity
    pub fn chunk_size(&self) -> usize {
        self.requested
    }

    pub fn batch_state(&self) -> BatchState {
        self.fill
    }

    /// Slot under the cursor, `None` before the first advance after a refill
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current_chunk(&self) -> Option<&ChunkStat> {
        self.chunk.as_ref()
    }

    pub fn has_reader(&self) -> bool {
        self.reader.is_some()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Next record, crossing onto the next event when the current one is done
    ///
    /// An exhausted (or never opened) reader triggers one [`advance`](Self::advance)
    /// and one retry. If the new event yields nothing either, the call fails
    /// with [`EvetError::ChunkExhausted`]; calling again moves on. Codec errors
    /// are returned as they are, without advancing.
    ///
    /// The record borrows the session, so it must be consumed or copied before
    /// the next call.
    pub fn next_record(&mut self) -> Result<Record<'_>> {
        if self.transport.is_none() {
            return Err(EvetError::NotInitialized);
        }

        let range = match self.read_current()? {
            Some(range) => range,
            None => {
                self.advance()?;
                self.stats.exhaustion_retries += 1;
                let slot = self.cursor.unwrap_or_default();
                self.read_current()?
                    .ok_or(EvetError::ChunkExhausted { slot })?
            }
        };

        self.stats.record_read(range.len());
        self.record_at(range)
    }

    /// Move the cursor to the next event, recycling the batch when it is used up
    ///
    /// The open reader is closed first; if closing fails the error is
    /// returned, and the session is left with no reader. If the next event
    /// cannot be opened by the codec, the error is returned but the cursor
    /// stays on that event.
    pub fn advance(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(EvetError::NotInitialized);
        }

        self.close_reader()?;

        let next = self.cursor.map_or(0, |slot| slot + 1);
        self.cursor = Some(next);

        let exhausted = match self.fill {
            BatchState::Filled(filled) => next >= filled,
            BatchState::Empty => true,
        };
        if exhausted {
            self.release()?;
            self.refill()?;
            self.cursor = Some(0);
        }

        self.open_current()
    }

    /// Get a new batch from the transport, waiting as long as it takes
    ///
    /// The previous batch must have been released already.
    #[instrument(level = "debug", skip(self))]
    pub fn refill(&mut self) -> Result<usize> {
        let transport = self.transport.as_ref().ok_or(EvetError::NotInitialized)?;

        if !self.batch.is_empty() {
            return Err(EvetError::BatchHeld {
                held: self.batch.len(),
            });
        }

        let received = transport.get_events(
            self.attachment,
            self.requested,
            WaitPolicy::Sleep,
            &mut self.batch,
        )?;

        if received == 0 {
            return Err(TransportError::Empty.into());
        }

        debug!("Got {} of {} requested events", received, self.requested);
        self.fill = BatchState::Filled(received);
        self.cursor = None;
        self.chunk = None;
        self.stats.batches_fetched += 1;
        Ok(received)
    }

    /// Close the reader and give every held event back to the transport
    ///
    /// Both steps always run, reader first. The first failure is returned
    /// and every failure is logged. Afterwards the session is unusable.
    #[instrument(level = "debug", skip(self))]
    pub fn close(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(EvetError::NotInitialized);
        }

        let mut first_error = None;

        if let Err(err) = self.close_reader() {
            first_error.get_or_insert(err);
        }

        if let Err(err) = self.release() {
            warn!("Failed to release batch on close: {}", err);
            if !self.batch.is_empty() {
                warn!("Dropping {} unreleased events", self.batch.len());
            }
            first_error.get_or_insert(err);
        }

        self.batch = Vec::new();
        self.fill = BatchState::Empty;
        self.cursor = None;
        self.chunk = None;
        self.transport = None;

        debug!("Closed session on {}", self.attachment);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn close_reader(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.close().map_err(|err| {
                warn!("Failed to close record reader: {}", err);
                EvetError::Codec(err)
            })?;
        }
        Ok(())
    }

    /// Hand the whole batch back in one put
    fn release(&mut self) -> Result<()> {
        let BatchState::Filled(filled) = self.fill else {
            return Ok(());
        };
        let transport = self.transport.as_ref().ok_or(EvetError::NotInitialized)?;

        transport.put_events(self.attachment, &mut self.batch)?;

        debug!("Released {} events", filled);
        self.fill = BatchState::Empty;
        self.stats.events_released += filled as u64;
        Ok(())
    }

    fn open_current(&mut self) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(EvetError::NotInitialized)?;
        let slot = self.cursor.ok_or(EvetError::NotInitialized)?;
        let event = &self.batch[slot];

        let stat = ChunkStat {
            slot,
            length: transport.event_length(event),
            endian: transport.event_endian(event),
            swap: transport.event_needs_swap(event),
        };
        self.chunk = Some(stat);
        self.stats.chunks_visited += 1;

        let payload = transport.event_data(event);
        if self.verbose {
            let first = payload
                .get(..4)
                .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                .map(|w| if stat.swap { w.swap_bytes() } else { w })
                .unwrap_or_default();
            info!(
                "data byte order = {}, {:2}/{:2}: data (len = {}) {}, int = {}",
                stat.endian,
                slot,
                self.batch.len(),
                stat.length,
                if stat.swap {
                    "needs swapping"
                } else {
                    "does not need swapping"
                },
                first
            );
        }

        match self.codec.open_reader(payload) {
            Ok(reader) => {
                self.reader = Some(reader);
                Ok(())
            }
            Err(err) => {
                warn!("Unreadable event in slot {}: {}", slot, err);
                Err(err.into())
            }
        }
    }

    fn read_current(&mut self) -> Result<Option<Range<usize>>> {
        let transport = self.transport.as_ref().ok_or(EvetError::NotInitialized)?;
        match (self.reader.as_mut(), self.cursor) {
            (Some(reader), Some(slot)) => {
                let payload = transport.event_data(&self.batch[slot]);
                Ok(reader.next_record(payload)?)
            }
            _ => Ok(None),
        }
    }

    fn record_at(&self, range: Range<usize>) -> Result<Record<'_>> {
        let transport = self.transport.as_ref().ok_or(EvetError::NotInitialized)?;
        let slot = self.cursor.ok_or(EvetError::NotInitialized)?;
        let payload = transport.event_data(&self.batch[slot]);
        let swap = match (&self.reader, &self.chunk) {
            (Some(reader), _) => reader.needs_swap(),
            (None, Some(chunk)) => chunk.swap,
            (None, None) => false,
        };
        Ok(Record::new(&payload[range], swap))
    }
}

impl<T: EventTransport, C: RecordCodec> Drop for EvetSession<T, C> {
    fn drop(&mut self) {
        if self.transport.is_some() {
            if let Err(err) = self.close() {
                warn!("Session close on drop failed: {}", err);
            }
        }
    }
}
