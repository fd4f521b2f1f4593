//! In-process event system: a fixed pool of events flowing through stations
//!
//! Producers publish payloads into free arena slots. Each event then visits
//! the stations in position order: a station with attachments that accepts
//! it queues the event until one of its attachments gets it and puts it back,
//! after which it travels on. Past the last station the slot is free again.

use crate::station::{insertion_index, Flow, Station, StationConfig, StationId};
use crate::{EventArena, Result, SharedMemoryError};
use evet_core::{AttachmentId, Endian, WaitPolicy};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Longest station name accepted
pub const MAX_STATION_NAME: usize = 48;

/// Local event system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Number of events in the pool
    pub event_count: usize,
    /// Size of one event in bytes
    pub event_size: usize,
    /// Station limit
    pub max_stations: usize,
    /// Map the pool onto this file instead of anonymous memory
    pub file: Option<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_count: 300,
            event_size: 4096,
            max_stations: 10,
            file: None,
        }
    }
}

static NEXT_SYSTEM_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one event held by an attachment
///
/// Handles cannot be copied: returning one through `put_events` or
/// `dump_events` consumes it, and payload views borrow the handle, so a
/// released event can no longer be read.
///
/// ```compile_fail
/// use evet_core::{Endian, WaitPolicy};
/// use evet_shared_memory::{LocalEventSystem, StationConfig, SystemConfig};
///
/// let system = LocalEventSystem::create(SystemConfig::default()).unwrap();
/// let station = system.create_station("s", StationConfig::default()).unwrap();
/// let att = system.attach(station).unwrap();
/// system.publish(b"first", Endian::native()).unwrap();
///
/// let mut events = Vec::new();
/// system.get_events(att, 1, WaitPolicy::Async, &mut events).unwrap();
/// let data = system.event_data(&events[0]);
/// system.put_events(att, &mut events).unwrap();
/// assert_eq!(data, b"first");
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct LocalEvent {
    system: u64,
    slot: usize,
    length: usize,
    endian: Endian,
}

impl LocalEvent {
    /// Arena slot of the event
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }
}

#[derive(Debug, Clone, Copy)]
struct SlotInfo {
    length: usize,
    endian: Endian,
}

#[derive(Debug)]
struct Attachment {
    station: StationId,
    held: HashSet<usize>,
    woken: bool,
}

#[derive(Debug)]
struct State {
    id: u64,
    alive: bool,
    free: VecDeque<usize>,
    slots: Vec<SlotInfo>,
    stations: Vec<Station>,
    attachments: HashMap<u32, Attachment>,
    next_station: u32,
    next_attachment: u32,
}

impl State {
    fn check_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(SharedMemoryError::Dead)
        }
    }

    fn station_index(&self, id: StationId) -> Result<usize> {
        self.stations
            .iter()
            .position(|station| station.id == id)
            .ok_or(SharedMemoryError::StationNotFound(id.0))
    }

    /// Queue `slot` at the first accepting station from `start` on
    fn route(&mut self, start: usize, slot: usize) {
        for station in self.stations.iter_mut().skip(start) {
            if station.accepts() {
                station.queue.push_back(slot);
                return;
            }
        }
        self.free.push_back(slot);
    }

    /// Move up to `capacity` queued events to the attachment
    fn take(&mut self, id: AttachmentId, capacity: usize, out: &mut Vec<LocalEvent>) -> Result<Option<usize>> {
        let attachment = self
            .attachments
            .get_mut(&id.0)
            .ok_or(SharedMemoryError::AttachmentNotFound(id.0))?;
        if attachment.woken {
            attachment.woken = false;
            return Err(SharedMemoryError::Woken);
        }

        let index = self
            .stations
            .iter()
            .position(|station| station.id == attachment.station)
            .ok_or(SharedMemoryError::StationNotFound(attachment.station.0))?;
        let queue = &mut self.stations[index].queue;
        if queue.is_empty() {
            return Ok(None);
        }

        let count = capacity.min(queue.len());
        out.reserve(count);
        for slot in queue.drain(..count) {
            let info = self.slots[slot];
            attachment.held.insert(slot);
            out.push(LocalEvent {
                system: self.id,
                slot,
                length: info.length,
                endian: info.endian,
            });
        }
        Ok(Some(count))
    }

    /// Take `events` away from the attachment, checking ownership first
    fn reclaim(&mut self, id: AttachmentId, events: &[LocalEvent]) -> Result<usize> {
        let attachment = self
            .attachments
            .get_mut(&id.0)
            .ok_or(SharedMemoryError::AttachmentNotFound(id.0))?;
        let system = self.id;
        if let Some(event) = events
            .iter()
            .find(|event| event.system != system || !attachment.held.contains(&event.slot))
        {
            return Err(SharedMemoryError::NotOwned {
                slot: event.slot,
                attachment: id.0,
            });
        }
        for event in events {
            attachment.held.remove(&event.slot);
        }
        let station = attachment.station;
        self.station_index(station)
    }
}

struct Shared {
    id: u64,
    config: SystemConfig,
    arena: EventArena,
    state: Mutex<State>,
    changed: Condvar,
}

/// Cheaply clonable handle to a local event system
#[derive(Clone)]
pub struct LocalEventSystem {
    shared: Arc<Shared>,
}

impl LocalEventSystem {
    /// Create the event pool and map its arena
    pub fn create(config: SystemConfig) -> Result<Self> {
        if config.max_stations == 0 {
            return Err(SharedMemoryError::InvalidSize {
                what: "station limit",
                size: 0,
                min: 1,
                max: usize::MAX,
            });
        }

        let arena = match &config.file {
            Some(path) => EventArena::file_backed(path, config.event_count, config.event_size)?,
            None => EventArena::anonymous(config.event_count, config.event_size)?,
        };

        let id = NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed);
        let state = State {
            id,
            alive: true,
            free: (0..config.event_count).collect(),
            slots: vec![
                SlotInfo {
                    length: 0,
                    endian: Endian::native(),
                };
                config.event_count
            ],
            stations: Vec::new(),
            attachments: HashMap::new(),
            next_station: 1,
            next_attachment: 1,
        };

        info!(
            "Created event system: {} events of {} bytes{}",
            config.event_count,
            config.event_size,
            config
                .file
                .as_ref()
                .map(|path| format!(" in {}", path.display()))
                .unwrap_or_default()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                config,
                arena,
                state: Mutex::new(state),
                changed: Condvar::new(),
            }),
        })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.shared.config
    }

    pub fn is_alive(&self) -> bool {
        self.shared.state.lock().alive
    }

    /// Create a station, or find the existing one with the same name
    #[instrument(skip(self, config))]
    pub fn create_station(&self, name: &str, config: StationConfig) -> Result<StationId> {
        if name.is_empty() || name.len() > MAX_STATION_NAME || name.contains('\0') {
            return Err(SharedMemoryError::InvalidName(name.to_string()));
        }
        if let Flow::Parallel(_) = config.flow {
            return Err(SharedMemoryError::Unsupported(
                "parallel station flow".to_string(),
            ));
        }
        if !config.blocking && (config.cue == 0 || config.cue > self.shared.config.event_count) {
            return Err(SharedMemoryError::InvalidSize {
                what: "station cue",
                size: config.cue,
                min: 1,
                max: self.shared.config.event_count,
            });
        }

        let mut state = self.shared.state.lock();
        state.check_alive()?;

        if let Some(existing) = state.stations.iter().find(|station| station.name == name) {
            debug!("Station {} already exists as {}", name, existing.id);
            return Ok(existing.id);
        }
        if state.stations.len() >= self.shared.config.max_stations {
            return Err(SharedMemoryError::TooManyStations {
                max: self.shared.config.max_stations,
            });
        }

        let id = StationId(state.next_station);
        state.next_station += 1;
        let index = insertion_index(config.position, state.stations.len());
        state
            .stations
            .insert(index, Station::new(id, name.to_string(), config));
        debug!("Created station {} as {} at index {}", name, id, index);
        Ok(id)
    }

    /// Attach to a station
    #[instrument(skip(self))]
    pub fn attach(&self, station: StationId) -> Result<AttachmentId> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        let index = state.station_index(station)?;

        let id = state.next_attachment;
        state.next_attachment += 1;
        state.stations[index].attachments += 1;
        state.attachments.insert(
            id,
            Attachment {
                station,
                held: HashSet::new(),
                woken: false,
            },
        );
        debug!("Attached att#{} to {}", id, station);
        Ok(AttachmentId(id))
    }

    /// Detach from a station
    ///
    /// Held events must be put or dumped first. When the last attachment
    /// leaves, the station's queue moves on to the next station.
    #[instrument(skip(self))]
    pub fn detach(&self, attachment: AttachmentId) -> Result<()> {
        let mut state = self.shared.state.lock();
        let held = state
            .attachments
            .get(&attachment.0)
            .ok_or(SharedMemoryError::AttachmentNotFound(attachment.0))?
            .held
            .len();
        if held > 0 {
            warn!("{} cannot detach while holding {} events", attachment, held);
            return Err(SharedMemoryError::EventsHeld {
                attachment: attachment.0,
                held,
            });
        }

        let removed = state
            .attachments
            .remove(&attachment.0)
            .ok_or(SharedMemoryError::AttachmentNotFound(attachment.0))?;
        let index = state.station_index(removed.station)?;

        let station = &mut state.stations[index];
        station.attachments -= 1;
        if station.attachments == 0 {
            let slots: Vec<usize> = station.queue.drain(..).collect();
            for slot in slots {
                state.route(index + 1, slot);
            }
        }

        self.shared.changed.notify_all();
        debug!("Detached {}", attachment);
        Ok(())
    }

    /// Copy `payload` into a free event and send it down the stations
    ///
    /// Blocks while the pool has no free event.
    pub fn publish(&self, payload: &[u8], endian: Endian) -> Result<()> {
        let max = self.shared.config.event_size;
        if payload.len() > max {
            return Err(SharedMemoryError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let slot = {
            let mut state = self.shared.state.lock();
            loop {
                state.check_alive()?;
                if let Some(slot) = state.free.pop_front() {
                    break slot;
                }
                self.shared.changed.wait(&mut state);
            }
        };

        // Safety: the slot left the free list and is in no queue, so this
        // thread is its only owner until it is routed below.
        unsafe { self.shared.arena.write(slot, payload)? };

        let mut state = self.shared.state.lock();
        state.slots[slot] = SlotInfo {
            length: payload.len(),
            endian,
        };
        state.route(0, slot);
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Get up to `capacity` events queued at the attachment's station
    pub fn get_events(
        &self,
        attachment: AttachmentId,
        capacity: usize,
        wait: WaitPolicy,
        out: &mut Vec<LocalEvent>,
    ) -> Result<usize> {
        if capacity == 0 {
            return Ok(0);
        }
        let deadline = match wait {
            WaitPolicy::Timed(timeout) => Some(Instant::now() + timeout),
            WaitPolicy::Sleep | WaitPolicy::Async => None,
        };

        let mut state = self.shared.state.lock();
        loop {
            state.check_alive()?;
            if let Some(count) = state.take(attachment, capacity, out)? {
                return Ok(count);
            }
            match (wait, deadline) {
                (WaitPolicy::Async, _) => return Err(SharedMemoryError::Empty),
                (_, Some(deadline)) => {
                    if Instant::now() >= deadline {
                        return Err(SharedMemoryError::Timeout);
                    }
                    self.shared.changed.wait_until(&mut state, deadline);
                }
                (_, None) => self.shared.changed.wait(&mut state),
            }
        }
    }

    /// Pass events on to the stations after the attachment's own
    ///
    /// `events` is drained on success and untouched on failure.
    pub fn put_events(&self, attachment: AttachmentId, events: &mut Vec<LocalEvent>) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        let index = state.reclaim(attachment, events)?;
        for event in events.drain(..) {
            state.route(index + 1, event.slot);
        }
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Return events straight to the free pool, skipping later stations
    pub fn dump_events(&self, attachment: AttachmentId, events: &mut Vec<LocalEvent>) -> Result<()> {
        let mut state = self.shared.state.lock();
        state.check_alive()?;
        state.reclaim(attachment, events)?;
        for event in events.drain(..) {
            state.free.push_back(event.slot);
        }
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Make the attachment's blocked (or next) get return `Woken`
    pub fn wake_attachment(&self, attachment: AttachmentId) -> Result<()> {
        let mut state = self.shared.state.lock();
        let entry = state
            .attachments
            .get_mut(&attachment.0)
            .ok_or(SharedMemoryError::AttachmentNotFound(attachment.0))?;
        entry.woken = true;
        self.shared.changed.notify_all();
        debug!("Woke {}", attachment);
        Ok(())
    }

    /// Shut the system down; every blocked and later call fails with `Dead`
    pub fn kill(&self) {
        let mut state = self.shared.state.lock();
        if state.alive {
            state.alive = false;
            info!("Event system killed");
        }
        self.shared.changed.notify_all();
    }

    /// Events waiting in a station's queue
    pub fn queued(&self, station: StationId) -> Result<usize> {
        let state = self.shared.state.lock();
        let index = state.station_index(station)?;
        Ok(state.stations[index].queue.len())
    }

    /// Events in the free pool
    pub fn free_events(&self) -> usize {
        self.shared.state.lock().free.len()
    }

    /// Payload bytes of a held event
    ///
    /// A handle issued by another system reads as empty.
    pub fn event_data<'a>(&'a self, event: &'a LocalEvent) -> &'a [u8] {
        if event.system != self.shared.id {
            warn!("Event in slot {} belongs to another system", event.slot);
            return &[];
        }
        // Safety: a live handle means its slot is held, so it is in no queue
        // and not free. The slot is only released by put or dump, which
        // consume the handle and therefore end this borrow first.
        unsafe { self.shared.arena.read(event.slot, event.length) }
    }
}

impl std::fmt::Debug for LocalEventSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEventSystem")
            .field("config", &self.shared.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::{ParallelPosition, Position};
    use std::thread;
    use std::time::Duration;

    fn system(event_count: usize) -> LocalEventSystem {
        LocalEventSystem::create(SystemConfig {
            event_count,
            event_size: 64,
            ..SystemConfig::default()
        })
        .unwrap()
    }

    fn get_now(system: &LocalEventSystem, att: AttachmentId, capacity: usize) -> Vec<LocalEvent> {
        let mut out = Vec::new();
        system
            .get_events(att, capacity, WaitPolicy::Async, &mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_publish_get_put() {
        let system = system(4);
        let station = system.create_station("reader", StationConfig::default()).unwrap();
        let att = system.attach(station).unwrap();

        system.publish(b"one", Endian::Big).unwrap();
        system.publish(b"two!", Endian::Little).unwrap();
        assert_eq!(system.queued(station).unwrap(), 2);
        assert_eq!(system.free_events(), 2);

        let mut events = get_now(&system, att, 10);
        assert_eq!(events.len(), 2);
        assert_eq!(system.event_data(&events[0]), b"one");
        assert_eq!(events[0].endian(), Endian::Big);
        assert_eq!(events[1].length(), 4);

        system.put_events(att, &mut events).unwrap();
        assert!(events.is_empty());
        assert_eq!(system.free_events(), 4);
    }

    #[test]
    fn test_capacity_limits_get() {
        let system = system(8);
        let station = system.create_station("reader", StationConfig::default()).unwrap();
        let att = system.attach(station).unwrap();
        for _ in 0..5 {
            system.publish(b"x", Endian::native()).unwrap();
        }

        assert_eq!(get_now(&system, att, 3).len(), 3);
        assert_eq!(get_now(&system, att, 3).len(), 2);
    }

    #[test]
    fn test_serial_routing_in_position_order() {
        let system = system(4);
        let second = system.create_station("second", StationConfig::default()).unwrap();
        let first = system
            .create_station(
                "first",
                StationConfig {
                    position: Position::At(1),
                    ..StationConfig::default()
                },
            )
            .unwrap();
        let att_first = system.attach(first).unwrap();
        let att_second = system.attach(second).unwrap();

        system.publish(b"event", Endian::native()).unwrap();
        assert_eq!(system.queued(first).unwrap(), 1);
        assert_eq!(system.queued(second).unwrap(), 0);

        let mut events = get_now(&system, att_first, 1);
        system.put_events(att_first, &mut events).unwrap();
        assert_eq!(system.queued(second).unwrap(), 1);

        let mut events = get_now(&system, att_second, 1);
        assert_eq!(system.event_data(&events[0]), b"event");
        system.put_events(att_second, &mut events).unwrap();
        assert_eq!(system.free_events(), 4);
    }

    #[test]
    fn test_non_blocking_station_overflows_to_next() {
        let system = system(8);
        let sampler = system
            .create_station("sampler", StationConfig::non_blocking(2))
            .unwrap();
        let archive = system.create_station("archive", StationConfig::default()).unwrap();
        system.attach(sampler).unwrap();
        system.attach(archive).unwrap();

        for _ in 0..5 {
            system.publish(b"x", Endian::native()).unwrap();
        }
        assert_eq!(system.queued(sampler).unwrap(), 2);
        assert_eq!(system.queued(archive).unwrap(), 3);
    }

    #[test]
    fn test_idle_station_is_skipped() {
        let system = system(2);
        let idle = system.create_station("idle", StationConfig::default()).unwrap();
        system.publish(b"x", Endian::native()).unwrap();
        assert_eq!(system.queued(idle).unwrap(), 0);
        assert_eq!(system.free_events(), 2);
    }

    #[test]
    fn test_dump_skips_later_stations() {
        let system = system(2);
        let first = system.create_station("first", StationConfig::default()).unwrap();
        let second = system.create_station("second", StationConfig::default()).unwrap();
        let att = system.attach(first).unwrap();
        system.attach(second).unwrap();

        system.publish(b"x", Endian::native()).unwrap();
        let mut events = get_now(&system, att, 1);
        system.dump_events(att, &mut events).unwrap();
        assert_eq!(system.queued(second).unwrap(), 0);
        assert_eq!(system.free_events(), 2);
    }

    #[test]
    fn test_put_rejects_foreign_events() {
        let system = system(2);
        let station = system.create_station("s", StationConfig::non_blocking(1)).unwrap();
        let owner = system.attach(station).unwrap();
        let other = system.attach(station).unwrap();

        system.publish(b"x", Endian::native()).unwrap();
        let mut events = get_now(&system, owner, 1);
        let err = system.put_events(other, &mut events).unwrap_err();
        assert!(matches!(err, SharedMemoryError::NotOwned { .. }));
        assert_eq!(events.len(), 1, "events must be left untouched on failure");

        system.put_events(owner, &mut events).unwrap();
    }

    #[test]
    fn test_handles_from_another_system_are_rejected() {
        let first = system(2);
        let second = system(2);
        let mut atts = Vec::new();
        for system in [&first, &second] {
            let station = system.create_station("s", StationConfig::default()).unwrap();
            let att = system.attach(station).unwrap();
            system.publish(b"mine", Endian::native()).unwrap();
            atts.push(att);
        }

        let mut foreign = get_now(&first, atts[0], 1);
        let mut own = get_now(&second, atts[1], 1);
        assert_eq!(foreign[0].slot(), own[0].slot());

        assert!(second.event_data(&foreign[0]).is_empty());
        let err = second.put_events(atts[1], &mut foreign).unwrap_err();
        assert!(matches!(err, SharedMemoryError::NotOwned { .. }));
        assert_eq!(foreign.len(), 1);

        assert_eq!(second.event_data(&own[0]), b"mine");
        second.put_events(atts[1], &mut own).unwrap();
        first.put_events(atts[0], &mut foreign).unwrap();
    }

    #[test]
    fn test_wait_policies() {
        let system = system(2);
        let station = system.create_station("s", StationConfig::default()).unwrap();
        let att = system.attach(station).unwrap();
        let mut out = Vec::new();

        let err = system
            .get_events(att, 1, WaitPolicy::Async, &mut out)
            .unwrap_err();
        assert!(matches!(err, SharedMemoryError::Empty));

        let started = Instant::now();
        let err = system
            .get_events(att, 1, WaitPolicy::Timed(Duration::from_millis(20)), &mut out)
            .unwrap_err();
        assert!(matches!(err, SharedMemoryError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleeping_get_wakes_on_publish() {
        let system = system(2);
        let station = system.create_station("s", StationConfig::default()).unwrap();
        let att = system.attach(station).unwrap();

        let producer = system.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.publish(b"late", Endian::native()).unwrap();
        });

        let mut out = Vec::new();
        let count = system
            .get_events(att, 2, WaitPolicy::Sleep, &mut out)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(system.event_data(&out[0]), b"late");
        handle.join().unwrap();
    }

    #[test]
    fn test_wake_attachment() {
        let system = system(2);
        let station = system.create_station("s", StationConfig::default()).unwrap();
        let att = system.attach(station).unwrap();

        let waker = system.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.wake_attachment(att).unwrap();
        });

        let mut out = Vec::new();
        let err = system
            .get_events(att, 1, WaitPolicy::Sleep, &mut out)
            .unwrap_err();
        assert!(matches!(err, SharedMemoryError::Woken));
        handle.join().unwrap();

        // the wake-up is consumed by one get
        let err = system
            .get_events(att, 1, WaitPolicy::Async, &mut out)
            .unwrap_err();
        assert!(matches!(err, SharedMemoryError::Empty));
    }

    #[test]
    fn test_kill_unblocks_everyone() {
        let system = system(1);
        let station = system.create_station("s", StationConfig::default()).unwrap();
        let att = system.attach(station).unwrap();

        let killer = system.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            killer.kill();
        });

        let mut out = Vec::new();
        let err = system
            .get_events(att, 1, WaitPolicy::Sleep, &mut out)
            .unwrap_err();
        assert!(matches!(err, SharedMemoryError::Dead));
        handle.join().unwrap();

        assert!(!system.is_alive());
        assert!(matches!(
            system.publish(b"x", Endian::native()),
            Err(SharedMemoryError::Dead)
        ));
    }

    #[test]
    fn test_station_creation_rules() {
        let system = LocalEventSystem::create(SystemConfig {
            event_count: 4,
            event_size: 64,
            max_stations: 2,
            file: None,
        })
        .unwrap();

        let a = system.create_station("a", StationConfig::default()).unwrap();
        assert_eq!(system.create_station("a", StationConfig::default()).unwrap(), a);
        system.create_station("b", StationConfig::default()).unwrap();
        assert!(matches!(
            system.create_station("c", StationConfig::default()),
            Err(SharedMemoryError::TooManyStations { max: 2 })
        ));

        let parallel = StationConfig {
            flow: Flow::Parallel(ParallelPosition::End),
            ..StationConfig::default()
        };
        assert!(matches!(
            system.create_station("p", parallel),
            Err(SharedMemoryError::Unsupported(_))
        ));
        assert!(matches!(
            system.create_station("", StationConfig::default()),
            Err(SharedMemoryError::InvalidName(_))
        ));
        assert!(system.create_station("q", StationConfig::non_blocking(0)).is_err());
    }

    #[test]
    fn test_detach_moves_events_on() {
        let system = system(4);
        let first = system.create_station("first", StationConfig::default()).unwrap();
        let second = system.create_station("second", StationConfig::default()).unwrap();
        let att = system.attach(first).unwrap();
        system.attach(second).unwrap();

        for _ in 0..3 {
            system.publish(b"x", Endian::native()).unwrap();
        }
        let mut held = get_now(&system, att, 1);
        assert_eq!(held.len(), 1);

        let err = system.detach(att).unwrap_err();
        assert!(matches!(err, SharedMemoryError::EventsHeld { held: 1, .. }));
        assert_eq!(system.queued(first).unwrap(), 2);

        system.put_events(att, &mut held).unwrap();
        system.detach(att).unwrap();
        assert_eq!(system.queued(first).unwrap(), 0);
        assert_eq!(system.queued(second).unwrap(), 3);
        assert!(matches!(
            system.detach(att),
            Err(SharedMemoryError::AttachmentNotFound(_))
        ));
    }

    #[test]
    fn test_file_backed_system() {
        let dir = tempfile::tempdir().unwrap();
        let system = LocalEventSystem::create(SystemConfig {
            event_count: 2,
            event_size: 128,
            file: Some(dir.path().join("et_events")),
            ..SystemConfig::default()
        })
        .unwrap();
        let station = system.create_station("s", StationConfig::default()).unwrap();
        let att = system.attach(station).unwrap();

        system.publish(&[7u8; 128], Endian::Big).unwrap();
        let events = get_now(&system, att, 1);
        assert_eq!(system.event_data(&events[0]), &[7u8; 128][..]);
    }
}
