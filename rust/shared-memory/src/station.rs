//! Station configuration and queues

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Default queue length a non-blocking station accepts
pub const DEFAULT_CUE: usize = 10;

/// Identifier of a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationId(pub u32);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stat#{}", self.0)
    }
}

/// Where a station sits in the event flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    /// After every existing station
    End,
    /// 1-based position; larger than the station count means the end
    At(usize),
}

/// Position inside a group of parallel stations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParallelPosition {
    End,
    Head,
    At(usize),
}

/// Event flow through a station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flow {
    /// Every event passes through the station in turn
    Serial,
    /// The station shares events with the other stations of its group
    Parallel(ParallelPosition),
}

/// Station configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    pub flow: Flow,
    /// Blocking stations take every event that reaches them
    pub blocking: bool,
    /// Queue length beyond which a non-blocking station lets events pass
    pub cue: usize,
    pub position: Position,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            flow: Flow::Serial,
            blocking: true,
            cue: DEFAULT_CUE,
            position: Position::End,
        }
    }
}

impl StationConfig {
    /// A non-blocking station keeping at most `cue` events
    pub fn non_blocking(cue: usize) -> Self {
        Self {
            blocking: false,
            cue,
            ..Self::default()
        }
    }
}

/// One station with its input queue
#[derive(Debug)]
pub(crate) struct Station {
    pub id: StationId,
    pub name: String,
    pub config: StationConfig,
    /// Arena slots waiting to be read
    pub queue: VecDeque<usize>,
    /// Number of attachments
    pub attachments: usize,
}

impl Station {
    pub fn new(id: StationId, name: String, config: StationConfig) -> Self {
        Self {
            id,
            name,
            config,
            queue: VecDeque::new(),
            attachments: 0,
        }
    }

    /// Whether an event arriving now is queued here rather than passed on
    pub fn accepts(&self) -> bool {
        if self.attachments == 0 {
            return false;
        }
        self.config.blocking || self.queue.len() < self.config.cue
    }
}

/// Index at which a station with `position` is inserted among `count` stations
pub(crate) fn insertion_index(position: Position, count: usize) -> usize {
    match position {
        Position::End => count,
        Position::At(n) => n.saturating_sub(1).min(count),
    }
}
