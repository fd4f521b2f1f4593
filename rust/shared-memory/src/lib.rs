//! evet - Local Event System
//!
//! An in-process event system for evet consumers: a fixed pool of events in a
//! memory-mapped arena, flowing through ordered stations.

pub mod adapter;
pub mod error;
pub mod platform;
pub mod region;
pub mod station;
pub mod system;

pub use adapter::*;
pub use error::*;
pub use platform::*;
pub use region::*;
pub use station::{Flow, ParallelPosition, Position, StationConfig, StationId, DEFAULT_CUE};
pub use system::*;
