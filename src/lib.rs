//! evet - chunked event consumer
//!
//! Command line, configuration, and the consumer loop of `et_consumer`, built
//! on the session in `evet-core` and the local event system in
//! `evet-shared-memory`.

pub mod cli;
pub mod config;
pub mod consumer;
pub mod producer;

pub use cli::Cli;
pub use config::{Connection, ConsumerConfig};
pub use consumer::{request_shutdown, run_consumer, LoopOptions, StopReason};
