//! Consumer loop: read records until shutdown or a fatal error

use anyhow::{Context, Result};
use evet_core::{
    AttachmentId, EventTransport, EvetError, EvetSession, RateMeter, Record, RecordCodec,
    TransportError,
};
use evet_shared_memory::LocalEventSystem;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Loop settings
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Print the words of every record
    pub read: bool,
    /// Interval between rate lines; zero disables them
    pub stats_interval: Duration,
}

/// Why the loop ended
#[derive(Debug)]
pub enum StopReason {
    /// Shutdown was requested
    Interrupted,
    /// A session error that retrying cannot fix
    Failed(EvetError),
}

/// Read records until `shutdown` is set or a non-recoverable error occurs
///
/// Transient transport conditions and exhausted chunks are retried. A
/// `Woken` get counts as transient unless shutdown was requested.
pub fn run_consumer<T, C, W>(
    session: &mut EvetSession<T, C>,
    options: &LoopOptions,
    shutdown: &AtomicBool,
    out: &mut W,
) -> Result<StopReason>
where
    T: EventTransport,
    C: RecordCodec,
    W: Write,
{
    let mut meter = RateMeter::new();
    let mut index = 0u64;

    loop {
        if shutdown.load(Ordering::Acquire) {
            return Ok(StopReason::Interrupted);
        }

        match session.next_record() {
            Ok(record) => {
                if options.read {
                    print_record(out, index, &record).context("Failed to print record")?;
                }
                index += 1;
            }
            Err(EvetError::Transport(TransportError::Woken)) if shutdown.load(Ordering::Acquire) => {
                return Ok(StopReason::Interrupted);
            }
            Err(err) if err.is_recoverable() => {
                debug!("Retrying after {}", err);
                continue;
            }
            Err(err) => {
                error!("Consumer stopping: {} ({:?})", err, err.category());
                return Ok(StopReason::Failed(err));
            }
        }

        if !options.stats_interval.is_zero() {
            if let Some(sample) = meter.sample(session.stats(), Instant::now(), options.stats_interval) {
                info!(
                    "Rate: {:.0} records/s, average {:.0} records/s, total {}",
                    sample.rate, sample.average, sample.total
                );
            }
        }
    }
}

/// Ask a consumer blocked on `attachment` to stop
///
/// Sets `shutdown` and wakes the attachment. If the wake-up cannot be
/// delivered the system is killed, which fails the blocked get as well.
pub fn request_shutdown(system: &LocalEventSystem, attachment: AttachmentId, shutdown: &AtomicBool) {
    shutdown.store(true, Ordering::Release);
    if let Err(e) = system.wake_attachment(attachment) {
        error!("Failed to wake the consumer: {}", e);
        system.kill();
    }
}

/// Print a record's words in hex, eight per line
pub fn print_record<W: Write>(out: &mut W, index: u64, record: &Record<'_>) -> std::io::Result<()> {
    writeln!(out, "evetRead({:2}):", index)?;
    let mut count = 0;
    for word in record.words() {
        write!(out, "0x{:08x} ", word)?;
        count += 1;
        if count % 8 == 0 {
            writeln!(out)?;
        }
    }
    if count % 8 != 0 {
        writeln!(out)?;
    }
    Ok(())
}
