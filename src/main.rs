use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use evet::config::TcpConfig;
use evet::producer::produce;
use evet::{request_shutdown, run_consumer, Cli, ConsumerConfig, LoopOptions, StopReason};
use evet_core::evio::EvioCodec;
use evet_core::EvetSession;
use evet_shared_memory::{LocalEventSystem, LocalTransport, ReleaseMode};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // without a config file the names can only come from the flags
    if cli.config.is_none() && (cli.et_name.is_none() || cli.station.is_none()) {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "-f <ET name> and -s <station name> are required",
            )
            .exit();
    }

    let config = match ConsumerConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("et_consumer: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ConsumerConfig) -> Result<()> {
    let connection = config.connection();
    info!("Using {}", connection);
    if !connection.is_local() || config.remote {
        bail!(
            "The local event system only serves direct local connections, not a {}{}",
            connection,
            if config.remote { " as remote client" } else { "" }
        );
    }
    if config.tcp != TcpConfig::default() || config.interface.is_some() {
        debug!("TCP and interface settings have no effect on a local connection");
    }

    let system = LocalEventSystem::create(config.system_config())
        .with_context(|| format!("Failed to open ET system {}", config.et_name))?;
    info!("ET is local");

    let station = system
        .create_station(&config.station, config.station_config())
        .with_context(|| format!("Failed to create station {}", config.station))?;
    let attachment = system
        .attach(station)
        .context("Failed to attach to station")?;

    let release = if config.dump {
        ReleaseMode::Dump
    } else {
        ReleaseMode::Put
    };
    let transport = LocalTransport::new(system.clone(), release);
    let mut session = EvetSession::open(transport, attachment, config.chunk_size, EvioCodec)
        .context("Failed to open consumer session")?;
    session.set_verbose(config.verbose);

    let producer = (config.producer.events > 0).then(|| {
        let system = system.clone();
        let count = config.producer.events;
        let banks = config.producer.banks_per_event;
        tokio::task::spawn_blocking(move || produce(&system, count, banks))
    });

    let shutdown = Arc::new(AtomicBool::new(false));
    let options = LoopOptions {
        read: config.read,
        stats_interval: Duration::from_secs(config.stats_interval),
    };
    let flag = Arc::clone(&shutdown);
    let mut consumer = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let reason = run_consumer(&mut session, &options, &flag, &mut out);
        let closed = session.close();
        (reason, closed, *session.stats())
    });

    let joined = tokio::select! {
        joined = &mut consumer => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("Interrupted, shutting down");
                    request_shutdown(&system, attachment, &shutdown);
                }
                Err(e) => warn!("Cannot listen for interrupts: {}", e),
            }
            consumer.await
        }
    };
    let (reason, closed, stats) = joined.context("Consumer task failed")?;

    if let Err(e) = closed {
        warn!("Session close reported: {}", e);
    }
    if let Err(e) = system.detach(attachment) {
        warn!("Failed to detach from station: {}", e);
    }
    system.kill();

    if let Some(producer) = producer {
        match producer.await {
            Ok(Ok(count)) => debug!("Producer stopped after {} events", count),
            Ok(Err(e)) => warn!("Producer failed: {}", e),
            Err(e) => warn!("Producer task failed: {}", e),
        }
    }

    info!(
        "Read {} records ({} bytes) from {} events in {} batches, released {} events",
        stats.records,
        stats.record_bytes,
        stats.chunks_visited,
        stats.batches_fetched,
        stats.events_released
    );
    match reason? {
        StopReason::Interrupted => info!("Consumer interrupted"),
        StopReason::Failed(err) => info!("Consumer ended: {}", err),
    }
    Ok(())
}
