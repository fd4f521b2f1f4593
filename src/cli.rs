use clap::Parser;
use std::path::PathBuf;

/// Consume every event of a station, reading its records, and put the events back
///
/// The consumer connects directly to the ET system's host unless multicast
/// addresses are given with -a, or -m or -b is used, in which case the system
/// is found by multi/broadcasting.
#[derive(Parser, Debug, PartialEq)]
#[clap(name = "et_consumer", author, version, about, long_about = None)]
pub struct Cli {
    /// ET system's (memory-mapped file) name
    #[clap(short = 'f', long = "et-name", value_name = "ET name")]
    pub et_name: Option<String>,

    /// Create (or reuse) a station of this name
    #[clap(short, long, value_name = "station name")]
    pub station: Option<String>,

    /// ET system's host if direct connection (default to local)
    #[clap(long)]
    pub host: Option<String>,

    /// Port, TCP if direct, else UDP
    #[clap(short, long, value_parser = clap::value_parser!(u16).range(1024..65535))]
    pub port: Option<u16>,

    /// Act as remote (TCP) client even if ET system is local
    #[clap(short, long)]
    pub remote: bool,

    /// Multicast to find ET (use default address if -a unused)
    #[clap(short, long)]
    pub multicast: bool,

    /// Broadcast to find ET
    #[clap(short, long)]
    pub broadcast: bool,

    /// Multicast address (dot-decimal), may be used multiple times
    #[clap(short = 'a', long = "mcast-addr", value_name = "mcast addr")]
    pub mcast_addrs: Vec<String>,

    /// Outgoing network interface address (dot-decimal)
    #[clap(short, long)]
    pub interface: Option<String>,

    /// TCP receive buffer size (bytes)
    #[clap(long = "rb", value_name = "buf size", value_parser = clap::value_parser!(u32).range(1..))]
    pub recv_buffer: Option<u32>,

    /// TCP send buffer size (bytes)
    #[clap(long = "sb", value_name = "buf size", value_parser = clap::value_parser!(u32).range(1..))]
    pub send_buffer: Option<u32>,

    /// Use TCP_NODELAY option
    #[clap(long = "nd")]
    pub no_delay: bool,

    /// Number of events in one get/put array
    #[clap(short, long = "chunk", value_name = "chunk size", value_parser = clap::value_parser!(u64).range(1..=1000))]
    pub chunk: Option<u64>,

    /// Queue size if creating non-blocking station
    #[clap(short, long = "queue", value_name = "Q size", value_parser = clap::value_parser!(u64).range(1..))]
    pub queue: Option<u64>,

    /// Make station non-blocking
    #[clap(long = "nb")]
    pub non_blocking: bool,

    /// Position of station (1,2,...)
    #[clap(long = "pos", value_name = "station pos", value_parser = clap::value_parser!(u64).range(1..))]
    pub position: Option<u64>,

    /// Position within a group of parallel stations (-1=end, -2=head)
    #[clap(
        long = "ppos",
        value_name = "parallel station pos",
        allow_hyphen_values = true,
        value_parser = parse_parallel_position
    )]
    pub parallel_position: Option<i32>,

    /// Verbose output (also prints data if reading with --read)
    #[clap(short, long)]
    pub verbose: bool,

    /// Print the words of every record
    #[clap(long)]
    pub read: bool,

    /// Dump events back into ET (straight to the free pool) instead of put
    #[clap(long)]
    pub dump: bool,

    /// Configuration file
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long)]
    pub log_level: Option<String>,

    /// Events published by the embedded producer (0 = none)
    #[clap(long, value_name = "count")]
    pub produce: Option<u64>,

    /// Size of one event in the pool (bytes)
    #[clap(long, value_name = "bytes")]
    pub event_size: Option<usize>,

    /// Number of events in the pool
    #[clap(long, value_name = "count")]
    pub events: Option<usize>,

    /// Seconds between rate reports (0 = off)
    #[clap(long, value_name = "seconds")]
    pub stats_interval: Option<u64>,
}

fn parse_parallel_position(value: &str) -> Result<i32, String> {
    let position: i32 = value
        .parse()
        .map_err(|_| format!("{:?} is not a number", value))?;
    if position > -3 && position != 0 {
        Ok(position)
    } else {
        Err("must be > -3 and != 0".to_string())
    }
}
