use crate::cli::Cli;
use anyhow::{bail, Context, Result};
use evet_shared_memory::{
    Flow, ParallelPosition, Position, StationConfig, SystemConfig, DEFAULT_CUE, MAX_STATION_NAME,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Longest ET system name accepted
pub const MAX_ET_NAME: usize = 100;
/// Largest number of events in one get/put
pub const MAX_CHUNK: usize = 1000;
/// Multicast addresses beyond this count are ignored
pub const MAX_MULTICAST_ADDRS: usize = 10;
/// TCP port of an ET server
pub const DEFAULT_SERVER_PORT: u16 = 11111;
/// UDP port used to find an ET system by multi/broadcast
pub const DEFAULT_UDP_PORT: u16 = 11111;
/// Multicast address used when none is given
pub const DEFAULT_MULTICAST_ADDR: &str = "239.200.0.0";
/// Host name meaning "this machine"
pub const HOST_LOCAL: &str = ".local";

/// Consumer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// ET system (memory-mapped file) name
    #[serde(default)]
    pub et_name: String,

    /// Station to create or reuse
    #[serde(default)]
    pub station: String,

    /// Events per get/put
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Cue of a non-blocking station, 0 for the station default
    #[serde(default)]
    pub queue_size: usize,

    #[serde(default = "default_true")]
    pub blocking: bool,

    /// 1-based station position, end when unset
    #[serde(default)]
    pub position: Option<usize>,

    /// Position inside a parallel group (-1 end, -2 head); selects parallel flow
    #[serde(default)]
    pub parallel_position: Option<i32>,

    /// ET host for a direct connection, local when unset
    #[serde(default)]
    pub host: Option<String>,

    /// TCP port if direct, else UDP
    #[serde(default)]
    pub port: Option<u16>,

    /// Act as a remote client even when the system is local
    #[serde(default)]
    pub remote: bool,

    #[serde(default)]
    pub multicast: bool,

    #[serde(default)]
    pub broadcast: bool,

    #[serde(default)]
    pub multicast_addrs: Vec<String>,

    /// Outgoing network interface address
    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default)]
    pub tcp: TcpConfig,

    #[serde(default)]
    pub verbose: bool,

    /// Print every record
    #[serde(default)]
    pub read: bool,

    /// Dump events back to the free pool instead of putting them
    #[serde(default)]
    pub dump: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub producer: ProducerConfig,

    /// Seconds between rate lines, 0 to disable
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

/// TCP socket tuning, 0/false for the operating system defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    #[serde(default)]
    pub recv_buffer: usize,
    #[serde(default)]
    pub send_buffer: usize,
    #[serde(default)]
    pub no_delay: bool,
}

/// Embedded producer and event pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Events to publish, 0 for none
    #[serde(default)]
    pub events: u64,

    /// Banks written into each event
    #[serde(default = "default_banks_per_event")]
    pub banks_per_event: u32,

    /// Events in the pool
    #[serde(default = "default_pool_events")]
    pub pool_events: usize,

    /// Size of one event in bytes
    #[serde(default = "default_event_size")]
    pub event_size: usize,
}

fn default_chunk_size() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval() -> u64 {
    5
}

fn default_banks_per_event() -> u32 {
    4
}

fn default_pool_events() -> usize {
    300
}

fn default_event_size() -> usize {
    4096
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            et_name: String::new(),
            station: String::new(),
            chunk_size: default_chunk_size(),
            queue_size: 0,
            blocking: true,
            position: None,
            parallel_position: None,
            host: None,
            port: None,
            remote: false,
            multicast: false,
            broadcast: false,
            multicast_addrs: Vec::new(),
            interface: None,
            tcp: TcpConfig::default(),
            verbose: false,
            read: false,
            dump: false,
            log_level: default_log_level(),
            producer: ProducerConfig::default(),
            stats_interval: default_stats_interval(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            events: 0,
            banks_per_event: default_banks_per_event(),
            pool_events: default_pool_events(),
            event_size: default_event_size(),
        }
    }
}

/// How the ET system is found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Direct { host: String, port: u16 },
    Multicast { addrs: Vec<String>, port: u16 },
    Broadcast { port: u16 },
    BroadAndMulticast { addrs: Vec<String>, port: u16 },
}

impl Connection {
    /// Direct connection to this machine
    pub fn is_local(&self) -> bool {
        match self {
            Connection::Direct { host, .. } => {
                matches!(host.as_str(), HOST_LOCAL | "localhost" | "127.0.0.1" | "::1")
            }
            _ => false,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Direct { host, port } => write!(f, "direct connection to {}:{}", host, port),
            Connection::Multicast { addrs, port } => {
                write!(f, "multicast to {} on port {}", addrs.join(","), port)
            }
            Connection::Broadcast { port } => write!(f, "broadcast on port {}", port),
            Connection::BroadAndMulticast { addrs, port } => {
                write!(f, "broad and multicast to {} on port {}", addrs.join(","), port)
            }
        }
    }
}

impl ConsumerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: ConsumerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        info!("Loaded configuration from {:?}", path.as_ref());
        Ok(config)
    }

    /// Build the effective configuration: file (if any), then flags on top
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Override file values with the flags that were given
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(name) = &cli.et_name {
            self.et_name = name.clone();
        }
        if let Some(station) = &cli.station {
            self.station = station.clone();
        }
        if let Some(host) = &cli.host {
            self.host = Some(host.clone());
        }
        if let Some(port) = cli.port {
            self.port = Some(port);
        }
        if !cli.mcast_addrs.is_empty() {
            self.multicast_addrs = cli.mcast_addrs.clone();
        }
        if let Some(interface) = &cli.interface {
            self.interface = Some(interface.clone());
        }
        if let Some(size) = cli.recv_buffer {
            self.tcp.recv_buffer = size as usize;
        }
        if let Some(size) = cli.send_buffer {
            self.tcp.send_buffer = size as usize;
        }
        if let Some(chunk) = cli.chunk {
            self.chunk_size = chunk as usize;
        }
        if let Some(queue) = cli.queue {
            self.queue_size = queue as usize;
        }
        if let Some(position) = cli.position {
            self.position = Some(position as usize);
        }
        if let Some(position) = cli.parallel_position {
            self.parallel_position = Some(position);
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        if let Some(events) = cli.produce {
            self.producer.events = events;
        }
        if let Some(size) = cli.event_size {
            self.producer.event_size = size;
        }
        if let Some(count) = cli.events {
            self.producer.pool_events = count;
        }
        if let Some(interval) = cli.stats_interval {
            self.stats_interval = interval;
        }

        self.remote |= cli.remote;
        self.multicast |= cli.multicast;
        self.broadcast |= cli.broadcast;
        self.tcp.no_delay |= cli.no_delay;
        self.blocking &= !cli.non_blocking;
        self.verbose |= cli.verbose;
        self.read |= cli.read;
        self.dump |= cli.dump;

        if self.verbose {
            self.log_level = "debug".to_string();
        }
    }

    /// Check every value against its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.et_name.is_empty() || self.et_name.len() > MAX_ET_NAME {
            bail!("ET name must be 1 to {} characters", MAX_ET_NAME);
        }
        if self.station.is_empty() || self.station.len() > MAX_STATION_NAME {
            bail!("Station name must be 1 to {} characters", MAX_STATION_NAME);
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK {
            bail!("Invalid chunk size {}, must be 1 to {}", self.chunk_size, MAX_CHUNK);
        }
        if let Some(port) = self.port {
            if !(1024..65535).contains(&port) {
                bail!("Invalid port {}, must be > 1023 and < 65535", port);
            }
        }
        if let Some(position) = self.position {
            if position == 0 {
                bail!("Invalid station position 0, must be > 0");
            }
        }
        if let Some(position) = self.parallel_position {
            if position <= -3 || position == 0 {
                bail!("Invalid parallel position {}, must be > -3 and != 0", position);
            }
        }
        if let Some(host) = &self.host {
            if host.is_empty() || host.len() >= 255 {
                bail!("Host name must be 1 to 254 characters");
            }
        }
        if let Some(interface) = &self.interface {
            if !(7..=15).contains(&interface.len()) {
                bail!("Interface address {:?} is not dot-decimal", interface);
            }
        }
        if let Some(addr) = self.multicast_addrs.iter().find(|addr| addr.len() >= 16) {
            bail!("Multicast address {:?} is too long", addr);
        }
        if self.producer.pool_events == 0 {
            bail!("The event pool needs at least one event");
        }
        if self.producer.events > 0 && self.producer.event_size < crate::producer::payload_size(1) {
            bail!(
                "Event size {} cannot hold a single bank",
                self.producer.event_size
            );
        }
        Ok(())
    }

    /// Resolve how the ET system is to be found
    pub fn connection(&self) -> Connection {
        let mut addrs: Vec<String> = self
            .multicast_addrs
            .iter()
            .take(MAX_MULTICAST_ADDRS)
            .cloned()
            .collect();
        if self.multicast_addrs.len() > MAX_MULTICAST_ADDRS {
            warn!(
                "Ignoring {} multicast addresses beyond the first {}",
                self.multicast_addrs.len() - MAX_MULTICAST_ADDRS,
                MAX_MULTICAST_ADDRS
            );
        }
        let multicast = self.multicast || !addrs.is_empty();
        if multicast && addrs.is_empty() {
            addrs.push(DEFAULT_MULTICAST_ADDR.to_string());
        }
        let udp_port = self.port.unwrap_or(DEFAULT_UDP_PORT);

        match (multicast, self.broadcast) {
            (true, true) => Connection::BroadAndMulticast {
                addrs,
                port: udp_port,
            },
            (true, false) => Connection::Multicast {
                addrs,
                port: udp_port,
            },
            (false, true) => Connection::Broadcast { port: udp_port },
            (false, false) => Connection::Direct {
                host: self.host.clone().unwrap_or_else(|| HOST_LOCAL.to_string()),
                port: self.port.unwrap_or(DEFAULT_SERVER_PORT),
            },
        }
    }

    /// Station configuration for the consumer's station
    pub fn station_config(&self) -> StationConfig {
        let flow = match self.parallel_position {
            None => Flow::Serial,
            Some(-1) => Flow::Parallel(ParallelPosition::End),
            Some(-2) => Flow::Parallel(ParallelPosition::Head),
            Some(n) => Flow::Parallel(ParallelPosition::At(n.max(1) as usize)),
        };
        StationConfig {
            flow,
            blocking: self.blocking,
            cue: if self.queue_size > 0 {
                self.queue_size
            } else {
                DEFAULT_CUE
            },
            position: self.position.map_or(Position::End, Position::At),
        }
    }

    /// Event pool backing the local system, mapped onto a new ET file
    pub fn system_config(&self) -> SystemConfig {
        SystemConfig {
            event_count: self.producer.pool_events,
            event_size: self.producer.event_size,
            file: Some(PathBuf::from(&self.et_name)),
            ..SystemConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("et_consumer").chain(args.iter().copied())).unwrap()
    }

    fn valid() -> ConsumerConfig {
        ConsumerConfig {
            et_name: "/tmp/et_sys".to_string(),
            station: "consumer".to_string(),
            ..ConsumerConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ConsumerConfig::default();
        assert_eq!(config.chunk_size, 1);
        assert!(config.blocking);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.producer.events, 0);
        // name and station have no defaults
        assert!(config.validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_from_file_with_defaults() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"
et_name = "/tmp/et_from_file"
station = "monitor"
chunk_size = 20
blocking = false

[producer]
events = 100
"#
        )?;

        let config = ConsumerConfig::from_file(file.path())?;
        assert_eq!(config.et_name, "/tmp/et_from_file");
        assert_eq!(config.chunk_size, 20);
        assert!(!config.blocking);
        assert_eq!(config.producer.events, 100);
        assert_eq!(config.producer.event_size, 4096);
        assert_eq!(config.stats_interval, 5);
        Ok(())
    }

    #[test]
    fn test_flags_override_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "et_name = \"/tmp/a\"\nstation = \"s\"\nchunk_size = 5")?;
        let path = file.path().to_string_lossy().into_owned();

        let cli = parse(&["--config", &path, "-c", "50", "-s", "other", "--nb", "-q", "7"]);
        let config = ConsumerConfig::from_cli(&cli)?;
        assert_eq!(config.et_name, "/tmp/a");
        assert_eq!(config.station, "other");
        assert_eq!(config.chunk_size, 50);
        assert!(!config.blocking);
        assert_eq!(config.station_config().cue, 7);
        Ok(())
    }

    #[test]
    fn test_verbose_forces_debug() {
        let mut config = valid();
        config.apply_cli(&parse(&["-f", "x", "-s", "y", "-v", "--log-level", "warn"]));
        assert!(config.verbose);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_validation_ranges() {
        let check = |edit: &dyn Fn(&mut ConsumerConfig)| {
            let mut config = valid();
            edit(&mut config);
            config.validate()
        };

        assert!(check(&|c| c.chunk_size = 0).is_err());
        assert!(check(&|c| c.chunk_size = 1001).is_err());
        assert!(check(&|c| c.chunk_size = 1000).is_ok());
        assert!(check(&|c| c.port = Some(1023)).is_err());
        assert!(check(&|c| c.port = Some(65535)).is_err());
        assert!(check(&|c| c.port = Some(1024)).is_ok());
        assert!(check(&|c| c.position = Some(0)).is_err());
        assert!(check(&|c| c.parallel_position = Some(0)).is_err());
        assert!(check(&|c| c.parallel_position = Some(-3)).is_err());
        assert!(check(&|c| c.parallel_position = Some(-2)).is_ok());
        assert!(check(&|c| c.interface = Some("1.2.3".to_string())).is_err());
        assert!(check(&|c| c.station = "s".repeat(49)).is_err());
        assert!(check(&|c| {
            c.producer.events = 1;
            c.producer.event_size = 8;
        })
        .is_err());
    }

    #[test]
    fn test_connection_selection() {
        let config = valid();
        let connection = config.connection();
        assert_eq!(
            connection,
            Connection::Direct {
                host: HOST_LOCAL.to_string(),
                port: DEFAULT_SERVER_PORT
            }
        );
        assert!(connection.is_local());

        let mut remote = valid();
        remote.host = Some("daq01".to_string());
        assert!(!remote.connection().is_local());

        let mut multicast = valid();
        multicast.multicast = true;
        assert_eq!(
            multicast.connection(),
            Connection::Multicast {
                addrs: vec![DEFAULT_MULTICAST_ADDR.to_string()],
                port: DEFAULT_UDP_PORT
            }
        );

        let mut both = valid();
        both.multicast_addrs = (0..12).map(|i| format!("239.1.1.{}", i)).collect();
        both.broadcast = true;
        match both.connection() {
            Connection::BroadAndMulticast { addrs, .. } => assert_eq!(addrs.len(), MAX_MULTICAST_ADDRS),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_station_config_mapping() {
        let mut config = valid();
        assert_eq!(config.station_config(), StationConfig::default());

        config.blocking = false;
        config.position = Some(2);
        config.parallel_position = Some(-2);
        let station = config.station_config();
        assert!(!station.blocking);
        assert_eq!(station.cue, DEFAULT_CUE);
        assert_eq!(station.position, Position::At(2));
        assert_eq!(station.flow, Flow::Parallel(ParallelPosition::Head));
    }
}
