//! Spawner configuration with builder pattern

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{Constraint, HealthCheck, NetworkMode, Volume};
use crate::volume::VolumeNameFormatter;
use crate::{Error, Result};

pub const DEFAULT_IMAGE: &str = "jupyterhub/singleuser";
pub const DEFAULT_PREFIX: &str = "jupyter";
pub const DEFAULT_PORT: u16 = 8888;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    pub app_image: String,
    /// App ids are `/<app_prefix>/<username>`
    pub app_prefix: String,
    /// Base URL of the Marathon API, e.g. `http://leader.mesos:8080`
    pub marathon_host: String,
    /// Container ports to expose; the first one is health-checked
    pub ports: Vec<u16>,
    pub mem_limit: Option<ByteSize>,
    pub cpu_limit: Option<f64>,
    pub network_mode: NetworkMode,
    pub volumes: Vec<Volume>,
    pub marathon_constraints: Vec<Constraint>,
    /// Hub address the workload should call back to, when the hub's own
    /// bind address is not reachable from the cluster
    pub hub_ip_connect: Option<String>,
    pub hub_port_connect: Option<u16>,
    pub health_check: HealthCheck,
    pub poll: PollPolicy,
    pub teardown: TeardownPolicy,
    pub request_timeout_secs: u64,
    #[serde(skip)]
    pub format_volume_name: VolumeNameFormatter,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            app_image: DEFAULT_IMAGE.to_string(),
            app_prefix: DEFAULT_PREFIX.to_string(),
            marathon_host: String::new(),
            ports: vec![DEFAULT_PORT],
            mem_limit: None,
            cpu_limit: None,
            network_mode: NetworkMode::Bridge,
            volumes: Vec::new(),
            marathon_constraints: Vec::new(),
            hub_ip_connect: None,
            hub_port_connect: None,
            health_check: HealthCheck::default(),
            poll: PollPolicy::default(),
            teardown: TeardownPolicy::Strict,
            request_timeout_secs: 30,
            format_volume_name: VolumeNameFormatter::default(),
        }
    }
}

/// How the lifecycle loops wait on Marathon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub interval_ms: u64,
    /// Give up after this many status polls; unbounded when unset
    pub max_attempts: Option<u32>,
    /// Fail after this many status errors in a row; retry forever when unset
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_attempts: None,
            max_consecutive_failures: None,
        }
    }
}

impl PollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn bounded(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn failure_limit(mut self, max_consecutive_failures: u32) -> Self {
        self.max_consecutive_failures = Some(max_consecutive_failures);
        self
    }
}

/// What `stop` does when the delete request itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeardownPolicy {
    /// Report the failure to the hub
    #[default]
    Strict,
    /// Log it and report the server as stopped
    Lenient,
}

impl SpawnerConfig {
    pub fn builder() -> SpawnerConfigBuilder {
        SpawnerConfigBuilder::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_image.is_empty() {
            return Err(Error::Config("app_image cannot be empty".into()));
        }
        if self.app_prefix.trim_matches('/').is_empty() {
            return Err(Error::Config("app_prefix cannot be empty".into()));
        }
        if self.marathon_host.is_empty() {
            return Err(Error::Config("marathon_host must be set".into()));
        }
        url::Url::parse(&self.marathon_host)?;
        if self.ports.is_empty() {
            return Err(Error::Config("at least one port must be exposed".into()));
        }
        if self.health_check.port_index as usize >= self.ports.len() {
            return Err(Error::Config(format!(
                "health check port index {} is out of range for {} ports",
                self.health_check.port_index,
                self.ports.len()
            )));
        }
        if let Some(cpus) = self.cpu_limit {
            if cpus.is_nan() || cpus <= 0.0 {
                return Err(Error::Config("cpu_limit must be positive".into()));
            }
        }
        if let Some(mem) = self.mem_limit {
            if mem.as_bytes() < MIB {
                return Err(Error::Config("mem_limit must be at least 1M".into()));
            }
        }
        if self.poll.interval_ms == 0 {
            return Err(Error::Config("poll.interval_ms must be positive".into()));
        }
        if self.poll.max_attempts == Some(0) {
            return Err(Error::Config("poll.max_attempts must be positive when set".into()));
        }
        if self.poll.max_consecutive_failures == Some(0) {
            return Err(Error::Config("poll.max_consecutive_failures must be positive when set".into()));
        }
        Ok(())
    }

    /// Memory request in MiB, 1024 when no limit is configured
    pub fn mem_request_mib(&self) -> f64 {
        match self.mem_limit {
            Some(limit) => limit.as_bytes() as f64 / MIB as f64,
            None => DEFAULT_MEM_MIB,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

const MIB: u64 = 1024 * 1024;
const DEFAULT_MEM_MIB: f64 = 1024.0;

/// A byte count that deserializes from either an integer or a size string
/// such as `"512M"` or `"1.5G"` (powers of 1024).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "ByteSizeRepr", into = "u64")]
pub struct ByteSize(u64);

impl ByteSize {
    pub fn b(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn mib(mib: u64) -> Self {
        Self(mib * MIB)
    }

    pub fn as_bytes(&self) -> u64 {
        self.0
    }
}

impl From<ByteSize> for u64 {
    fn from(size: ByteSize) -> Self {
        size.0
    }
}

impl std::str::FromStr for ByteSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (number, unit) = match s.char_indices().find(|(_, c)| c.is_ascii_alphabetic()) {
            Some((idx, _)) => s.split_at(idx),
            None => (s, ""),
        };
        let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" => 1024,
            "M" | "MB" => MIB,
            "G" | "GB" => 1024 * MIB,
            "T" | "TB" => 1024 * 1024 * MIB,
            other => return Err(Error::Config(format!("unknown size suffix '{}' in '{}'", other, s))),
        };
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid byte size '{}'", s)))?;
        if !value.is_finite() || value < 0.0 {
            return Err(Error::Config(format!("invalid byte size '{}'", s)));
        }
        Ok(Self((value * multiplier as f64) as u64))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ByteSizeRepr {
    Bytes(u64),
    Text(String),
}

impl TryFrom<ByteSizeRepr> for ByteSize {
    type Error = Error;

    fn try_from(repr: ByteSizeRepr) -> Result<Self> {
        match repr {
            ByteSizeRepr::Bytes(b) => Ok(Self(b)),
            ByteSizeRepr::Text(s) => s.parse(),
        }
    }
}

#[derive(Default)]
pub struct SpawnerConfigBuilder {
    config: SpawnerConfig,
}

impl SpawnerConfigBuilder {
    pub fn app_image(mut self, image: impl Into<String>) -> Self {
        self.config.app_image = image.into();
        self
    }

    pub fn app_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.app_prefix = prefix.into();
        self
    }

    pub fn marathon_host(mut self, host: impl Into<String>) -> Self {
        self.config.marathon_host = host.into();
        self
    }

    pub fn ports(mut self, ports: Vec<u16>) -> Self {
        self.config.ports = ports;
        self
    }

    pub fn mem_limit(mut self, limit: ByteSize) -> Self {
        self.config.mem_limit = Some(limit);
        self
    }

    pub fn cpu_limit(mut self, cpus: f64) -> Self {
        self.config.cpu_limit = Some(cpus);
        self
    }

    pub fn network_mode(mut self, mode: NetworkMode) -> Self {
        self.config.network_mode = mode;
        self
    }

    pub fn volume(mut self, volume: Volume) -> Self {
        self.config.volumes.push(volume);
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.config.marathon_constraints.push(constraint);
        self
    }

    pub fn hub_connect(mut self, ip: Option<String>, port: Option<u16>) -> Self {
        self.config.hub_ip_connect = ip;
        self.config.hub_port_connect = port;
        self
    }

    pub fn health_check(mut self, health_check: HealthCheck) -> Self {
        self.config.health_check = health_check;
        self
    }

    pub fn poll(mut self, policy: PollPolicy) -> Self {
        self.config.poll = policy;
        self
    }

    pub fn teardown(mut self, policy: TeardownPolicy) -> Self {
        self.config.teardown = policy;
        self
    }

    pub fn format_volume_name(mut self, formatter: VolumeNameFormatter) -> Self {
        self.config.format_volume_name = formatter;
        self
    }

    pub fn build(self) -> SpawnerConfig {
        self.config
    }

    pub fn build_validated(self) -> Result<SpawnerConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
