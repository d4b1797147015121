//! Application definition model - what gets POSTed to `/v2/apps`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Docker networking mode for the workload container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkMode {
    #[default]
    Bridge,
    Host,
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkMode::Bridge => write!(f, "BRIDGE"),
            NetworkMode::Host => write!(f, "HOST"),
        }
    }
}

/// A full Marathon application definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDefinition {
    /// Application id, e.g. `/jupyter/alice`
    pub id: String,
    pub instances: u32,
    /// CPU shares in fractional cores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// Memory in MiB
    pub mem: f64,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub container: Container,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub health_checks: Vec<HealthCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "type")]
    pub kind: String,
    pub docker: DockerContainer,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerContainer {
    pub image: String,
    #[serde(default)]
    pub network: NetworkMode,
    #[serde(default)]
    pub port_mappings: Vec<PortMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    /// 0 lets Marathon pick the host port
    pub host_port: u16,
    pub protocol: String,
}

impl PortMapping {
    pub fn dynamic(container_port: u16) -> Self {
        Self {
            container_port,
            host_port: 0,
            protocol: "tcp".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VolumeMode {
    #[default]
    RW,
    RO,
}

/// A volume mount, in Marathon REST format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub container_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    #[serde(default)]
    pub mode: VolumeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalVolume>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalVolume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Placement constraint, `[field, operator]` or `[field, operator, value]`.
/// Contents are not interpreted, only the arity is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Constraint {
    pub field: String,
    pub operator: String,
    pub value: Option<String>,
}

impl Constraint {
    pub fn new(field: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl TryFrom<Vec<String>> for Constraint {
    type Error = String;

    fn try_from(parts: Vec<String>) -> Result<Self, Self::Error> {
        let len = parts.len();
        let mut parts = parts.into_iter();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(operator), value, None) => Ok(Self { field, operator, value }),
            _ => Err(format!("constraint must have 2 or 3 elements, got {}", len)),
        }
    }
}

impl From<Constraint> for Vec<String> {
    fn from(c: Constraint) -> Self {
        let mut parts = vec![c.field, c.operator];
        parts.extend(c.value);
        parts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthCheckProtocol {
    #[default]
    Tcp,
    Http,
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheck {
    pub protocol: HealthCheckProtocol,
    pub port_index: u32,
    pub grace_period_seconds: u64,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    /// 0: the first failed probe after the grace period kills the task
    pub max_consecutive_failures: u32,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            protocol: HealthCheckProtocol::Tcp,
            port_index: 0,
            grace_period_seconds: 300,
            interval_seconds: 60,
            timeout_seconds: 20,
            max_consecutive_failures: 0,
        }
    }
}
