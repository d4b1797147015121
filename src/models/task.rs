//! Runtime view of an application as reported by `GET /v2/apps/{id}`

use serde::{Deserialize, Serialize};

/// Application status with embedded tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub id: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub tasks_healthy: u32,
    #[serde(default)]
    pub tasks_running: u32,
    #[serde(default)]
    pub tasks_staged: u32,
    /// Deployments currently touching this app
    #[serde(default)]
    pub deployments: Vec<DeploymentId>,
}

impl AppInfo {
    pub fn is_healthy(&self) -> bool {
        self.tasks_healthy == 1
    }
}

/// A running instance of an application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub app_id: String,
    /// Agent hostname the task landed on
    pub host: String,
    /// Host ports bound for this task, in port-mapping order
    #[serde(default)]
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentId {
    pub id: String,
}

/// Envelope of `GET /v2/apps/{id}`
#[derive(Debug, Deserialize)]
pub(crate) struct AppEnvelope {
    pub app: AppInfo,
}
