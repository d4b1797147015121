//! Deployment model - Marathon's record of an in-flight change

use serde::{Deserialize, Serialize};

/// Action name Marathon uses while tearing an app down
pub const STOP_APPLICATION: &str = "StopApplication";

/// Entry of `GET /v2/deployments`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub affected_apps: Vec<String>,
    #[serde(default)]
    pub current_actions: Vec<DeploymentAction>,
}

impl Deployment {
    pub fn affects(&self, app_id: &str) -> bool {
        self.affected_apps.iter().any(|a| a == app_id)
    }

    /// True when one of the current steps is stopping `app_id`
    pub fn is_stopping(&self, app_id: &str) -> bool {
        self.current_actions
            .iter()
            .any(|a| a.is_stop() && (a.app.is_empty() || a.app == app_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAction {
    pub action: String,
    #[serde(default)]
    pub app: String,
}

impl DeploymentAction {
    pub fn is_stop(&self) -> bool {
        self.action == STOP_APPLICATION
    }
}

/// Handle returned by mutating calls such as `DELETE /v2/apps/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRef {
    pub deployment_id: String,
    #[serde(default)]
    pub version: String,
}
