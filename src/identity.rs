//! Application key for a user's workload, and the state the hub persists

use serde::{Deserialize, Serialize};

/// Marathon application id of one user's workload: `/<prefix>/<user>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadIdentity {
    app_id: String,
    user: String,
}

impl WorkloadIdentity {
    pub fn new(prefix: &str, user: impl Into<String>) -> Self {
        let user = user.into();
        let prefix = prefix.trim_matches('/');
        let app_id = if prefix.is_empty() {
            format!("/{}", user)
        } else {
            format!("/{}/{}", prefix, user)
        };
        Self { app_id, user }
    }

    /// Rebuild an identity from a recorded application id.
    ///
    /// The id is kept verbatim; `user` is the hub's user, never parsed
    /// out of the id.
    pub fn recorded(app_id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            user: user.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.app_id
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl std::fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.app_id)
    }
}

/// State fragment the hub stores between restarts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnerState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

impl SpawnerState {
    pub fn for_identity(identity: &WorkloadIdentity) -> Self {
        Self {
            container_name: Some(identity.as_str().to_string()),
        }
    }
}
