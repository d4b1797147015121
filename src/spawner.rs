//! Hub-facing spawner API

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::client::{MarathonApi, MarathonClient};
use crate::config::SpawnerConfig;
use crate::definition::build_app_definition;
use crate::endpoint::HostResolver;
use crate::env::{build_environment, HubContext};
use crate::identity::{SpawnerState, WorkloadIdentity};
use crate::lifecycle::{LifecycleController, LifecycleState, RunState};
use crate::models::AppDefinition;
use crate::Result;

/// What the hub calls to run one user's server
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Launch the server and return where it listens
    async fn start(&self) -> Result<(IpAddr, u16)>;

    /// Tear the server down, waiting for Marathon unless `now`
    async fn stop(&self, now: bool) -> Result<()>;

    async fn poll(&self) -> Result<RunState>;

    /// State to persist across hub restarts
    fn get_state(&self) -> SpawnerState;

    /// Restore what [`Spawner::get_state`] returned
    fn load_state(&self, state: SpawnerState);
}

/// Spawner that runs each user's server as a Marathon app
pub struct MarathonSpawner {
    config: Arc<SpawnerConfig>,
    hub: HubContext,
    identity: RwLock<WorkloadIdentity>,
    controller: LifecycleController,
}

impl MarathonSpawner {
    pub fn new(config: SpawnerConfig, hub: HubContext, api: Arc<dyn MarathonApi>) -> Result<Self> {
        config.validate()?;
        let identity = WorkloadIdentity::new(&config.app_prefix, hub.user.clone());
        let controller = LifecycleController::new(api)
            .with_poll_policy(config.poll)
            .with_teardown_policy(config.teardown);

        Ok(Self {
            config: Arc::new(config),
            hub,
            identity: RwLock::new(identity),
            controller,
        })
    }

    /// Talk to the Marathon at `config.marathon_host` over HTTP
    pub fn from_config(config: SpawnerConfig, hub: HubContext) -> Result<Self> {
        let client = MarathonClient::new(&config.marathon_host, config.request_timeout())?;
        Self::new(config, hub, Arc::new(client))
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.controller = self.controller.with_resolver(resolver);
        self
    }

    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.controller = self.controller.with_cancellation(cancel);
        self
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    pub fn identity(&self) -> WorkloadIdentity {
        self.identity.read().clone()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.controller.state()
    }

    /// The definition [`Spawner::start`] would submit
    pub fn app_definition(&self) -> Result<AppDefinition> {
        let env = build_environment(&self.config, &self.hub)?;
        Ok(build_app_definition(&self.config, &self.identity(), env))
    }
}

#[async_trait]
impl Spawner for MarathonSpawner {
    async fn start(&self) -> Result<(IpAddr, u16)> {
        let app = self.app_definition()?;
        let endpoint = self.controller.start(&self.identity(), &app).await?;
        Ok(endpoint.into())
    }

    async fn stop(&self, now: bool) -> Result<()> {
        self.controller.stop(&self.identity(), now).await
    }

    async fn poll(&self) -> Result<RunState> {
        self.controller.poll(&self.identity()).await
    }

    fn get_state(&self) -> SpawnerState {
        match self.controller.state() {
            LifecycleState::Idle | LifecycleState::Removed => SpawnerState::default(),
            _ => SpawnerState::for_identity(&self.identity()),
        }
    }

    fn load_state(&self, state: SpawnerState) {
        let Some(app_id) = state.container_name.filter(|s| !s.is_empty()) else {
            return;
        };
        tracing::info!(app = %app_id, "Adopting recorded application");
        *self.identity.write() = WorkloadIdentity::recorded(app_id, self.hub.user.clone());
        self.controller.adopt();
    }
}
