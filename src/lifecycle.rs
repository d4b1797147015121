//! Lifecycle state machine for one user's Marathon app
//!
//! Marathon accepts creates and deletes immediately and only reveals the
//! outcome through later status reads. The controller turns that into the
//! synchronous contract the hub expects:
//!
//! - [`LifecycleController::start`] returns once the single task is healthy
//!   and its address is resolved.
//! - [`LifecycleController::poll`] reports whether the app is still running.
//! - [`LifecycleController::stop`] returns once the delete deployment is gone
//!   (or right away when asked to).
//!
//! Every wait is a tokio sleep raced against the cancellation receiver, so
//! many lifecycles can share one runtime and a caller can abort a wait
//! without waiting for the next Marathon round-trip.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::client::MarathonApi;
use crate::config::{PollPolicy, TeardownPolicy};
use crate::endpoint::{resolve_endpoint, DnsResolver, Endpoint, HostResolver};
use crate::identity::WorkloadIdentity;
use crate::models::AppDefinition;
use crate::{Error, Result};

/// Where a workload is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Deploying,
    Healthy,
    Stopping,
    Removed,
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "Idle"),
            LifecycleState::Deploying => write!(f, "Deploying"),
            LifecycleState::Healthy => write!(f, "Healthy"),
            LifecycleState::Stopping => write!(f, "Stopping"),
            LifecycleState::Removed => write!(f, "Removed"),
            LifecycleState::Failed => write!(f, "Failed"),
        }
    }
}

/// Answer to a liveness poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    StillRunning,
    Exited(i32),
}

impl RunState {
    /// `None` while running, the exit code otherwise
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunState::StillRunning => None,
            RunState::Exited(code) => Some(*code),
        }
    }
}

/// Drives one workload through Marathon's asynchronous deployments
pub struct LifecycleController {
    api: Arc<dyn MarathonApi>,
    resolver: Arc<dyn HostResolver>,
    policy: PollPolicy,
    teardown: TeardownPolicy,
    cancel: watch::Receiver<bool>,
    state: RwLock<LifecycleState>,
    last_deployment: RwLock<Option<String>>,
}

impl LifecycleController {
    pub fn new(api: Arc<dyn MarathonApi>) -> Self {
        // sender dropped right away: never cancelled unless replaced
        let (_, cancel) = watch::channel(false);
        Self {
            api,
            resolver: Arc::new(DnsResolver),
            policy: PollPolicy::default(),
            teardown: TeardownPolicy::default(),
            cancel,
            state: RwLock::new(LifecycleState::Idle),
            last_deployment: RwLock::new(None),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_teardown_policy(mut self, policy: TeardownPolicy) -> Self {
        self.teardown = policy;
        self
    }

    /// Abort waits as soon as the channel holds `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Deployment id of the last create or delete
    pub fn last_deployment(&self) -> Option<String> {
        self.last_deployment.read().clone()
    }

    /// Treat an already-running app as ours, e.g. after the hub restarted
    pub fn adopt(&self) {
        self.set_state(LifecycleState::Healthy);
    }

    /// Submit `app` and wait until its single task is healthy
    pub async fn start(&self, identity: &WorkloadIdentity, app: &AppDefinition) -> Result<Endpoint> {
        let current = self.state();
        if !matches!(
            current,
            LifecycleState::Idle | LifecycleState::Removed | LifecycleState::Failed
        ) {
            return Err(Error::InvalidState {
                current: current.to_string(),
                expected: "Idle, Removed or Failed".into(),
            });
        }

        let app_id = identity.as_str();
        tracing::info!(app = %app_id, image = %app.container.docker.image, "Submitting application");

        let created = match self.cancellable(app_id, self.api.create_app(app)).await {
            Ok(Ok(created)) => created,
            Ok(Err(e)) | Err(e) => {
                tracing::error!(app = %app_id, error = %e, "Failed to create application");
                self.set_state(LifecycleState::Failed);
                return Err(e.into_rejection(app_id));
            }
        };

        let Some(deployment) = created.deployments.first() else {
            tracing::error!(app = %app_id, "Marathon accepted the app but scheduled no deployment");
            self.set_state(LifecycleState::Failed);
            return Err(Error::SubmissionRejected {
                app_id: app_id.to_string(),
                reason: "no deployment was scheduled".into(),
            });
        };

        tracing::debug!(app = %app_id, deployment = %deployment.id, "Application submitted");
        *self.last_deployment.write() = Some(deployment.id.clone());
        self.set_state(LifecycleState::Deploying);

        let guard = AbandonGuard::new(&self.state, app_id);
        let outcome = self.wait_until_healthy(app_id).await;
        guard.settle();

        match outcome {
            Ok(endpoint) => {
                tracing::info!(app = %app_id, endpoint = %endpoint, "Application is healthy");
                self.set_state(LifecycleState::Healthy);
                Ok(endpoint)
            }
            Err(e) => {
                tracing::error!(app = %app_id, error = %e, "Application did not become healthy");
                self.set_state(LifecycleState::Failed);
                Err(e)
            }
        }
    }

    async fn wait_until_healthy(&self, app_id: &str) -> Result<Endpoint> {
        let mut failures = FailureBudget::new(app_id, self.policy.max_consecutive_failures);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.cancellable(app_id, self.api.get_app(app_id, true)).await? {
                Ok(info) => {
                    failures.reset();
                    if info.is_healthy() {
                        match resolve_endpoint(&info, self.resolver.as_ref()).await {
                            Ok(endpoint) => return Ok(endpoint),
                            Err(Error::Topology { count, .. }) => {
                                tracing::debug!(app = %app_id, tasks = count, "Healthy but task binding not settled yet");
                            }
                            Err(e) => return Err(e),
                        }
                    } else {
                        tracing::debug!(app = %app_id, healthy = info.tasks_healthy, "Waiting for a healthy task");
                    }
                }
                Err(Error::NotFound(_)) => {
                    failures.reset();
                    tracing::info!(app = %app_id, "The application has not been started yet");
                }
                Err(e) => failures.record(e)?,
            }

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    return Err(Error::Timeout {
                        app_id: app_id.to_string(),
                        attempts,
                    });
                }
            }
            self.pause(app_id).await?;
        }
    }

    /// Check whether the app is still alive.
    ///
    /// Deployments are consulted before tasks: while a delete is rolling
    /// out, Marathon can still list the old task as healthy.
    pub async fn poll(&self, identity: &WorkloadIdentity) -> Result<RunState> {
        match self.state() {
            LifecycleState::Healthy => {}
            LifecycleState::Idle | LifecycleState::Removed | LifecycleState::Failed => {
                return Ok(RunState::Exited(0));
            }
            current => {
                return Err(Error::InvalidState {
                    current: current.to_string(),
                    expected: "Healthy".into(),
                })
            }
        }

        let app_id = identity.as_str();
        let deployments = self.api.list_deployments().await?;
        if let Some(deployment) = deployments.iter().find(|d| d.affects(app_id)) {
            if deployment.is_stopping(app_id) {
                tracing::error!(app = %app_id, deployment = %deployment.id, "Application is shutting down");
                self.set_state(LifecycleState::Removed);
                return Ok(RunState::Exited(1));
            }
            tracing::debug!(app = %app_id, deployment = %deployment.id, "Deployment in progress");
            return Ok(RunState::StillRunning);
        }

        match self.api.get_app(app_id, true).await {
            Ok(info) if info.is_healthy() && info.tasks.len() == 1 => Ok(RunState::StillRunning),
            Ok(info) => {
                tracing::warn!(
                    app = %app_id,
                    healthy = info.tasks_healthy,
                    tasks = info.tasks.len(),
                    "Application is no longer healthy"
                );
                self.set_state(LifecycleState::Failed);
                Ok(RunState::Exited(0))
            }
            Err(Error::NotFound(_)) => {
                tracing::warn!(app = %app_id, "Application disappeared from Marathon");
                self.set_state(LifecycleState::Failed);
                Ok(RunState::Exited(0))
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the app; unless `now`, wait until Marathon has finished
    /// removing it.
    pub async fn stop(&self, identity: &WorkloadIdentity, now: bool) -> Result<()> {
        let app_id = identity.as_str();
        self.set_state(LifecycleState::Stopping);
        tracing::info!(app = %app_id, now, "Deleting application");

        let guard = AbandonGuard::new(&self.state, app_id);
        let outcome = self.delete_and_confirm(app_id, now).await;
        guard.settle();
        outcome
    }

    async fn delete_and_confirm(&self, app_id: &str, now: bool) -> Result<()> {
        let deployment = match self.cancellable(app_id, self.api.delete_app(app_id)).await {
            Ok(Ok(reference)) => reference.deployment_id,
            Ok(Err(Error::NotFound(_))) => {
                tracing::info!(app = %app_id, "Application already absent");
                self.set_state(LifecycleState::Removed);
                return Ok(());
            }
            Err(e) => {
                self.set_state(LifecycleState::Failed);
                return Err(e);
            }
            Ok(Err(e)) => return self.teardown_failed(app_id, e),
        };

        *self.last_deployment.write() = Some(deployment.clone());
        if !now {
            if let Err(e) = self.wait_until_removed(app_id, &deployment).await {
                tracing::error!(app = %app_id, deployment = %deployment, error = %e, "Removal was not confirmed");
                self.set_state(LifecycleState::Failed);
                return Err(e);
            }
        }

        tracing::info!(app = %app_id, "Application removed");
        self.set_state(LifecycleState::Removed);
        Ok(())
    }

    fn teardown_failed(&self, app_id: &str, e: Error) -> Result<()> {
        match self.teardown {
            TeardownPolicy::Strict => {
                tracing::error!(app = %app_id, error = %e, "Could not delete application");
                self.set_state(LifecycleState::Failed);
                Err(e.into_rejection(app_id))
            }
            TeardownPolicy::Lenient => {
                tracing::warn!(app = %app_id, error = %e, "Could not delete application, reporting it stopped");
                self.set_state(LifecycleState::Removed);
                Ok(())
            }
        }
    }

    async fn wait_until_removed(&self, app_id: &str, deployment: &str) -> Result<()> {
        let mut failures = FailureBudget::new(app_id, self.policy.max_consecutive_failures);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.cancellable(app_id, self.api.list_deployments()).await? {
                Ok(list) => {
                    failures.reset();
                    if !list.iter().any(|d| d.id == deployment) {
                        return Ok(());
                    }
                    tracing::debug!(app = %app_id, deployment = %deployment, "Waiting for delete deployment");
                }
                Err(e) => failures.record(e)?,
            }

            if let Some(max) = self.policy.max_attempts {
                if attempts >= max {
                    return Err(Error::Timeout {
                        app_id: app_id.to_string(),
                        attempts,
                    });
                }
            }
            self.pause(app_id).await?;
        }
    }

    async fn pause(&self, app_id: &str) -> Result<()> {
        self.cancellable(app_id, tokio::time::sleep(self.policy.interval()))
            .await
    }

    /// Run `fut` unless cancellation fires first
    async fn cancellable<F: Future>(&self, app_id: &str, fut: F) -> Result<F::Output> {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = cancelled(cancel) => {
                tracing::info!(app = %app_id, "Cancelled");
                Err(Error::Cancelled(app_id.to_string()))
            }
            out = fut => Ok(out),
        }
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.write() = state;
    }
}

async fn cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // no sender left, nobody can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

/// Marks the lifecycle `Failed` if the future holding it is dropped
/// before the wait settles
struct AbandonGuard<'a> {
    state: &'a RwLock<LifecycleState>,
    app_id: &'a str,
    settled: bool,
}

impl<'a> AbandonGuard<'a> {
    fn new(state: &'a RwLock<LifecycleState>, app_id: &'a str) -> Self {
        Self {
            state,
            app_id,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(app = %self.app_id, "Wait abandoned, marking application failed");
            *self.state.write() = LifecycleState::Failed;
        }
    }
}

/// Consecutive status-call failures tolerated inside a wait loop
struct FailureBudget<'a> {
    app_id: &'a str,
    limit: Option<u32>,
    consecutive: u32,
}

impl<'a> FailureBudget<'a> {
    fn new(app_id: &'a str, limit: Option<u32>) -> Self {
        Self {
            app_id,
            limit,
            consecutive: 0,
        }
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }

    fn record(&mut self, e: Error) -> Result<()> {
        self.consecutive += 1;
        tracing::warn!(app = %self.app_id, error = %e, failures = self.consecutive, "Status poll failed");
        match self.limit {
            Some(limit) if self.consecutive >= limit => Err(Error::TransientPoll {
                app_id: self.app_id.to_string(),
                attempts: self.consecutive,
                last: e.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMarathonApi;
    use crate::models::{
        AppInfo, Container, Deployment, DeploymentAction, DeploymentId, DeploymentRef, DockerContainer, NetworkMode,
        Task,
    };
    use mockall::Sequence;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn identity() -> WorkloadIdentity {
        WorkloadIdentity::new("jupyter", "moo")
    }

    fn definition() -> AppDefinition {
        AppDefinition {
            id: "/jupyter/moo".into(),
            instances: 1,
            cpus: None,
            mem: 1024.0,
            env: BTreeMap::new(),
            container: Container {
                kind: "DOCKER".into(),
                docker: DockerContainer {
                    image: "jupyterhub/singleuser".into(),
                    network: NetworkMode::Bridge,
                    port_mappings: vec![],
                },
                volumes: vec![],
            },
            constraints: vec![],
            health_checks: vec![],
        }
    }

    fn accepted() -> AppInfo {
        AppInfo {
            id: "/jupyter/moo".into(),
            deployments: vec![DeploymentId { id: "d-create".into() }],
            ..AppInfo::default()
        }
    }

    fn healthy(host: &str, port: u16) -> AppInfo {
        AppInfo {
            id: "/jupyter/moo".into(),
            tasks_healthy: 1,
            tasks_running: 1,
            tasks: vec![Task {
                host: host.into(),
                ports: vec![port],
                ..Task::default()
            }],
            ..AppInfo::default()
        }
    }

    fn unhealthy() -> AppInfo {
        AppInfo {
            id: "/jupyter/moo".into(),
            tasks_running: 1,
            ..AppInfo::default()
        }
    }

    fn deployment(id: &str, action: &str) -> Deployment {
        Deployment {
            id: id.into(),
            affected_apps: vec!["/jupyter/moo".into()],
            current_actions: vec![DeploymentAction {
                action: action.into(),
                app: "/jupyter/moo".into(),
            }],
        }
    }

    fn not_found() -> Error {
        Error::NotFound("/jupyter/moo".into())
    }

    fn controller(api: MockMarathonApi) -> LifecycleController {
        LifecycleController::new(Arc::new(api))
    }

    fn healthy_controller(api: MockMarathonApi) -> LifecycleController {
        let c = controller(api);
        c.adopt();
        c
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_polls_until_healthy() {
        let mut api = MockMarathonApi::new();
        let mut seq = Sequence::new();
        api.expect_create_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(accepted()));
        api.expect_get_app()
            .withf(|id, embed| id == "/jupyter/moo" && *embed)
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(not_found()));
        api.expect_get_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(unhealthy()));
        api.expect_get_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(healthy("10.0.0.5", 31000)));

        let c = controller(api);
        let started = tokio::time::Instant::now();
        let ep = c.start(&identity(), &definition()).await.unwrap();

        assert_eq!(ep.to_string(), "10.0.0.5:31000");
        assert_eq!(c.state(), LifecycleState::Healthy);
        assert_eq!(c.last_deployment().as_deref(), Some("d-create"));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_start_rejected_does_not_poll() {
        let mut api = MockMarathonApi::new();
        api.expect_create_app().times(1).returning(|app| {
            Err(Error::SubmissionRejected {
                app_id: app.id.clone(),
                reason: "422 Unprocessable Entity".into(),
            })
        });
        api.expect_get_app().times(0);

        let c = controller(api);
        let err = c.start(&identity(), &definition()).await.unwrap_err();
        assert!(matches!(err, Error::SubmissionRejected { .. }));
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_start_without_deployment_is_rejected() {
        let mut api = MockMarathonApi::new();
        api.expect_create_app().times(1).returning(|_| {
            Ok(AppInfo {
                id: "/jupyter/moo".into(),
                ..AppInfo::default()
            })
        });
        api.expect_get_app().times(0);

        let c = controller(api);
        let err = c.start(&identity(), &definition()).await.unwrap_err();
        assert!(matches!(err, Error::SubmissionRejected { .. }));
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_start_connection_error_is_rejection() {
        let mut api = MockMarathonApi::new();
        api.expect_create_app().times(1).returning(|_| {
            Err(Error::Api {
                status: 503,
                body: "no leader".into(),
            })
        });

        let c = controller(api);
        let err = c.start(&identity(), &definition()).await.unwrap_err();
        assert!(matches!(err, Error::SubmissionRejected { ref reason, .. } if reason.contains("no leader")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_bounded_attempts() {
        let mut api = MockMarathonApi::new();
        api.expect_create_app().returning(|_| Ok(accepted()));
        api.expect_get_app().times(5).returning(|_, _| Err(not_found()));

        let c = controller(api).with_poll_policy(PollPolicy::default().bounded(5));
        let err = c.start(&identity(), &definition()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { attempts: 5, .. }));
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_keeps_polling_through_transient_errors() {
        let mut api = MockMarathonApi::new();
        let mut seq = Sequence::new();
        api.expect_create_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(accepted()));
        api.expect_get_app()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(Error::Api { status: 502, body: "bad gateway".into() }));
        api.expect_get_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(healthy("10.0.0.5", 31000)));

        let c = controller(api);
        assert!(c.start(&identity(), &definition()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_escalates_after_failure_limit() {
        let mut api = MockMarathonApi::new();
        api.expect_create_app().returning(|_| Ok(accepted()));
        api.expect_get_app()
            .times(3)
            .returning(|_, _| Err(Error::Api { status: 500, body: "boom".into() }));

        let c = controller(api).with_poll_policy(PollPolicy::default().failure_limit(3));
        let err = c.start(&identity(), &definition()).await.unwrap_err();
        assert!(matches!(err, Error::TransientPoll { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_ignores_ambiguous_topology() {
        let mut api = MockMarathonApi::new();
        let mut seq = Sequence::new();
        api.expect_create_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(accepted()));
        api.expect_get_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                let mut info = healthy("10.0.0.5", 31000);
                info.tasks.push(info.tasks[0].clone());
                Ok(info)
            });
        api.expect_get_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(healthy("10.0.0.6", 31002)));

        let c = controller(api);
        let ep = c.start(&identity(), &definition()).await.unwrap();
        assert_eq!(ep.port, 31002);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_cancelled_while_waiting() {
        let mut api = MockMarathonApi::new();
        api.expect_create_app().returning(|_| Ok(accepted()));
        api.expect_get_app().returning(|_, _| Err(not_found()));

        let (tx, rx) = watch::channel(false);
        let c = controller(api).with_cancellation(rx);

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            tx.send(true).unwrap();
        };
        let (id, def) = (identity(), definition());
        let (result, ()) = tokio::join!(c.start(&id, &def), canceller);

        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_dropped_by_timeout_can_retry() {
        let mut api = MockMarathonApi::new();
        api.expect_create_app().times(2).returning(|_| Ok(accepted()));
        api.expect_get_app().returning(|_, _| Err(not_found()));
        api.expect_list_deployments().times(0);

        let c = controller(api);
        let first = tokio::time::timeout(Duration::from_millis(5500), c.start(&identity(), &definition())).await;
        assert!(first.is_err());
        assert_eq!(c.state(), LifecycleState::Failed);
        assert_eq!(c.poll(&identity()).await.unwrap(), RunState::Exited(0));

        // a second attempt gets back into the wait instead of failing fast
        let retry = tokio::time::timeout(Duration::from_millis(2500), c.start(&identity(), &definition())).await;
        assert!(retry.is_err());
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_start_requires_idle() {
        let c = healthy_controller(MockMarathonApi::new());
        let err = c.start(&identity(), &definition()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_poll_stop_action_reports_exit() {
        let mut api = MockMarathonApi::new();
        api.expect_list_deployments()
            .returning(|| Ok(vec![deployment("d-del", "StopApplication")]));
        api.expect_get_app().times(0);

        let c = healthy_controller(api);
        assert_eq!(c.poll(&identity()).await.unwrap(), RunState::Exited(1));
        assert_eq!(c.state(), LifecycleState::Removed);
    }

    #[tokio::test]
    async fn test_poll_other_deployment_is_running() {
        let mut api = MockMarathonApi::new();
        api.expect_list_deployments()
            .returning(|| Ok(vec![deployment("d-restart", "RestartApplication")]));
        api.expect_get_app().times(0);

        let c = healthy_controller(api);
        assert_eq!(c.poll(&identity()).await.unwrap(), RunState::StillRunning);
    }

    #[tokio::test]
    async fn test_poll_healthy_task_is_running() {
        let mut api = MockMarathonApi::new();
        api.expect_list_deployments().returning(|| Ok(vec![]));
        api.expect_get_app().returning(|_, _| Ok(healthy("10.0.0.5", 31000)));

        let c = healthy_controller(api);
        let state = c.poll(&identity()).await.unwrap();
        assert_eq!(state, RunState::StillRunning);
        assert_eq!(state.exit_code(), None);
        assert_eq!(c.state(), LifecycleState::Healthy);
    }

    #[tokio::test]
    async fn test_poll_unhealthy_task_exited() {
        let mut api = MockMarathonApi::new();
        api.expect_list_deployments().returning(|| Ok(vec![]));
        api.expect_get_app().returning(|_, _| Ok(unhealthy()));

        let c = healthy_controller(api);
        let state = c.poll(&identity()).await.unwrap();
        assert_eq!(state.exit_code(), Some(0));
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_poll_two_bound_tasks_exited() {
        let mut api = MockMarathonApi::new();
        api.expect_list_deployments().returning(|| Ok(vec![]));
        api.expect_get_app().returning(|_, _| {
            let mut info = healthy("10.0.0.5", 31000);
            info.tasks.push(info.tasks[0].clone());
            Ok(info)
        });

        let c = healthy_controller(api);
        assert_eq!(c.poll(&identity()).await.unwrap(), RunState::Exited(0));
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_poll_two_healthy_tasks_exited() {
        let mut api = MockMarathonApi::new();
        api.expect_list_deployments().returning(|| Ok(vec![]));
        api.expect_get_app().returning(|_, _| {
            let mut info = healthy("10.0.0.5", 31000);
            info.tasks_healthy = 2;
            Ok(info)
        });

        let c = healthy_controller(api);
        assert_eq!(c.poll(&identity()).await.unwrap(), RunState::Exited(0));
    }

    #[tokio::test]
    async fn test_poll_missing_app_exited() {
        let mut api = MockMarathonApi::new();
        api.expect_list_deployments().returning(|| Ok(vec![]));
        api.expect_get_app().returning(|_, _| Err(not_found()));

        let c = healthy_controller(api);
        assert_eq!(c.poll(&identity()).await.unwrap(), RunState::Exited(0));
    }

    #[tokio::test]
    async fn test_poll_untracked_skips_marathon() {
        let mut api = MockMarathonApi::new();
        api.expect_list_deployments().times(0);
        api.expect_get_app().times(0);

        let c = controller(api);
        assert_eq!(c.poll(&identity()).await.unwrap(), RunState::Exited(0));
    }

    #[tokio::test]
    async fn test_stop_absent_app_succeeds() {
        let mut api = MockMarathonApi::new();
        api.expect_delete_app().times(1).returning(|_| Err(not_found()));
        api.expect_list_deployments().times(0);

        let c = healthy_controller(api);
        c.stop(&identity(), false).await.unwrap();
        assert_eq!(c.state(), LifecycleState::Removed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_deployment() {
        let mut api = MockMarathonApi::new();
        let mut seq = Sequence::new();
        api.expect_delete_app()
            .withf(|id| id == "/jupyter/moo")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(DeploymentRef {
                    deployment_id: "D1".into(),
                    version: String::new(),
                })
            });
        api.expect_list_deployments()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![deployment("D1", "StopApplication")]));
        api.expect_list_deployments()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![deployment("D2", "ScaleApplication")]));

        let c = healthy_controller(api);
        let started = tokio::time::Instant::now();
        c.stop(&identity(), false).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(c.state(), LifecycleState::Removed);
        assert_eq!(c.last_deployment().as_deref(), Some("D1"));
    }

    #[tokio::test]
    async fn test_stop_now_returns_immediately() {
        let mut api = MockMarathonApi::new();
        api.expect_delete_app().times(1).returning(|_| {
            Ok(DeploymentRef {
                deployment_id: "D1".into(),
                version: String::new(),
            })
        });
        api.expect_list_deployments().times(0);

        let c = healthy_controller(api);
        c.stop(&identity(), true).await.unwrap();
        assert_eq!(c.state(), LifecycleState::Removed);
    }

    #[tokio::test]
    async fn test_stop_strict_reraises() {
        let mut api = MockMarathonApi::new();
        api.expect_delete_app().returning(|id| {
            Err(Error::SubmissionRejected {
                app_id: id.to_string(),
                reason: "409 locked by deployment".into(),
            })
        });

        let c = healthy_controller(api);
        let err = c.stop(&identity(), false).await.unwrap_err();
        assert!(matches!(err, Error::SubmissionRejected { .. }));
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_stop_lenient_swallows() {
        let mut api = MockMarathonApi::new();
        api.expect_delete_app()
            .returning(|_| Err(Error::Api { status: 503, body: "no leader".into() }));
        api.expect_list_deployments().times(0);

        let c = healthy_controller(api).with_teardown_policy(TeardownPolicy::Lenient);
        c.stop(&identity(), false).await.unwrap();
        assert_eq!(c.state(), LifecycleState::Removed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_bounded_wait_times_out() {
        let mut api = MockMarathonApi::new();
        api.expect_delete_app().returning(|_| {
            Ok(DeploymentRef {
                deployment_id: "D1".into(),
                version: String::new(),
            })
        });
        api.expect_list_deployments()
            .times(3)
            .returning(|| Ok(vec![deployment("D1", "StopApplication")]));

        let c = healthy_controller(api).with_poll_policy(PollPolicy::default().bounded(3));
        let err = c.stop(&identity(), false).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { attempts: 3, .. }));
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_dropped_by_timeout_marks_failed() {
        let mut api = MockMarathonApi::new();
        api.expect_delete_app().times(1).returning(|_| {
            Ok(DeploymentRef {
                deployment_id: "D1".into(),
                version: String::new(),
            })
        });
        api.expect_list_deployments()
            .returning(|| Ok(vec![deployment("D1", "StopApplication")]));

        let c = healthy_controller(api);
        let result = tokio::time::timeout(Duration::from_millis(3500), c.stop(&identity(), false)).await;
        assert!(result.is_err());
        assert_eq!(c.state(), LifecycleState::Failed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Healthy.to_string(), "Healthy");
        assert_eq!(LifecycleState::Removed.to_string(), "Removed");
    }
}
