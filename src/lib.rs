//! Marathon Spawner
//!
//! Runs each hub user's single-user notebook server as a Marathon
//! application and turns Marathon's asynchronous deployments into the
//! synchronous start / stop / poll contract a hub expects.
//!
//! # Key Features
//!
//! - **One app per user** - `/<prefix>/<user>`, one Docker instance, dynamic host ports
//! - **Health-gated start** - returns only once the single task passes its health check
//! - **Deployment-aware poll** - a pending delete is reported as exited before tasks vanish
//! - **Cancellable waits** - every poll loop yields to tokio and honours a cancel signal
//!
//! # Example
//!
//! ```no_run
//! use marathon_spawner::{HubContext, MarathonSpawner, Spawner, SpawnerConfig};
//! use url::Url;
//!
//! # async fn run() -> marathon_spawner::Result<()> {
//! let config = SpawnerConfig::builder()
//!     .marathon_host("http://leader.mesos:8080")
//!     .app_image("jupyterhub/singleuser")
//!     .build();
//!
//! let hub = HubContext::new("alice", Url::parse("http://10.0.0.1:8081/hub/api")?);
//! let spawner = MarathonSpawner::from_config(config, hub)?;
//!
//! let (ip, port) = spawner.start().await?;
//! println!("alice's server is at {}:{}", ip, port);
//!
//! spawner.stop(false).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod definition;
pub mod endpoint;
pub mod env;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod models;
pub mod spawner;
pub mod volume;

pub use client::{MarathonApi, MarathonClient};
pub use config::{ByteSize, PollPolicy, SpawnerConfig, TeardownPolicy};
pub use endpoint::{DnsResolver, Endpoint, HostResolver};
pub use env::HubContext;
pub use error::{Error, Result};
pub use identity::{SpawnerState, WorkloadIdentity};
pub use lifecycle::{LifecycleController, LifecycleState, RunState};
pub use spawner::{MarathonSpawner, Spawner};
pub use volume::{VolumeNameContext, VolumeNameFormatter};
