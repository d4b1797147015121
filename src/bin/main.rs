//! marathon-spawner CLI - run a hub user's server on Marathon by hand

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use marathon_spawner::{
    Error, HubContext, MarathonApi, MarathonClient, MarathonSpawner, Result, RunState, Spawner, SpawnerConfig,
    SpawnerState, TeardownPolicy,
};
use tokio::sync::watch;
use url::Url;

#[derive(Parser)]
#[command(name = "marathon-spawner")]
#[command(about = "Launch, poll and tear down per-user notebook servers on Marathon")]
#[command(version)]
struct Cli {
    /// Path to a JSON spawner configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Marathon base URL, overrides the configuration file
    #[arg(long, global = true, env = "MARATHON_URL")]
    marathon_host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the application definition that would be submitted
    Definition {
        #[command(flatten)]
        user: UserArgs,
    },
    /// Launch a user's server and wait until it is healthy
    Start {
        #[command(flatten)]
        user: UserArgs,
    },
    /// Delete a user's server
    Stop {
        #[command(flatten)]
        user: UserArgs,
        /// Return without waiting for the delete deployment
        #[arg(long)]
        now: bool,
        /// Report success even if the delete request fails
        #[arg(long)]
        lenient: bool,
    },
    /// Check whether a user's server is still running
    Poll {
        #[command(flatten)]
        user: UserArgs,
    },
    /// List in-flight Marathon deployments
    Deployments,
}

#[derive(Args)]
struct UserArgs {
    /// Hub user name
    #[arg(short, long)]
    user: String,
    /// Hub API URL as seen by the hub
    #[arg(long, default_value = "http://127.0.0.1:8081/hub/api")]
    hub_api_url: Url,
    /// Working directory for the notebook server
    #[arg(long)]
    notebook_dir: Option<String>,
}

impl UserArgs {
    fn hub_context(&self) -> HubContext {
        let hub = HubContext::new(self.user.clone(), self.hub_api_url.clone());
        match &self.notebook_dir {
            Some(dir) => hub.notebook_dir(dir.clone()),
            None => hub,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "marathon_spawner=info"
                    .parse()
                    .map_err(|e| Error::Config(format!("invalid log directive: {}", e)))?,
            ),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SpawnerConfig::from_file(path)?,
        None => SpawnerConfig::default(),
    };
    if let Some(host) = cli.marathon_host {
        config.marathon_host = host;
    }

    match cli.command {
        Commands::Definition { user } => {
            let spawner = MarathonSpawner::from_config(config, user.hub_context())?;
            println!("{}", serde_json::to_string_pretty(&spawner.app_definition()?)?);
        }
        Commands::Start { user } => {
            let spawner = MarathonSpawner::from_config(config, user.hub_context())?
                .with_cancellation(cancel_on_ctrl_c());
            println!("Starting {}...", spawner.identity());
            let (ip, port) = spawner.start().await?;
            println!("Server for {} is healthy at {}:{}", user.user, ip, port);
            println!("{}", serde_json::to_string(&spawner.get_state())?);
        }
        Commands::Stop { user, now, lenient } => {
            if lenient {
                config.teardown = TeardownPolicy::Lenient;
            }
            let spawner = MarathonSpawner::from_config(config, user.hub_context())?
                .with_cancellation(cancel_on_ctrl_c());
            println!("Stopping {}...", spawner.identity());
            spawner.stop(now).await?;
            println!("Stopped.");
        }
        Commands::Poll { user } => {
            let spawner = MarathonSpawner::from_config(config, user.hub_context())?;
            spawner.load_state(SpawnerState::for_identity(&spawner.identity()));
            match spawner.poll().await? {
                RunState::StillRunning => println!("{}: running", spawner.identity()),
                RunState::Exited(code) => println!("{}: exited ({})", spawner.identity(), code),
            }
        }
        Commands::Deployments => {
            config.validate()?;
            let client = MarathonClient::new(&config.marathon_host, config.request_timeout())?;
            let deployments = client.list_deployments().await?;
            if deployments.is_empty() {
                println!("No deployments in progress.");
            }
            for d in deployments {
                let actions: Vec<String> = d
                    .current_actions
                    .iter()
                    .map(|a| format!("{} {}", a.action, a.app))
                    .collect();
                println!("{}  apps: {}  actions: {}", d.id, d.affected_apps.join(","), actions.join("; "));
            }
        }
    }

    Ok(())
}

/// Cancellation receiver that flips to `true` on Ctrl-C
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            let _ = tx.send(true);
        }
    });
    rx
}
