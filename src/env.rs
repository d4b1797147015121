//! Environment handed to the single-user server inside the container

use std::collections::BTreeMap;

use url::Url;

use crate::config::SpawnerConfig;
use crate::Result;

/// What the hub knows about the user's server
#[derive(Debug, Clone)]
pub struct HubContext {
    pub user: String,
    pub cookie_name: String,
    /// URL prefix of the user's server, e.g. `/user/alice/`
    pub base_url: String,
    /// URL prefix of the hub, e.g. `/hub/`
    pub hub_prefix: String,
    /// Hub API as seen from the hub itself
    pub hub_api_url: Url,
    pub notebook_dir: Option<String>,
    /// Anything else the hub wants set
    pub extra_env: BTreeMap<String, String>,
}

impl HubContext {
    pub fn new(user: impl Into<String>, hub_api_url: Url) -> Self {
        let user = user.into();
        Self {
            cookie_name: format!("jupyterhub-user-{}", user),
            base_url: format!("/user/{}/", user),
            hub_prefix: "/hub/".to_string(),
            hub_api_url,
            notebook_dir: None,
            extra_env: BTreeMap::new(),
            user,
        }
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn hub_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.hub_prefix = prefix.into();
        self
    }

    pub fn notebook_dir(mut self, dir: impl Into<String>) -> Self {
        self.notebook_dir = Some(dir.into());
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }
}

/// Build the container environment for `hub`, pointing the callback URL at
/// the configured public hub address when one is set.
pub fn build_environment(config: &SpawnerConfig, hub: &HubContext) -> Result<BTreeMap<String, String>> {
    let mut env = hub.extra_env.clone();
    env.insert("JPY_USER".into(), hub.user.clone());
    env.insert("JPY_COOKIE_NAME".into(), hub.cookie_name.clone());
    env.insert("JPY_BASE_URL".into(), hub.base_url.clone());
    env.insert("JPY_HUB_PREFIX".into(), hub.hub_prefix.clone());

    if let Some(dir) = &hub.notebook_dir {
        env.insert("NOTEBOOK_DIR".into(), dir.clone());
    }

    let api_url = public_hub_api_url(
        &hub.hub_api_url,
        config.hub_ip_connect.as_deref(),
        config.hub_port_connect,
    )?;
    env.insert("JPY_HUB_API_URL".into(), api_url.to_string());
    Ok(env)
}

/// Swap host and/or port of the hub API URL, keeping scheme, path and query
pub fn public_hub_api_url(api_url: &Url, ip: Option<&str>, port: Option<u16>) -> Result<Url> {
    let ip = ip.filter(|s| !s.is_empty());
    let port = port.filter(|p| *p > 0);
    if ip.is_none() && port.is_none() {
        return Ok(api_url.clone());
    }

    let mut url = api_url.clone();
    if let Some(ip) = ip {
        url.set_host(Some(ip))?;
    }
    if let Some(port) = port {
        // only fails for cannot-be-a-base URLs, which have no host to begin with
        url.set_port(Some(port))
            .map_err(|_| crate::Error::Config(format!("cannot set a port on {}", api_url)))?;
    }
    Ok(url)
}
