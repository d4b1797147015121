//! Resolve a task record into an address the hub can connect to

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;

use crate::models::AppInfo;
use crate::{Error, Result};

/// Where a user's server is reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl From<Endpoint> for (IpAddr, u16) {
    fn from(ep: Endpoint) -> Self {
        (ep.ip, ep.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Name resolution for agent host names
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<IpAddr>;
}

/// System resolver. IP literals are returned as-is and IPv4 answers are
/// preferred over IPv6.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| Error::Resolution {
                host: host.to_string(),
                reason: e.to_string(),
            })?
            .collect();

        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .map(|a| a.ip())
            .ok_or_else(|| Error::Resolution {
                host: host.to_string(),
                reason: "no addresses returned".to_string(),
            })
    }
}

/// Turn the single task of `app` into an endpoint on its first bound port
pub async fn resolve_endpoint(app: &AppInfo, resolver: &dyn HostResolver) -> Result<Endpoint> {
    let [task] = app.tasks.as_slice() else {
        return Err(Error::Topology {
            app_id: app.id.clone(),
            count: app.tasks.len(),
        });
    };

    let port = *task.ports.first().ok_or_else(|| Error::Topology {
        app_id: app.id.clone(),
        count: 0,
    })?;

    let ip = resolver.resolve(&task.host).await?;
    Ok(Endpoint { ip, port })
}
