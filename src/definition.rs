//! Builds the Marathon application definition for one user's workload

use std::collections::BTreeMap;

use crate::config::SpawnerConfig;
use crate::identity::WorkloadIdentity;
use crate::models::{AppDefinition, Container, DockerContainer, PortMapping, Volume};
use crate::volume::VolumeNameContext;

pub const CONTAINER_TYPE_DOCKER: &str = "DOCKER";

/// Map the spawner configuration onto a single-instance Docker app named
/// after `identity`.
pub fn build_app_definition(
    config: &SpawnerConfig,
    identity: &WorkloadIdentity,
    env: BTreeMap<String, String>,
) -> AppDefinition {
    let docker = DockerContainer {
        image: config.app_image.clone(),
        network: config.network_mode,
        port_mappings: port_mappings(&config.ports),
    };

    AppDefinition {
        id: identity.as_str().to_string(),
        instances: 1,
        cpus: config.cpu_limit,
        mem: config.mem_request_mib(),
        env,
        container: Container {
            kind: CONTAINER_TYPE_DOCKER.to_string(),
            docker,
            volumes: volumes(config, identity),
        },
        constraints: config.marathon_constraints.clone(),
        health_checks: vec![config.health_check.clone()],
    }
}

fn port_mappings(ports: &[u16]) -> Vec<PortMapping> {
    ports.iter().copied().map(PortMapping::dynamic).collect()
}

fn volumes(config: &SpawnerConfig, identity: &WorkloadIdentity) -> Vec<Volume> {
    let ctx = VolumeNameContext {
        user: identity.user(),
        app_id: identity.as_str(),
    };
    let fmt = &config.format_volume_name;

    config
        .volumes
        .iter()
        .map(|v| {
            let mut v = v.clone();
            v.container_path = fmt.format(&v.container_path, &ctx);
            v.host_path = v.host_path.map(|p| fmt.format(&p, &ctx));
            if let Some(external) = v.external.as_mut() {
                external.name = fmt.format(&external.name, &ctx);
            }
            v
        })
        .collect()
}
