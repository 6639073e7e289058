//! Workload discovery.
//!
//! Discovery runs once, before the registry is built. Two sources exist:
//! a JSON inventory file and the local `docker` CLI.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;

use binocular_common::error::{BinocularError, Result};
use binocular_common::types::WorkloadRef;
use serde::Deserialize;

/// Something that can list the workloads running right now.
pub trait WorkloadSource {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns a snapshot of running workloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be queried.
    fn list_workloads(&self) -> Result<Vec<WorkloadRef>>;
}

/// Static inventory: a JSON array of `{id, ports, address}` objects.
#[derive(Debug, Clone)]
pub struct InventoryFile {
    path: PathBuf,
}

impl InventoryFile {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the inventory path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkloadSource for InventoryFile {
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn list_workloads(&self) -> Result<Vec<WorkloadRef>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| BinocularError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        let workloads: Vec<WorkloadRef> = serde_json::from_str(&content)?;
        tracing::info!(path = %self.path.display(), count = workloads.len(), "inventory loaded");
        Ok(workloads)
    }
}

/// Queries the Docker daemon through the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    /// Creates a source using the given `docker` binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let binary = which::which(&self.binary).map_err(|_| BinocularError::NotFound {
            kind: "docker binary",
            id: self.binary.clone(),
        })?;
        tracing::debug!(binary = %binary.display(), ?args, "querying docker");
        let output = Command::new(&binary)
            .args(args)
            .output()
            .map_err(|e| BinocularError::Io {
                path: binary.clone(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(BinocularError::Inspect {
                message: format!(
                    "docker {} exited with {}: {}",
                    args.first().unwrap_or(&""),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl WorkloadSource for DockerCli {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn list_workloads(&self) -> Result<Vec<WorkloadRef>> {
        let listing = self.run(&["ps", "-q", "--no-trunc"])?;
        let ids: Vec<&str> = listing.split_whitespace().collect();
        if ids.is_empty() {
            tracing::warn!("no running containers");
            return Ok(Vec::new());
        }

        let mut args = vec!["inspect"];
        args.extend(ids);
        let workloads = parse_inspect(&self.run(&args)?)?;
        tracing::info!(count = workloads.len(), "containers inspected");
        Ok(workloads)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    id: String,
    #[serde(default)]
    network_settings: NetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSettings {
    #[serde(default, rename = "IPAddress")]
    ip_address: String,
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<PortBinding>>>>,
    #[serde(default)]
    networks: Option<HashMap<String, EndpointSettings>>,
}

#[derive(Debug, Deserialize)]
struct PortBinding {
    #[serde(default, rename = "HostPort")]
    host_port: String,
}

#[derive(Debug, Deserialize)]
struct EndpointSettings {
    #[serde(default, rename = "IPAddress")]
    ip_address: String,
}

/// Maps `docker inspect` output to workloads.
///
/// Published host ports become the workload's ports. The address is the
/// default-bridge `IPAddress`, or the first non-empty per-network address
/// (in network name order) when the container is not on the default bridge.
///
/// # Errors
///
/// Returns an error if `json` is not an array of container objects.
pub fn parse_inspect(json: &str) -> Result<Vec<WorkloadRef>> {
    let containers: Vec<ContainerInspect> = serde_json::from_str(json)?;
    Ok(containers.into_iter().map(into_workload).collect())
}

fn into_workload(container: ContainerInspect) -> WorkloadRef {
    let settings = container.network_settings;

    let ports: BTreeSet<u16> = settings
        .ports
        .unwrap_or_default()
        .into_values()
        .flatten()
        .flatten()
        .filter_map(|binding| binding.host_port.parse().ok())
        .collect();

    let address = if settings.ip_address.is_empty() {
        let mut networks: Vec<(String, EndpointSettings)> =
            settings.networks.unwrap_or_default().into_iter().collect();
        networks.sort_by(|a, b| a.0.cmp(&b.0));
        networks
            .into_iter()
            .map(|(_, endpoint)| endpoint.ip_address)
            .find(|ip| !ip.is_empty())
            .unwrap_or_default()
    } else {
        settings.ip_address
    };

    WorkloadRef::new(container.id, ports, address)
}
