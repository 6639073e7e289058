//! Workload registry.
//!
//! Maps host-facing ports and internal addresses to the workload that owns
//! them. Built once from a discovery snapshot and never mutated; a refresh
//! means building a new registry and swapping the `Arc` that holds it.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::num::ParseIntError;

use binocular_common::config::DuplicatePolicy;
use binocular_common::constants::DEFAULT_HTTP_PORT;
use binocular_common::error::{BinocularError, Result};
use binocular_common::types::WorkloadRef;

/// Immutable lookup from network identifiers to workloads.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    workloads: Vec<WorkloadRef>,
    by_port: HashMap<u16, usize>,
    by_address: HashMap<String, usize>,
}

impl Registry {
    /// Builds the port and address indexes from a workload snapshot.
    ///
    /// Collisions between different workloads are resolved by `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`BinocularError::DuplicateKey`] when `policy` is
    /// [`DuplicatePolicy::Reject`] and two workloads share a key.
    pub fn build(
        workloads: impl IntoIterator<Item = WorkloadRef>,
        policy: DuplicatePolicy,
    ) -> Result<Self> {
        let workloads: Vec<WorkloadRef> = workloads.into_iter().collect();
        let mut by_port = HashMap::new();
        let mut by_address = HashMap::new();

        for (slot, workload) in workloads.iter().enumerate() {
            for &port in &workload.ports {
                claim(&mut by_port, "port", port, slot, &workloads, policy)?;
            }
            if !workload.address.is_empty() {
                claim(
                    &mut by_address,
                    "address",
                    workload.address.clone(),
                    slot,
                    &workloads,
                    policy,
                )?;
            }
        }

        tracing::info!(
            workloads = workloads.len(),
            ports = by_port.len(),
            addresses = by_address.len(),
            %policy,
            "workload registry built"
        );

        Ok(Self {
            workloads,
            by_port,
            by_address,
        })
    }

    /// Resolves the workload a request was sent to from its `host[:port]`
    /// header. A header without a port targets port 80.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the port suffix is not a valid `u16`.
    pub fn resolve_destination(
        &self,
        host: &str,
    ) -> std::result::Result<Option<&WorkloadRef>, ParseIntError> {
        destination_port(host).map(|port| self.lookup_port(port))
    }

    /// Looks up the workload publishing `port`.
    pub fn lookup_port(&self, port: u16) -> Option<&WorkloadRef> {
        self.by_port.get(&port).map(|&slot| &self.workloads[slot])
    }

    /// Resolves the workload owning a source address.
    pub fn resolve_source(&self, address: &str) -> Option<&WorkloadRef> {
        self.by_address
            .get(address)
            .map(|&slot| &self.workloads[slot])
    }

    /// Returns every indexed port in ascending order.
    pub fn ports(&self) -> BTreeSet<u16> {
        self.by_port.keys().copied().collect()
    }

    /// Returns whether the registry indexes nothing.
    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty() && self.by_address.is_empty()
    }
}

/// Extracts the destination port from a `host[:port]` header.
///
/// Bracketed IPv6 literals are supported (`[::1]:8080`). A header carrying
/// no port yields 80.
///
/// # Errors
///
/// Returns the parse error when the port suffix is not a valid `u16`.
pub fn destination_port(host: &str) -> std::result::Result<u16, ParseIntError> {
    let suffix = if let Some(rest) = host.strip_prefix('[') {
        rest.split_once("]:").map(|(_, port)| port)
    } else {
        host.split_once(':').map(|(_, port)| port)
    };
    suffix.map_or(Ok(DEFAULT_HTTP_PORT), str::parse)
}

fn claim<K>(
    index: &mut HashMap<K, usize>,
    kind: &'static str,
    key: K,
    slot: usize,
    workloads: &[WorkloadRef],
    policy: DuplicatePolicy,
) -> Result<()>
where
    K: Eq + Hash + ToString,
{
    match index.entry(key) {
        Entry::Vacant(entry) => {
            let _ = entry.insert(slot);
        }
        Entry::Occupied(mut entry) => {
            let first = &workloads[*entry.get()].id;
            let second = &workloads[slot].id;
            if first == second {
                let _ = entry.insert(slot);
                return Ok(());
            }
            let key = entry.key().to_string();
            match policy {
                DuplicatePolicy::LastWins => {
                    tracing::warn!(kind, key, %first, %second, "duplicate key, keeping later workload");
                    let _ = entry.insert(slot);
                }
                DuplicatePolicy::FirstWins => {
                    tracing::warn!(kind, key, %first, %second, "duplicate key, keeping earlier workload");
                }
                DuplicatePolicy::Reject => {
                    return Err(BinocularError::DuplicateKey {
                        kind,
                        key,
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}
