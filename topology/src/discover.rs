// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Topology discovery: builds the affinity matrix from the hardware of this host.
//!
//! Every NUMA node with CPUs becomes a `cpu:<N>` entry preferring the HCAs on that node.
//! Every accelerator becomes a `gpu:<N>` entry preferring the closest HCAs in the PCIe tree.
//! Hardware that can not be inspected only makes the result less precise; discovery never fails.

use derive_builder::Builder;
use hardware::inventory::{Accelerator, Hca, HostInventory, SysfsInventory};
use hardware::numa::NumaNodeId;
use hardware::pci::resolve::{PciPathResolver, SysfsPciResolver, pcie_relation};
use tracing::{debug, info};

use crate::locality::Locality;
use crate::matrix::{AffinityEntry, Topology};

/// Knobs for [`Topology::discover`].
///
/// ```
/// # use transfer_topology::discover::DiscoveryConfigBuilder;
/// let config = DiscoveryConfigBuilder::default()
///     .filter(vec!["mlx5_0".to_string(), "mlx5_1".to_string()])
///     .include_accelerators(false)
///     .build()
///     .unwrap();
/// assert!(config.require_active_port);
/// ```
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Only consider HCAs with these names. Empty means every HCA.
    #[builder(default, setter(into))]
    pub filter: Vec<String>,
    /// Ignore HCAs with no port in the `ACTIVE` state.
    #[builder(default = "true")]
    pub require_active_port: bool,
    /// Produce `gpu:<N>` entries.
    #[builder(default = "true")]
    pub include_accelerators: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            filter: vec![],
            require_active_port: true,
            include_accelerators: true,
        }
    }
}

impl DiscoveryConfig {
    fn accepts(&self, hca: &Hca) -> bool {
        self.filter.is_empty() || self.filter.contains(&hca.name)
    }
}

/// How close an HCA is to an accelerator. Smaller is closer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Proximity {
    /// Behind the same PCIe switch (or root port), `distance` hops apart.
    Switch { distance: usize },
    /// Below the same PCIe root complex.
    RootComplex,
    /// Attached to the same NUMA node.
    Numa,
    /// Nothing in common that can be observed.
    Remote,
}

impl Proximity {
    /// Classify `hca` relative to `accelerator`.
    #[must_use]
    pub fn of<R: PciPathResolver + ?Sized>(
        resolver: &R,
        accelerator: &Accelerator,
        hca: &Hca,
    ) -> Proximity {
        let relation = hca.address.and_then(|address| {
            pcie_relation(
                resolver,
                &accelerator.address.to_string(),
                &address.to_string(),
            )
        });
        match relation {
            Some(relation) if relation.same_switch => Proximity::Switch {
                distance: relation.distance,
            },
            Some(relation) if relation.same_root_complex => Proximity::RootComplex,
            _ if accelerator.numa_node.is_some() && accelerator.numa_node == hca.numa_node => {
                Proximity::Numa
            }
            _ => Proximity::Remote,
        }
    }
}

fn cpu_entry(node: NumaNodeId, hcas: &[Hca]) -> AffinityEntry {
    let (preferred, avail): (Vec<&Hca>, Vec<&Hca>) =
        hcas.iter().partition(|hca| hca.numa_node == Some(node));
    AffinityEntry::new(
        preferred.into_iter().map(|hca| hca.name.clone()).collect(),
        avail.into_iter().map(|hca| hca.name.clone()).collect(),
    )
}

fn accelerator_entry<R: PciPathResolver + ?Sized>(
    resolver: &R,
    accelerator: &Accelerator,
    hcas: &[Hca],
) -> AffinityEntry {
    let ranked: Vec<(Proximity, &Hca)> = hcas
        .iter()
        .map(|hca| (Proximity::of(resolver, accelerator, hca), hca))
        .collect();
    let best = ranked
        .iter()
        .map(|(proximity, _)| *proximity)
        .min()
        .filter(|best| *best != Proximity::Remote);
    let mut entry = AffinityEntry::default();
    for (proximity, hca) in ranked {
        debug!(
            "hca {} is {proximity:?} to accelerator {}",
            hca.name, accelerator.address
        );
        if Some(proximity) == best {
            entry.preferred.push(hca.name.clone());
        } else {
            entry.avail.push(hca.name.clone());
        }
    }
    entry
}

impl Topology {
    /// Replace the matrix with one computed from the hardware of this host.
    ///
    /// Returns the number of entries produced.
    pub fn discover(&mut self, config: &DiscoveryConfig) -> usize {
        let inventory = SysfsInventory::new(config.require_active_port);
        self.discover_with(&inventory, &SysfsPciResolver, config)
    }

    /// Replace the matrix with one computed from `inventory`, locating devices in the PCIe tree
    /// with `resolver`.
    ///
    /// Returns the number of entries produced.
    pub fn discover_with<I, R>(
        &mut self,
        inventory: &I,
        resolver: &R,
        config: &DiscoveryConfig,
    ) -> usize
    where
        I: HostInventory + ?Sized,
        R: PciPathResolver + ?Sized,
    {
        let hcas: Vec<Hca> = inventory
            .hcas()
            .into_iter()
            .filter(|hca| {
                let accepted = config.accepts(hca);
                if !accepted {
                    debug!("hca {} is filtered out", hca.name);
                }
                accepted
            })
            .collect();

        let mut found = Topology::new();
        for node in inventory.cpu_nodes() {
            found.insert_entry(Locality::Cpu(node), cpu_entry(node, &hcas));
        }
        if config.include_accelerators {
            for accelerator in inventory.accelerators() {
                found.insert_entry(
                    Locality::Gpu(accelerator.ordinal),
                    accelerator_entry(resolver, &accelerator, &hcas),
                );
            }
        }

        info!(
            "discovered {} localities sharing {} hcas",
            found.matrix.len(),
            found.hca_list().len()
        );
        let entries = found.matrix.len();
        self.replace(found.matrix);
        entries
    }
}
