// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Host inventory: the CPU NUMA nodes, RDMA adapters (HCAs), and accelerators of this machine.
//!
//! [`HostInventory`] is the seam between topology discovery and the platform.
//! [`SysfsInventory`] is the production implementation; tests supply their own.

use sysfs::{SysfsErr, SysfsPath, sysfs_root};
use tracing::{debug, info, warn};

use crate::numa::NumaNodeId;
use crate::pci::address::PciAddress;
use crate::pci::class::{ClassCode, VendorId};
use crate::support::AcceleratorVendor;

/// An RDMA capable network adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Hca {
    /// Device name as reported by the kernel (e.g. `mlx5_0`).
    pub name: String,
    /// PCI address of the adapter, if it has one (software RDMA devices do not).
    pub address: Option<PciAddress>,
    /// NUMA node the adapter is attached to, if the platform reports one.
    pub numa_node: Option<NumaNodeId>,
}

impl Hca {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        address: Option<PciAddress>,
        numa_node: Option<NumaNodeId>,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            numa_node,
        }
    }
}

/// A compute accelerator (GPU or similar).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Accelerator {
    /// Position of this accelerator in PCI bus order, as used by `gpu:<ordinal>` keys.
    pub ordinal: u32,
    /// PCI address of the accelerator.
    pub address: PciAddress,
    /// NUMA node the accelerator is attached to, if the platform reports one.
    pub numa_node: Option<NumaNodeId>,
}

/// Enumeration of the hardware relevant to transfer device selection.
///
/// Implementations must not fail: hardware which can not be inspected is left out.
pub trait HostInventory {
    /// NUMA nodes which have CPUs attached.
    fn cpu_nodes(&self) -> Vec<NumaNodeId>;
    /// RDMA adapters, in enumeration order.
    fn hcas(&self) -> Vec<Hca>;
    /// Accelerators, in ordinal order.
    fn accelerators(&self) -> Vec<Accelerator>;
}

/// [`HostInventory`] backed by sysfs.
#[derive(Clone, Copy, Debug)]
pub struct SysfsInventory {
    require_active_port: bool,
}

impl Default for SysfsInventory {
    fn default() -> Self {
        Self {
            require_active_port: true,
        }
    }
}

/// Log a failure to inspect some piece of hardware at a level matching how surprising it is.
fn skipped(what: &str, err: &SysfsErr) {
    if err.is_not_found() {
        debug!("skipping {what}: not present");
    } else {
        warn!("skipping {what}: {err}");
    }
}

/// Whether a port `state` attribute (e.g. `4: ACTIVE`) reports the port as active.
fn port_is_active(state: &str) -> bool {
    state.rsplit(':').next().is_some_and(|state| state.trim() == "ACTIVE")
}

/// Whether a NUMA node `cpulist` attribute (e.g. `0-15,32-47`) names any cpu.
fn node_has_cpus(cpulist: &str) -> bool {
    !cpulist.trim().is_empty()
}

/// The accelerator vendor of a PCI device given its `vendor` and `class` attributes, if the
/// device is an accelerator.
fn accelerator_vendor(vendor: &str, class: &str) -> Option<AcceleratorVendor> {
    let vendor = AcceleratorVendor::from_vendor_id(VendorId::parse_sysfs(vendor).ok()?)?;
    let class = ClassCode::parse_sysfs(class).ok()?;
    vendor.is_accelerator_class(class).then_some(vendor)
}

/// Number accelerators in PCI address order, whatever order they were found in.
fn assign_ordinals(mut found: Vec<(PciAddress, Option<NumaNodeId>)>) -> Vec<Accelerator> {
    found.sort_by_key(|(address, _)| *address);
    (0u32..)
        .zip(found)
        .map(|(ordinal, (address, numa_node))| Accelerator {
            ordinal,
            address,
            numa_node,
        })
        .collect()
}

impl SysfsInventory {
    /// Create an inventory.
    ///
    /// If `require_active_port` is set, HCAs are only reported when at least one of their ports
    /// is in the `ACTIVE` state.
    #[must_use]
    pub fn new(require_active_port: bool) -> Self {
        Self {
            require_active_port,
        }
    }

    fn root() -> Option<&'static SysfsPath> {
        match sysfs_root() {
            Ok(root) => Some(root),
            Err(err) => {
                warn!("hardware inventory unavailable: {err}");
                None
            }
        }
    }

    fn has_active_port(name: &str, dev_dir: &SysfsPath) -> bool {
        let ports = match dev_dir.relative("ports").and_then(|ports| ports.entries()) {
            Ok(ports) => ports,
            Err(err) => {
                skipped(&format!("ports of {name}"), &err);
                return false;
            }
        };
        ports.iter().any(|port| {
            match dev_dir.read_attr(format!("ports/{port}/state")) {
                Ok(state) => port_is_active(&state),
                Err(err) => {
                    skipped(&format!("state of {name} port {port}"), &err);
                    false
                }
            }
        })
    }

    fn hca(&self, class_dir: &SysfsPath, name: &str) -> Option<Hca> {
        let dev_dir = match class_dir.relative(name) {
            Ok(dir) => dir,
            Err(err) => {
                skipped(&format!("hca {name}"), &err);
                return None;
            }
        };
        if self.require_active_port && !Self::has_active_port(name, &dev_dir) {
            info!("ignoring hca {name}: no active port");
            return None;
        }
        let (address, numa_node) = match dev_dir.relative("device") {
            Ok(device) => (
                PciAddress::try_from(device.file_name()).ok(),
                device
                    .read_attr("numa_node")
                    .ok()
                    .and_then(|numa| NumaNodeId::parse_sysfs_attr(&numa)),
            ),
            Err(err) => {
                skipped(&format!("pci device of hca {name}"), &err);
                (None, None)
            }
        };
        debug!("found hca {name} at {address:?} on numa node {numa_node:?}");
        Some(Hca {
            name: name.to_string(),
            address,
            numa_node,
        })
    }

    fn accelerator(devices: &SysfsPath, bus_id: &str) -> Option<(PciAddress, Option<NumaNodeId>)> {
        let address = PciAddress::try_from(bus_id).ok()?;
        let read = |attr: &str| match devices.read_attr(format!("{bus_id}/{attr}")) {
            Ok(value) => Some(value),
            Err(err) => {
                skipped(&format!("{attr} of pci device {bus_id}"), &err);
                None
            }
        };
        let vendor = accelerator_vendor(&read("vendor")?, &read("class")?)?;
        let numa_node = read("numa_node").and_then(|numa| NumaNodeId::parse_sysfs_attr(&numa));
        debug!("found {vendor} accelerator {address} on numa node {numa_node:?}");
        Some((address, numa_node))
    }
}

impl HostInventory for SysfsInventory {
    fn cpu_nodes(&self) -> Vec<NumaNodeId> {
        let Some(root) = Self::root() else {
            return vec![];
        };
        let node_dir = match root.relative("devices/system/node") {
            Ok(dir) => dir,
            Err(err) if err.is_not_found() => {
                info!("kernel has no numa support: assuming a single node");
                return vec![NumaNodeId::new(0)];
            }
            Err(err) => {
                skipped("numa nodes", &err);
                return vec![];
            }
        };
        let entries = match node_dir.entries() {
            Ok(entries) => entries,
            Err(err) => {
                skipped("numa nodes", &err);
                return vec![];
            }
        };
        let mut nodes: Vec<NumaNodeId> = entries
            .iter()
            .filter_map(|name| {
                let node = NumaNodeId::from_dir_name(name)?;
                match node_dir.read_attr(format!("{name}/cpulist")) {
                    Ok(cpus) if node_has_cpus(&cpus) => Some(node),
                    Ok(_) => {
                        debug!("numa node {node} has no cpus");
                        None
                    }
                    Err(err) => {
                        skipped(&format!("cpus of numa node {node}"), &err);
                        None
                    }
                }
            })
            .collect();
        nodes.sort();
        nodes
    }

    fn hcas(&self) -> Vec<Hca> {
        let Some(root) = Self::root() else {
            return vec![];
        };
        let class_dir = match root.relative("class/infiniband") {
            Ok(dir) => dir,
            Err(err) => {
                skipped("rdma devices", &err);
                return vec![];
            }
        };
        match class_dir.entries() {
            Ok(names) => names
                .iter()
                .filter_map(|name| self.hca(&class_dir, name))
                .collect(),
            Err(err) => {
                skipped("rdma devices", &err);
                vec![]
            }
        }
    }

    fn accelerators(&self) -> Vec<Accelerator> {
        let Some(root) = Self::root() else {
            return vec![];
        };
        let devices = match root.relative("bus/pci/devices") {
            Ok(dir) => dir,
            Err(err) => {
                skipped("pci devices", &err);
                return vec![];
            }
        };
        let found = match devices.entries() {
            Ok(bus_ids) => bus_ids
                .iter()
                .filter_map(|bus_id| Self::accelerator(&devices, bus_id))
                .collect(),
            Err(err) => {
                skipped("pci devices", &err);
                return vec![];
            }
        };
        assign_ordinals(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::inventory::{
        HostInventory, SysfsInventory, accelerator_vendor, assign_ordinals, node_has_cpus,
        port_is_active,
    };
    use crate::numa::NumaNodeId;
    use crate::pci::address::PciAddress;
    use crate::support::AcceleratorVendor;

    fn address(bus_id: &str) -> PciAddress {
        PciAddress::try_from(bus_id).unwrap()
    }

    #[test]
    fn only_active_ports_count() {
        assert!(port_is_active("4: ACTIVE"));
        assert!(port_is_active("4: ACTIVE\n"));
        assert!(port_is_active("ACTIVE"));
        assert!(!port_is_active("1: DOWN"));
        assert!(!port_is_active("2: INIT"));
        assert!(!port_is_active("3: ARMED"));
        assert!(!port_is_active("5: ACTIVE_DEFER"));
        assert!(!port_is_active(""));
    }

    #[test]
    fn nodes_without_cpus_are_left_out() {
        assert!(node_has_cpus("0-15,32-47\n"));
        assert!(node_has_cpus("3"));
        assert!(!node_has_cpus(""));
        assert!(!node_has_cpus("\n"));
    }

    #[test]
    fn unknown_numa_affinity() {
        // what `numa_node` reads for a device with no affinity
        assert_eq!(NumaNodeId::parse_sysfs_attr("-1\n"), None);
        assert_eq!(NumaNodeId::parse_sysfs_attr("1\n"), Some(NumaNodeId::new(1)));
    }

    #[test]
    fn accelerators_by_vendor_and_class() {
        assert_eq!(
            accelerator_vendor("0x10de\n", "0x030200\n"),
            Some(AcceleratorVendor::Nvidia)
        );
        assert_eq!(
            accelerator_vendor("0x1002", "0x038000"),
            Some(AcceleratorVendor::Amd)
        );
        assert_eq!(
            accelerator_vendor("0x19e5", "0x120000"),
            Some(AcceleratorVendor::Huawei)
        );
        // mellanox nic
        assert_eq!(accelerator_vendor("0x15b3", "0x020700"), None);
        // integrated intel graphics
        assert_eq!(accelerator_vendor("0x8086", "0x030000"), None);
        assert_eq!(accelerator_vendor("garbage", "0x030200"), None);
        assert_eq!(accelerator_vendor("0x10de", "garbage"), None);
    }

    #[test]
    fn ordinals_follow_pci_address_order() {
        let node0 = Some(NumaNodeId::new(0));
        let node1 = Some(NumaNodeId::new(1));
        let found = vec![
            (address("0000:86:00.0"), node1),
            (address("0000:18:00.0"), node0),
            (address("0001:01:00.0"), None),
            (address("0000:3b:00.0"), node0),
        ];
        let accelerators = assign_ordinals(found);
        let summary: Vec<_> = accelerators
            .iter()
            .map(|accelerator| (accelerator.ordinal, accelerator.address, accelerator.numa_node))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, address("0000:18:00.0"), node0),
                (1, address("0000:3b:00.0"), node0),
                (2, address("0000:86:00.0"), node1),
                (3, address("0001:01:00.0"), None),
            ]
        );
        assert!(assign_ordinals(vec![]).is_empty());
    }

    // The host running the tests may have any hardware at all (or no sysfs); all we can promise
    // is that the scan completes and reports self-consistent results.
    #[test]
    #[tracing_test::traced_test]
    fn sysfs_scan_never_fails() {
        let inventory = SysfsInventory::new(false);
        let nodes = inventory.cpu_nodes();
        let mut sorted = nodes.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(nodes, sorted);

        let accelerators = inventory.accelerators();
        for (expected, accelerator) in (0u32..).zip(&accelerators) {
            assert_eq!(accelerator.ordinal, expected);
        }
        assert!(
            accelerators
                .windows(2)
                .all(|pair| pair[0].address < pair[1].address)
        );

        let all = inventory.hcas();
        let active = SysfsInventory::default().hcas();
        assert!(active.iter().all(|hca| all.contains(hca)));
    }
}
