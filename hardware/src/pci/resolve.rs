// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Resolving PCI bus ids to device paths, and comparing the resulting PCIe ancestry.

use sysfs::{SysfsErr, sysfs_root};
use tracing::{debug, warn};

use crate::pci::path::{common_ancestor, depth_below, enclosing_root_complex};

/// Maps a PCI bus id (e.g. `0000:17:00.0`) to its resolved, symlink free device path
/// (e.g. `/sys/devices/pci0000:17/0000:17:01.0/0000:18:00.0`).
///
/// Resolution failure is not an error for callers of this trait: it simply means the device has
/// no known place in the PCIe tree.
pub trait PciPathResolver {
    /// Resolve `bus_id` to an absolute device path, or `None` if it can not be resolved.
    fn resolve(&self, bus_id: &str) -> Option<String>;
}

impl<F> PciPathResolver for F
where
    F: Fn(&str) -> Option<String>,
{
    fn resolve(&self, bus_id: &str) -> Option<String> {
        self(bus_id)
    }
}

/// Resolves bus ids through `/sys/bus/pci/devices/<bus id>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysfsPciResolver;

impl PciPathResolver for SysfsPciResolver {
    fn resolve(&self, bus_id: &str) -> Option<String> {
        if bus_id.is_empty() || bus_id.contains('/') {
            debug!("refusing to resolve bus id {bus_id:?}");
            return None;
        }
        let resolved = sysfs_root().and_then(|root| root.relative(format!("bus/pci/devices/{bus_id}")));
        match resolved {
            Ok(path) => Some(path.to_string()),
            Err(err) if err.is_not_found() => {
                debug!("pci device {bus_id} does not exist");
                None
            }
            Err(SysfsErr::NotMounted) => None,
            Err(err) => {
                warn!("unable to resolve pci device {bus_id}: {err}");
                None
            }
        }
    }
}

/// How two PCI devices relate to each other in the PCIe tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcieRelation {
    /// Number of hops from each device up to the closest shared ancestor, summed.
    /// Zero means both bus ids name the same device.
    pub distance: usize,
    /// Both devices sit below the same root complex.
    pub same_root_complex: bool,
    /// The closest shared ancestor is a bridge strictly below the root complex (a shared
    /// switch or root port).
    pub same_switch: bool,
}

/// Work out how `bus_a` and `bus_b` relate in the PCIe tree.
///
/// Returns `None` if either bus id fails to resolve or the resolved paths share no ancestor at
/// all.
#[must_use]
pub fn pcie_relation<R: PciPathResolver + ?Sized>(
    resolver: &R,
    bus_a: &str,
    bus_b: &str,
) -> Option<PcieRelation> {
    let path_a = resolver.resolve(bus_a)?;
    let path_b = resolver.resolve(bus_b)?;
    let common = common_ancestor(Some(&path_a), Some(&path_b));
    if common.is_empty() {
        return None;
    }
    let root = enclosing_root_complex(common);
    Some(PcieRelation {
        distance: depth_below(common, &path_a) + depth_below(common, &path_b),
        same_root_complex: root.is_some(),
        same_switch: root.is_some_and(|root| root.len() < common.len()),
    })
}

/// Returns true if both bus ids live under the same PCIe root complex.
///
/// Any resolution failure (bad bus id, missing device, no sysfs) answers `false`.
#[must_use]
pub fn is_same_pcie_root_complex<R: PciPathResolver + ?Sized>(
    resolver: &R,
    bus_a: &str,
    bus_b: &str,
) -> bool {
    pcie_relation(resolver, bus_a, bus_b).is_some_and(|relation| relation.same_root_complex)
}

/// Number of PCIe hops between two devices via their closest shared ancestor.
#[must_use]
pub fn pcie_distance<R: PciPathResolver + ?Sized>(
    resolver: &R,
    bus_a: &str,
    bus_b: &str,
) -> Option<usize> {
    pcie_relation(resolver, bus_a, bus_b).map(|relation| relation.distance)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use std::collections::BTreeMap;

    use crate::pci::resolve::{
        PciPathResolver, PcieRelation, SysfsPciResolver, is_same_pcie_root_complex,
        pcie_distance, pcie_relation,
    };

    /// A two socket machine: one switch with a gpu and two nics on the first root complex, a
    /// directly attached nic on the same root complex, and a lone nic on the second socket.
    fn fake_tree() -> impl Fn(&str) -> Option<String> {
        let paths: BTreeMap<&'static str, &'static str> = [
            ("0000:18:00.0", "/sys/devices/pci0000:17/0000:17:01.0/0000:18:00.0"),
            ("0000:18:00.1", "/sys/devices/pci0000:17/0000:17:01.0/0000:18:00.1"),
            ("0000:19:00.0", "/sys/devices/pci0000:17/0000:17:01.0/0000:18:02.0/0000:19:00.0"),
            ("0000:1a:00.0", "/sys/devices/pci0000:17/0000:17:02.0/0000:1a:00.0"),
            ("0000:86:00.0", "/sys/devices/pci0000:85/0000:85:01.0/0000:86:00.0"),
            ("0000:00:1f.0", "/sys/devices/platform/not-pci"),
        ]
        .into_iter()
        .collect();
        move |bus: &str| paths.get(bus).map(ToString::to_string)
    }

    #[test]
    fn same_switch() {
        let tree = fake_tree();
        assert_eq!(
            pcie_relation(&tree, "0000:18:00.0", "0000:19:00.0"),
            Some(PcieRelation {
                distance: 3,
                same_root_complex: true,
                same_switch: true,
            })
        );
        assert_eq!(pcie_distance(&tree, "0000:18:00.0", "0000:18:00.1"), Some(2));
    }

    #[test]
    fn same_root_complex_only() {
        let tree = fake_tree();
        let relation = pcie_relation(&tree, "0000:18:00.0", "0000:1a:00.0").unwrap();
        assert!(relation.same_root_complex);
        assert!(!relation.same_switch);
        assert_eq!(relation.distance, 4);
        assert!(is_same_pcie_root_complex(&tree, "0000:18:00.0", "0000:1a:00.0"));
    }

    #[test]
    fn different_root_complexes() {
        let tree = fake_tree();
        assert!(!is_same_pcie_root_complex(&tree, "0000:18:00.0", "0000:86:00.0"));
        let relation = pcie_relation(&tree, "0000:18:00.0", "0000:86:00.0").unwrap();
        assert!(!relation.same_root_complex);
        assert!(!relation.same_switch);
    }

    #[test]
    fn same_device() {
        let tree = fake_tree();
        let relation = pcie_relation(&tree, "0000:18:00.0", "0000:18:00.0").unwrap();
        assert_eq!(relation.distance, 0);
        assert!(relation.same_root_complex);
        assert!(relation.same_switch);
    }

    #[test]
    fn non_pci_ancestry() {
        let tree = fake_tree();
        assert!(!is_same_pcie_root_complex(&tree, "0000:00:1f.0", "0000:18:00.0"));
    }

    #[test]
    fn unresolvable_is_never_same() {
        let tree = fake_tree();
        assert!(!is_same_pcie_root_complex(&tree, "0000:18:00.0", "0000:99:00.0"));
        assert!(!is_same_pcie_root_complex(&tree, "", "0000:18:00.0"));
        assert_eq!(pcie_distance(&tree, "0000:99:00.0", "0000:18:00.0"), None);
    }

    #[test]
    fn sysfs_resolver_rejects_invalid_bus_ids() {
        let resolver = SysfsPciResolver;
        assert_eq!(resolver.resolve(""), None);
        assert_eq!(resolver.resolve("../../../etc"), None);
        assert!(!is_same_pcie_root_complex(&resolver, "invalid_bus_id", "also_invalid"));
        assert!(!is_same_pcie_root_complex(&resolver, "", ""));
        assert!(!is_same_pcie_root_complex(&resolver, "xyz:abc:def", "123:456:789"));
        assert!(!is_same_pcie_root_complex(&resolver, "", "0000:17:00.0"));
        assert!(!is_same_pcie_root_complex(&resolver, "0000:17:00.0", ""));
    }
}
