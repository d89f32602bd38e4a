// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NUMA (Non-Uniform Memory Access) node identifiers.
//!
//! Memory access time depends on which node the memory belongs to relative to the processor
//! (or PCI device) doing the access.
//! Devices attached to the same NUMA node as a CPU are reached without crossing the socket
//! interconnect.

/// The id of a NUMA node, as used in `/sys/devices/system/node/node<N>`.
///
/// # Examples
///
/// ```
/// # use transfer_hardware::numa::NumaNodeId;
/// assert_eq!(NumaNodeId::parse_sysfs_attr("1"), Some(NumaNodeId::new(1)));
/// // the kernel reports -1 for devices with no NUMA affinity
/// assert_eq!(NumaNodeId::parse_sysfs_attr("-1"), None);
/// assert_eq!(NumaNodeId::from_dir_name("node3"), Some(NumaNodeId::new(3)));
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
#[repr(transparent)]
pub struct NumaNodeId(u16);

impl NumaNodeId {
    /// Creates a new NUMA node id.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the raw node number.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }

    /// Parse a `numa_node` attribute of a PCI device.
    ///
    /// Negative values (no affinity) and garbage both map to `None`.
    #[must_use]
    pub fn parse_sysfs_attr(value: &str) -> Option<Self> {
        value.trim().parse::<u16>().ok().map(Self)
    }

    /// Parse a node directory name of the form `node<N>`.
    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let digits = name.strip_prefix("node")?;
        if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

impl std::fmt::Display for NumaNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for NumaNodeId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}
