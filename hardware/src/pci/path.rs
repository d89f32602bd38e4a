// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCIe ancestry by path.
//!
//! Sysfs lays out PCI devices as a directory tree mirroring the bus hierarchy:
//!
//! ```text
//! /sys/devices/pci0000:17                        <- root complex
//! /sys/devices/pci0000:17/0000:17:01.0           <- root port / switch upstream port
//! /sys/devices/pci0000:17/0000:17:01.0/0000:18:00.0
//! ```
//!
//! Two devices are topologically close when their resolved paths share a deep common ancestor.
//! The functions here are plain text algorithms over already resolved (symlink free) paths.
//! They never touch the filesystem and never normalize separators.

/// Prefix shared by every PCI root complex directory.
const ROOT_COMPLEX_PREFIX: &str = "/sys/devices/pci";

/// Length of the longest common ancestor directory of `a` and `b`.
///
/// The scan runs both strings in lock-step and records an offset whenever both strings sit on a
/// `/` or have run out at the same time.
/// It stops at the first differing byte.
/// A lone leading `/` is not enough on its own: `"/"` and `"/sys"` share nothing.
///
/// Missing inputs share nothing.
///
/// ```
/// # use transfer_hardware::pci::path::common_ancestor_len;
/// assert_eq!(common_ancestor_len(Some("/sys/devices"), Some("/sys/bus")), 4);
/// assert_eq!(common_ancestor_len(None, Some("/sys")), 0);
/// ```
#[must_use]
pub fn common_ancestor_len(a: Option<&str>, b: Option<&str>) -> usize {
    let (Some(a), Some(b)) = (a, b) else {
        return 0;
    };
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let boundary = |path: &[u8], offset: usize| path.get(offset).is_none_or(|&c| c == b'/');
    let mut parent_len = 0;
    let mut offset = 0;
    loop {
        if boundary(a, offset) && boundary(b, offset) {
            parent_len = offset;
        }
        match (a.get(offset), b.get(offset)) {
            (Some(x), Some(y)) if x == y => offset += 1,
            _ => return parent_len,
        }
    }
}

/// The longest common ancestor directory of `a` and `b`, as a prefix of `a`.
///
/// ```
/// # use transfer_hardware::pci::path::common_ancestor;
/// assert_eq!(
///     common_ancestor(
///         Some("/sys/devices/pci0000:17/0000:17:01.0/device1"),
///         Some("/sys/devices/pci0000:17/0000:17:02.0/device2"),
///     ),
///     "/sys/devices/pci0000:17"
/// );
/// ```
#[must_use]
pub fn common_ancestor<'a>(a: Option<&'a str>, b: Option<&str>) -> &'a str {
    let len = common_ancestor_len(a, b);
    match a {
        // the ancestor length always lands on a char boundary: it is either the end of `a` or
        // the offset of an ascii '/'
        Some(a) => &a[..len],
        None => "",
    }
}

/// Returns true if `path` names a PCI root complex directory, i.e. exactly
/// `/sys/devices/pci<hex domain>:<hex bus>` with nothing following.
///
/// ```
/// # use transfer_hardware::pci::path::is_pci_root_complex;
/// assert!(is_pci_root_complex(Some("/sys/devices/pci0000:17")));
/// assert!(!is_pci_root_complex(Some("/sys/devices/pci0000:17/0000:17:01.0")));
/// ```
#[must_use]
pub fn is_pci_root_complex(path: Option<&str>) -> bool {
    let Some(rest) = path.and_then(|p| p.strip_prefix(ROOT_COMPLEX_PREFIX)) else {
        return false;
    };
    let Some((domain, bus)) = rest.split_once(':') else {
        return false;
    };
    let hex = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_hexdigit());
    hex(domain) && hex(bus)
}

/// Walk upwards from `path` (inclusive), truncating at each `/`, and return the first directory
/// which is a PCI root complex.
#[must_use]
pub fn enclosing_root_complex(path: &str) -> Option<&str> {
    let mut current = path;
    while !current.is_empty() {
        if is_pci_root_complex(Some(current)) {
            return Some(current);
        }
        current = &current[..current.rfind('/')?];
    }
    None
}

/// Number of path segments in `path` below `ancestor`.
///
/// `ancestor` is expected to be a prefix of `path` ending on a segment boundary.
#[must_use]
pub fn depth_below(ancestor: &str, path: &str) -> usize {
    path.get(ancestor.len()..)
        .map_or(0, |rest| rest.split('/').filter(|s| !s.is_empty()).count())
}
