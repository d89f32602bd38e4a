// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The affinity matrix and the device registry derived from it.

use std::collections::HashSet;

use ordermap::OrderMap;
use tracing::{debug, warn};

/// Devices usable from one locality, split in two tiers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AffinityEntry {
    /// Devices closest to the locality; first choice.
    pub preferred: Vec<String>,
    /// Every other usable device; fallback.
    pub avail: Vec<String>,
}

impl AffinityEntry {
    /// Entry with the given tiers, kept as is.
    #[must_use]
    pub fn new(preferred: Vec<String>, avail: Vec<String>) -> Self {
        Self { preferred, avail }
    }

    /// `preferred` followed by `avail`.
    #[must_use]
    pub fn candidates(&self) -> impl Iterator<Item = &String> {
        self.preferred.iter().chain(self.avail.iter())
    }

    /// Total number of candidate devices (both tiers).
    #[must_use]
    pub fn len(&self) -> usize {
        self.preferred.len() + self.avail.len()
    }

    /// True if neither tier holds a device.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.preferred.is_empty() && self.avail.is_empty()
    }

    /// Remove `name` from both tiers, returning true if anything was removed.
    fn remove(&mut self, name: &str) -> bool {
        let before = self.len();
        self.preferred.retain(|device| device != name);
        self.avail.retain(|device| device != name);
        before != self.len()
    }
}

/// Locality key to [`AffinityEntry`], in insertion order.
///
/// The order is the serialization order and the order the device registry is built in.
pub type AffinityMatrix = OrderMap<String, AffinityEntry>;

/// The device topology of this process: an [`AffinityMatrix`] plus the registry of every device
/// it mentions.
///
/// # Device indices
///
/// A device index is the position of the device name in [`Topology::hca_list`].
/// The registry is rebuilt whenever the matrix changes, so indices are only meaningful against the
/// topology state they were obtained from.
/// [`Topology::generation`] moves forward on every change; compare it to detect stale indices.
///
/// # Concurrency
///
/// Readers (`select_device`, `hca_list`, `matrix`, `to_json`) take `&self`, writers take
/// `&mut self`.
/// Share it behind a lock if it must change while transfers are running.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    pub(crate) matrix: AffinityMatrix,
    hca_list: Vec<String>,
    generation: u64,
}

impl Topology {
    /// Create an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.replace(AffinityMatrix::new());
    }

    /// True if the matrix holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    /// Read-only view of the affinity matrix.
    #[must_use]
    pub fn matrix(&self) -> &AffinityMatrix {
        &self.matrix
    }

    /// The entry for `key`, if there is one.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&AffinityEntry> {
        self.matrix.get(key)
    }

    /// Every distinct device name in the matrix, in first-seen order (entries in matrix order,
    /// `preferred` before `avail` within an entry).
    #[must_use]
    pub fn hca_list(&self) -> &[String] {
        &self.hca_list
    }

    /// The index of `name` in [`Topology::hca_list`].
    #[must_use]
    pub fn hca_index(&self, name: &str) -> Option<usize> {
        self.hca_list.iter().position(|device| device == name)
    }

    /// Mutation counter; changes every time the matrix (and so the registry) changes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Insert (or replace) the entry for `key`.
    ///
    /// Names listed in `preferred` are dropped from `avail` so the two tiers stay disjoint.
    pub fn insert_entry(&mut self, key: impl Into<String>, mut entry: AffinityEntry) {
        let key = key.into();
        let preferred: HashSet<&str> = entry.preferred.iter().map(String::as_str).collect();
        let before = entry.avail.len();
        let avail = std::mem::take(&mut entry.avail);
        entry.avail = avail
            .into_iter()
            .filter(|device| !preferred.contains(device.as_str()))
            .collect();
        if entry.avail.len() != before {
            debug!("{key}: dropped fallback devices already listed as preferred");
        }
        self.matrix.insert(key, entry);
        self.rebuild();
    }

    /// Stop using device `name`: remove it from every entry and from the registry.
    ///
    /// Entries left with no devices stay in the matrix.
    /// Returns true if the device was known.
    pub fn disable_device(&mut self, name: &str) -> bool {
        let mut removed = false;
        for entry in self.matrix.values_mut() {
            removed |= entry.remove(name);
        }
        if removed {
            warn!("device {name} disabled");
            self.rebuild();
        } else {
            debug!("device {name} is not in the topology; nothing to disable");
        }
        removed
    }

    /// Swap in a whole new matrix.
    pub(crate) fn replace(&mut self, matrix: AffinityMatrix) {
        self.matrix = matrix;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let mut seen = HashSet::new();
        self.hca_list = self
            .matrix
            .values()
            .flat_map(AffinityEntry::candidates)
            .filter(|device| seen.insert(device.as_str()))
            .cloned()
            .collect();
        self.generation += 1;
    }
}
