// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Transfer device selection.
//!
//! The first attempt for a locality picks at random among its best devices to spread load.
//! Retries walk `preferred ++ avail` in order, indexed by the caller's attempt counter, so that
//! consecutive retries try every candidate once before any repeats.

use rand::Rng;
use tracing::trace;

use crate::errors::SelectError;
use crate::locality::WILDCARD_LOCATION;
use crate::matrix::Topology;

impl Topology {
    /// The two candidate tiers for `key`. Unknown keys and the wildcard use the whole registry.
    fn tiers(&self, key: &str) -> (&[String], &[String]) {
        if key != WILDCARD_LOCATION {
            if let Some(entry) = self.matrix.get(key) {
                return (&entry.preferred, &entry.avail);
            }
            trace!("no entry for locality {key}: considering every device");
        }
        (self.hca_list(), &[])
    }

    /// Pick the device to use for attempt number `retry` of a transfer from locality `key`, using
    /// the thread local random generator.
    ///
    /// Returns the index of the device in [`Topology::hca_list`].
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::NoDevice`] if the locality has no candidate device.
    pub fn select_device(&self, key: &str, retry: usize) -> Result<usize, SelectError> {
        self.select_device_with(key, retry, &mut rand::rng())
    }

    /// Same as [`Topology::select_device`], drawing from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::NoDevice`] if the locality has no candidate device.
    pub fn select_device_with<R: Rng>(
        &self,
        key: &str,
        retry: usize,
        rng: &mut R,
    ) -> Result<usize, SelectError> {
        let (preferred, avail) = self.tiers(key);
        let name = if retry == 0 {
            let tier = if preferred.is_empty() { avail } else { preferred };
            if tier.is_empty() {
                return Err(SelectError::NoDevice(key.to_string()));
            }
            &tier[rng.random_range(0..tier.len())]
        } else {
            let total = preferred.len() + avail.len();
            if total == 0 {
                return Err(SelectError::NoDevice(key.to_string()));
            }
            let position = (retry - 1) % total;
            match preferred.get(position) {
                Some(name) => name,
                None => &avail[position - preferred.len()],
            }
        };
        // every name in the matrix is in the registry
        self.hca_index(name)
            .ok_or_else(|| SelectError::NoDevice(key.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::errors::{ERR_DEVICE_NOT_FOUND, SelectError};
    use crate::locality::WILDCARD_LOCATION;
    use crate::matrix::{AffinityEntry, Topology};

    fn sized(preferred: usize, avail: usize) -> Topology {
        let mut topology = Topology::new();
        topology.insert_entry(
            "gpu:0",
            AffinityEntry::new(
                (0..preferred).map(|i| format!("p{i}")).collect(),
                (0..avail).map(|i| format!("a{i}")).collect(),
            ),
        );
        topology
    }

    #[test]
    fn first_attempt_stays_in_preferred() {
        let topology = sized(2, 3);
        let mut rng = StdRng::seed_from_u64(7);
        let picked: BTreeSet<usize> = (0..200)
            .map(|_| topology.select_device_with("gpu:0", 0, &mut rng).unwrap())
            .collect();
        assert_eq!(picked, BTreeSet::from([0, 1]));
    }

    #[test]
    fn first_attempt_falls_through_either_way() {
        let mut rng = StdRng::seed_from_u64(7);
        let only_avail = sized(0, 2);
        let picked: BTreeSet<usize> = (0..200)
            .map(|_| only_avail.select_device_with("gpu:0", 0, &mut rng).unwrap())
            .collect();
        assert_eq!(picked, BTreeSet::from([0, 1]));

        let only_preferred = sized(1, 0);
        assert_eq!(only_preferred.select_device("gpu:0", 0), Ok(0));
    }

    #[test]
    fn retries_walk_preferred_then_avail() {
        let topology = sized(2, 2);
        let walk: Vec<usize> = (1..=6)
            .map(|retry| topology.select_device("gpu:0", retry).unwrap())
            .collect();
        assert_eq!(walk, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn huge_retry_wraps() {
        let topology = sized(2, 1);
        assert_eq!(topology.select_device("gpu:0", usize::MAX), Ok((usize::MAX - 1) % 3));
    }

    #[test]
    fn unknown_and_wildcard_use_the_registry() {
        let mut topology = sized(1, 1);
        topology.insert_entry("gpu:1", AffinityEntry::new(vec!["p9".into()], vec![]));
        for key in [WILDCARD_LOCATION, "cpu:5", "bogus"] {
            let walk: Vec<usize> = (1..=3)
                .map(|retry| topology.select_device(key, retry).unwrap())
                .collect();
            assert_eq!(walk, vec![0, 1, 2], "walk for {key}");
            assert!(topology.select_device(key, 0).unwrap() < 3);
        }
    }

    #[test]
    fn nothing_to_select() {
        let empty = Topology::new();
        for retry in [0, 1, 5] {
            let err = empty.select_device("*", retry).unwrap_err();
            assert_eq!(err, SelectError::NoDevice("*".to_string()));
            assert_eq!(err.code(), ERR_DEVICE_NOT_FOUND);
        }
        let drained = sized(0, 0);
        assert!(drained.select_device("gpu:0", 0).is_err());
        assert!(drained.select_device("gpu:0", 3).is_err());
    }

    #[test]
    fn retries_visit_every_candidate_once() {
        bolero::check!()
            .with_type()
            .for_each(|(preferred, avail, start): &(u8, u8, u16)| {
                let (preferred, avail) = (usize::from(*preferred % 16), usize::from(*avail % 16));
                let total = preferred + avail;
                let topology = sized(preferred, avail);
                if total == 0 {
                    assert!(topology.select_device("gpu:0", 1).is_err());
                    return;
                }
                if preferred > 0 {
                    assert_eq!(topology.select_device("gpu:0", 1), Ok(0));
                }
                // any window of `total` consecutive retries is a full cycle
                let start = usize::from(*start) + 1;
                let visited: BTreeSet<usize> = (start..start + total)
                    .map(|retry| topology.select_device("gpu:0", retry).unwrap())
                    .collect();
                assert_eq!(visited, (0..total).collect());
            });
    }

    #[test]
    fn selection_is_always_in_range() {
        let topology = sized(3, 4);
        bolero::check!()
            .with_type()
            .for_each(|(retry, seed): &(usize, u64)| {
                let mut rng = StdRng::seed_from_u64(*seed);
                let index = topology
                    .select_device_with("gpu:0", *retry, &mut rng)
                    .unwrap();
                assert!(index < topology.hca_list().len());
                if *retry == 0 {
                    assert!(index < 3);
                }
            });
    }
}
