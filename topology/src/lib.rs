// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Device topology for bulk transfers.
//!
//! A [`Topology`] maps each compute locality (`cpu:<N>` for a NUMA node, `gpu:<N>` for an
//! accelerator) to the HCAs it should use, split into a `preferred` and a fallback (`avail`) tier.
//! It is filled by [`Topology::discover`] or [`Topology::parse`], persisted with
//! [`Topology::to_json`], and queried on every transfer attempt with [`Topology::select_device`].
//!
//! ```
//! # use transfer_topology::Topology;
//! let mut topology = Topology::new();
//! topology.parse(r#"{"gpu:0":[["mlx5_0","mlx5_1"],["mlx5_2"]]}"#).unwrap();
//! let first = topology.select_device("gpu:0", 0).unwrap();
//! assert!(first < 2);
//! // retries walk every candidate, preferred first
//! assert_eq!(topology.select_device("gpu:0", 3), Ok(2));
//! topology.disable_device("mlx5_0");
//! assert_eq!(topology.hca_list(), ["mlx5_1", "mlx5_2"]);
//! ```

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod discover;
pub mod errors;
pub mod locality;
pub mod matrix;
mod select;
mod wire;

pub use discover::{DiscoveryConfig, DiscoveryConfigBuilder};
pub use errors::{SelectError, TopologyError, TopologyResult};
pub use locality::{Locality, WILDCARD_LOCATION};
pub use matrix::{AffinityEntry, AffinityMatrix, Topology};
