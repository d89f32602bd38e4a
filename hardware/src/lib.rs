// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Hardware locality for transfer device selection.
//!
//! This crate answers low level questions about the host: which RDMA capable adapters (HCAs),
//! accelerators, and CPU NUMA nodes exist, where they sit in the PCIe tree, and which of them
//! are close to each other.
//! It holds no opinion about which device a transfer should use; that lives in the topology crate.

#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod inventory;
pub mod numa;
pub mod pci;
pub mod support;
