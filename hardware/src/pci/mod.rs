// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI addressing and PCIe locality.

/// PCI device addresses (`domain:bus:device.function`).
pub mod address;
/// Vendor ids and class codes.
pub mod class;
/// Text algorithms over resolved sysfs device paths.
pub mod path;
/// Bus id resolution and PCIe relationship queries.
pub mod resolve;
