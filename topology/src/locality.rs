// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Locality keys: the compute resources device affinity is computed for.
//!
//! Keys travel as plain strings (`cpu:0`, `gpu:3`, `*`) because that is what the wire format and
//! the transfer runtime use.
//! [`Locality`] is the typed view of the keys this crate produces itself.

use std::str::FromStr;

use hardware::numa::NumaNodeId;

/// The key meaning "no specific affinity, consider every device".
pub const WILDCARD_LOCATION: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum LocalityKind {
    Cpu,
    Gpu,
}

/// A compute locality.
///
/// ```
/// # use transfer_topology::locality::Locality;
/// # use hardware::numa::NumaNodeId;
/// let key: Locality = "gpu:2".parse().unwrap();
/// assert_eq!(key, Locality::Gpu(2));
/// assert_eq!(Locality::Cpu(NumaNodeId::new(1)).to_string(), "cpu:1");
/// assert_eq!("*".parse::<Locality>().unwrap(), Locality::Wildcard);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Locality {
    /// A NUMA node with CPUs attached.
    Cpu(NumaNodeId),
    /// An accelerator, by ordinal.
    Gpu(u32),
    /// Any device at all.
    Wildcard,
}

impl std::fmt::Display for Locality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locality::Cpu(node) => write!(f, "{}:{node}", LocalityKind::Cpu),
            Locality::Gpu(ordinal) => write!(f, "{}:{ordinal}", LocalityKind::Gpu),
            Locality::Wildcard => f.write_str(WILDCARD_LOCATION),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid locality '{0}' (expected cpu:<N>, gpu:<N>, or {WILDCARD_LOCATION})")]
pub struct InvalidLocality(String);

impl FromStr for Locality {
    type Err = InvalidLocality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == WILDCARD_LOCATION {
            return Ok(Locality::Wildcard);
        }
        let invalid = || InvalidLocality(s.to_string());
        let (kind, index) = s.split_once(':').ok_or_else(invalid)?;
        if index.is_empty() || !index.bytes().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        match LocalityKind::from_str(kind).map_err(|_| invalid())? {
            LocalityKind::Cpu => Ok(Locality::Cpu(NumaNodeId::new(
                index.parse().map_err(|_| invalid())?,
            ))),
            LocalityKind::Gpu => Ok(Locality::Gpu(index.parse().map_err(|_| invalid())?)),
        }
    }
}

impl From<Locality> for String {
    fn from(value: Locality) -> Self {
        value.to_string()
    }
}
