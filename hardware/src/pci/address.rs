// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI device addressing.
//!
//! PCI addresses use the extended BDF (Bus Device Function) format, also known as EBDF:
//! `domain:bus:device.function` (e.g., `0000:17:00.0`).
//! This is the form used for directory names under `/sys/bus/pci/devices`.
//!
//! # Examples
//!
//! ```
//! use transfer_hardware::pci::address::PciAddress;
//!
//! let addr = PciAddress::try_from("0000:17:00.1").unwrap();
//! assert_eq!(addr.bus, 0x17);
//! assert_eq!(addr.function, 1);
//! assert_eq!(addr.to_string(), "0000:17:00.1");
//! ```

/// A PCI device address.
///
/// Ordering follows the numeric `domain`, `bus`, `device`, `function` order, which is also the
/// order the kernel enumerates devices in.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct PciAddress {
    /// PCI domain (segment) number.
    pub domain: u16,
    /// PCI bus number.
    pub bus: u8,
    /// Device number on the bus (5 bits).
    pub device: u8,
    /// Function number within the device (3 bits).
    pub function: u8,
}

impl PciAddress {
    /// Maximum valid device number (31, or 0x1F).
    pub const MAX_DEVICE: u8 = 0b1_1111;
    /// Maximum valid function number (7, or 0b111).
    pub const MAX_FUNCTION: u8 = 0b111;

    /// Creates a new PCI address from its components.
    ///
    /// # Errors
    ///
    /// Returns an error if `device` or `function` is out of range.
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        if device > Self::MAX_DEVICE {
            return Err(InvalidPciAddress::DeviceTooLarge(device));
        }
        if function > Self::MAX_FUNCTION {
            return Err(InvalidPciAddress::FunctionTooLarge(function));
        }
        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }
}

impl std::fmt::Display for PciAddress {
    /// Formats the PCI address in the lowercase EBDF format used by sysfs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:01x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

/// Errors that can occur when parsing a PCI address.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidPciAddress {
    /// Invalid address syntax.
    #[error("Invalid PCI address syntax (should be domain:bus:device.function): {0}")]
    Syntax(String),
    /// Device number exceeds the 5-bit maximum.
    #[error("PCI device maximum is 5 bits: {0} is too large")]
    DeviceTooLarge(u8),
    /// Function number exceeds the 3-bit maximum.
    #[error("PCI function maximum is 3 bits (0-7): {0} is too large")]
    FunctionTooLarge(u8),
}

fn hex_field<T>(
    field: &str,
    width: usize,
    whole: &str,
    parse: fn(&str, u32) -> Result<T, std::num::ParseIntError>,
) -> Result<T, InvalidPciAddress> {
    if field.len() != width || !field.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InvalidPciAddress::Syntax(whole.to_string()));
    }
    parse(field, 16).map_err(|_| InvalidPciAddress::Syntax(whole.to_string()))
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    /// Parses a PCI address from a string.
    ///
    /// The string must be in the format `DDDD:BB:DD.F` where each letter represents a hexadecimal
    /// digit.
    /// Upper case digits are accepted (some vendor libraries report bus ids that way) but the
    /// address always displays in lower case.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is wrong or any component is out of range.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut parts = value.split(':');
        let (Some(domain), Some(bus), Some(slot), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidPciAddress::Syntax(value.to_string()));
        };
        let Some((device, function)) = slot.split_once('.') else {
            return Err(InvalidPciAddress::Syntax(value.to_string()));
        };
        PciAddress::new(
            hex_field(domain, 4, value, u16::from_str_radix)?,
            hex_field(bus, 2, value, u8::from_str_radix)?,
            hex_field(device, 2, value, u8::from_str_radix)?,
            hex_field(function, 1, value, u8::from_str_radix)?,
        )
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl std::str::FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl From<PciAddress> for String {
    fn from(value: PciAddress) -> String {
        value.to_string()
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use bolero::{Driver, TypeGenerator};

    use crate::pci::address::PciAddress;

    impl TypeGenerator for PciAddress {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            PciAddress::new(
                driver.produce()?,
                driver.produce()?,
                driver.produce::<u8>()? & PciAddress::MAX_DEVICE,
                driver.produce::<u8>()? & PciAddress::MAX_FUNCTION,
            )
            .ok()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::pci::address::{InvalidPciAddress, PciAddress};

    #[test]
    fn parse_sysfs_style() {
        let addr = PciAddress::try_from("0000:17:00.0").unwrap();
        assert_eq!(addr, PciAddress::new(0, 0x17, 0, 0).unwrap());
        assert_eq!(addr.to_string(), "0000:17:00.0");
    }

    #[test]
    fn parse_upper_case_normalizes() {
        let addr = PciAddress::try_from("0000:B1:1F.7").unwrap();
        assert_eq!(addr.to_string(), "0000:b1:1f.7");
    }

    #[test]
    fn reject_bad_shapes() {
        for bad in [
            "",
            "invalid_bus_id",
            "xyz:abc:def",
            "123:456:789",
            "0000:17:00",
            "0000:17:00.0.1",
            "0:17:00.0",
            "0000:17:00.0:1",
            "0000:1g:00.0",
        ] {
            assert!(
                matches!(PciAddress::try_from(bad), Err(InvalidPciAddress::Syntax(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn reject_out_of_range() {
        assert_eq!(
            PciAddress::try_from("0000:00:20.0"),
            Err(InvalidPciAddress::DeviceTooLarge(0x20))
        );
        assert_eq!(
            PciAddress::try_from("0000:00:00.8"),
            Err(InvalidPciAddress::FunctionTooLarge(8))
        );
    }

    #[test]
    fn ordering_is_bus_order() {
        let mut addrs: Vec<PciAddress> = ["0000:b1:00.0", "0000:17:00.1", "0001:00:00.0", "0000:17:00.0"]
            .into_iter()
            .map(|s| s.parse().unwrap())
            .collect();
        addrs.sort();
        let sorted: Vec<String> = addrs.into_iter().map(String::from).collect();
        assert_eq!(
            sorted,
            ["0000:17:00.0", "0000:17:00.1", "0000:b1:00.0", "0001:00:00.0"]
        );
    }

    #[test]
    fn display_parses_back() {
        bolero::check!().with_type().for_each(|addr: &PciAddress| {
            let parsed = PciAddress::try_from(addr.to_string()).unwrap();
            assert_eq!(&parsed, addr);
        });
    }

    #[test]
    fn serde_uses_string_form() {
        let addr = PciAddress::try_from("0000:85:00.0").unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0000:85:00.0\"");
        let back: PciAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
