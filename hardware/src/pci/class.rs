// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI vendor IDs and class codes, as read from sysfs.
//!
//! Sysfs reports both as `0x` prefixed hexadecimal attributes (`vendor` and `class`).
//!
//! ```
//! # use transfer_hardware::pci::class::{ClassCode, VendorId};
//! let vendor = VendorId::parse_sysfs("0x10de").unwrap();
//! assert_eq!(vendor.value(), 0x10de);
//! let class = ClassCode::parse_sysfs("0x030200").unwrap();
//! assert_eq!(class.base(), 0x03);
//! assert_eq!(class.sub(), 0x02);
//! ```

/// A 16-bit PCI vendor identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct VendorId(u16);

/// The vendor `0xFFFF` is reserved and means "no device".
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("the vendor 0xFFFF is reserved as an invalid vendor ID")]
pub struct InvalidVendorId;

/// Errors parsing a hexadecimal sysfs attribute.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidSysfsHex {
    /// The attribute is not a hexadecimal number of the expected width.
    #[error("not a hexadecimal sysfs attribute: {0:?}")]
    Syntax(String),
    /// The attribute names the reserved vendor id.
    #[error(transparent)]
    ReservedVendor(#[from] InvalidVendorId),
}

fn parse_hex_attr(value: &str) -> Result<u32, InvalidSysfsHex> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).map_err(|_| InvalidSysfsHex::Syntax(value.to_string()))
}

impl VendorId {
    /// Creates a new vendor ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor ID is `0xFFFF`.
    pub const fn new(id: u16) -> Result<Self, InvalidVendorId> {
        if id == u16::MAX {
            Err(InvalidVendorId)
        } else {
            Ok(Self(id))
        }
    }

    /// Parse the contents of a sysfs `vendor` attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a 16-bit hex number or is the reserved vendor.
    pub fn parse_sysfs(value: &str) -> Result<Self, InvalidSysfsHex> {
        let id = u16::try_from(parse_hex_attr(value)?)
            .map_err(|_| InvalidSysfsHex::Syntax(value.to_string()))?;
        Ok(Self::new(id)?)
    }

    /// Returns the raw vendor ID value.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// A 24-bit PCI class code: base class, sub class, programming interface.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct ClassCode(u32);

impl ClassCode {
    /// Display controller (base class).
    pub const DISPLAY: u8 = 0x03;
    /// Processing accelerator (base class).
    pub const PROCESSING_ACCELERATOR: u8 = 0x12;

    /// Parse the contents of a sysfs `class` attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a hex number that fits in 24 bits.
    pub fn parse_sysfs(value: &str) -> Result<Self, InvalidSysfsHex> {
        let class = parse_hex_attr(value)?;
        if class > 0x00ff_ffff {
            return Err(InvalidSysfsHex::Syntax(value.to_string()));
        }
        Ok(Self(class))
    }

    /// The base class byte.
    #[must_use]
    pub fn base(self) -> u8 {
        self.0.to_be_bytes()[1]
    }

    /// The sub class byte.
    #[must_use]
    pub fn sub(self) -> u8 {
        self.0.to_be_bytes()[2]
    }
}
