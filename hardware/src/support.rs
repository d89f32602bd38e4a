// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tools for identifying accelerators among PCI devices.

use crate::pci::class::{ClassCode, VendorId};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum AcceleratorVendor {
    Nvidia,
    Amd,
    Intel,
    Huawei,
}

impl AcceleratorVendor {
    #[must_use]
    pub const fn vendor_id(&self) -> VendorId {
        let result = match self {
            AcceleratorVendor::Nvidia => VendorId::new(0x10de),
            AcceleratorVendor::Amd => VendorId::new(0x1002),
            AcceleratorVendor::Intel => VendorId::new(0x8086),
            AcceleratorVendor::Huawei => VendorId::new(0x19e5),
        };
        match result {
            Ok(ret) => ret,
            Err(_) => unreachable!(),
        }
    }

    /// Look up the accelerator vendor for a PCI vendor id.
    #[must_use]
    pub fn from_vendor_id(id: VendorId) -> Option<Self> {
        use strum::IntoEnumIterator;
        AcceleratorVendor::iter().find(|vendor| vendor.vendor_id() == id)
    }

    /// Returns true if a device of this vendor with the given class is a compute accelerator.
    ///
    /// Intel and AMD ship plenty of ordinary VGA controllers, so for them only the display
    /// sub-classes used by compute parts count.
    #[must_use]
    pub fn is_accelerator_class(&self, class: ClassCode) -> bool {
        match class.base() {
            ClassCode::PROCESSING_ACCELERATOR => true,
            // 0x0302 is a "3D controller" and 0x0380 "other display controller": datacenter
            // GPUs with no display outputs (Instinct, Data Center GPU Max) use either
            ClassCode::DISPLAY => match self {
                AcceleratorVendor::Nvidia => true,
                AcceleratorVendor::Amd | AcceleratorVendor::Intel => {
                    matches!(class.sub(), 0x02 | 0x80)
                }
                AcceleratorVendor::Huawei => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use crate::pci::class::{ClassCode, VendorId};
    use crate::support::AcceleratorVendor;

    fn class(value: &str) -> ClassCode {
        ClassCode::parse_sysfs(value).unwrap()
    }

    #[test]
    fn vendor_lookup() {
        let nvidia = VendorId::parse_sysfs("0x10de").unwrap();
        assert_eq!(
            AcceleratorVendor::from_vendor_id(nvidia),
            Some(AcceleratorVendor::Nvidia)
        );
        let mellanox = VendorId::parse_sysfs("0x15b3").unwrap();
        assert_eq!(AcceleratorVendor::from_vendor_id(mellanox), None);
    }

    #[test]
    fn accelerator_classes() {
        assert!(AcceleratorVendor::Nvidia.is_accelerator_class(class("0x030200")));
        assert!(AcceleratorVendor::Nvidia.is_accelerator_class(class("0x030000")));
        assert!(AcceleratorVendor::Amd.is_accelerator_class(class("0x030200")));
        assert!(!AcceleratorVendor::Intel.is_accelerator_class(class("0x030000")));
        assert!(!AcceleratorVendor::Amd.is_accelerator_class(class("0x030000")));
        assert!(!AcceleratorVendor::Huawei.is_accelerator_class(class("0x030200")));
    }

    #[test]
    fn datacenter_gpus_without_display_outputs() {
        // Instinct MI200/MI300 and Data Center GPU Max report "other display controller"
        assert!(AcceleratorVendor::Amd.is_accelerator_class(class("0x038000")));
        assert!(AcceleratorVendor::Intel.is_accelerator_class(class("0x038000")));
        assert!(AcceleratorVendor::Intel.is_accelerator_class(class("0x030200")));
        // other display sub-classes stay out
        assert!(!AcceleratorVendor::Amd.is_accelerator_class(class("0x030100")));
        assert!(AcceleratorVendor::Huawei.is_accelerator_class(class("0x120000")));
        // a network controller is never an accelerator
        assert!(!AcceleratorVendor::Nvidia.is_accelerator_class(class("0x020700")));
    }

    #[test]
    fn names() {
        assert_eq!(AcceleratorVendor::Nvidia.to_string(), "nvidia");
        assert_eq!("amd".parse::<AcceleratorVendor>().unwrap(), AcceleratorVendor::Amd);
    }
}
