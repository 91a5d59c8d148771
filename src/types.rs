// SPDX-License-Identifier: MIT

//! Integer newtypes for the values carried by HID items and stored in
//! each [Field](crate::Field). Section numbers refer to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).

/// `From` conversions in both directions between a newtype and its
/// integer, e.g. `impl_from!(ReportSize, ReportSize, u32)`.
macro_rules! impl_from {
    ($tipo:ty, $tipo_expr:expr, $to:ty) => {
        impl From<$tipo> for $to {
            fn from(f: $tipo) -> $to {
                f.0
            }
        }
        impl From<&$tipo> for $to {
            fn from(f: &$tipo) -> $to {
                f.0
            }
        }
        impl From<$to> for $tipo {
            fn from(f: $to) -> Self {
                $tipo_expr(f)
            }
        }
    };
}

/// `Display` as the bare integer.
macro_rules! impl_fmt {
    ($tipo:ty, $to:ty) => {
        impl std::fmt::Display for $tipo {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let v: $to = self.into();
                write!(f, "{v}")
            }
        }
    };
}

// ---------- GLOBAL ITEMS ---------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UsagePage(pub u16);

impl_from!(UsagePage, UsagePage, u16);
impl_fmt!(UsagePage, u16);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalMinimum(pub i32);

impl_from!(LogicalMinimum, LogicalMinimum, i32);
impl_fmt!(LogicalMinimum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogicalMaximum(pub i32);

impl_from!(LogicalMaximum, LogicalMaximum, i32);
impl_fmt!(LogicalMaximum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysicalMinimum(pub i32);

impl_from!(PhysicalMinimum, PhysicalMinimum, i32);
impl_fmt!(PhysicalMinimum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhysicalMaximum(pub i32);

impl_from!(PhysicalMaximum, PhysicalMaximum, i32);
impl_fmt!(PhysicalMaximum, i32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unit(pub u32);

impl_from!(Unit, Unit, u32);
impl_fmt!(Unit, u32);

/// The unit exponent, already sign-extended. Devices frequently encode
/// this as a 4-bit two's complement nibble, see [`crate::hid::snto32`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitExponent(pub i32);

impl_from!(UnitExponent, UnitExponent, i32);
impl_fmt!(UnitExponent, i32);

/// Size of a single report element in bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSize(pub u32);

impl_from!(ReportSize, ReportSize, u32);
impl_fmt!(ReportSize, u32);

/// A report ID. ID 0 is reserved by Section 6.2.2.7 and is used by this
/// crate to denote the unnumbered report of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReportId(pub u8);

impl ReportId {
    /// True if this is a real report ID, i.e. the report is
    /// prefixed with its ID byte on the wire.
    pub fn is_numbered(&self) -> bool {
        self.0 != 0
    }
}

impl_from!(ReportId, ReportId, u8);
impl_fmt!(ReportId, u8);

/// Number of elements in a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCount(pub u32);

impl_from!(ReportCount, ReportCount, u32);
impl_fmt!(ReportCount, u32);

// ----------------- LOCAL ITEMS --------------------

/// A full 32-bit HID usage: the upper 16 bits are the [UsagePage],
/// the lower 16 bits the usage ID within that page.
///
/// A usage of 0 means "unknown" or "none", e.g. the usage of a
/// collection that was opened without a preceding Usage item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Usage(pub u32);

impl Usage {
    pub const NONE: Usage = Usage(0);

    /// Combines a usage page with a 16-bit usage ID.
    pub fn new(page: UsagePage, id: u16) -> Self {
        Usage((u32::from(page.0) << 16) | u32::from(id))
    }

    pub fn usage_page(&self) -> UsagePage {
        UsagePage((self.0 >> 16) as u16)
    }

    pub fn usage_id(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl_from!(Usage, Usage, u32);

impl std::fmt::Display for Usage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.usage_page().0, self.usage_id())
    }
}

#[cfg(feature = "hut")]
impl From<&hut::Usage> for Usage {
    fn from(usage: &hut::Usage) -> Usage {
        use hut::AsUsage;
        Usage(usage.usage_value())
    }
}

#[cfg(feature = "hut")]
impl From<hut::Usage> for Usage {
    fn from(usage: hut::Usage) -> Usage {
        Usage::from(&usage)
    }
}

#[cfg(feature = "hut")]
impl From<&hut::UsagePage> for UsagePage {
    fn from(page: &hut::UsagePage) -> UsagePage {
        use hut::AsUsagePage;
        UsagePage(page.usage_page_value())
    }
}

#[cfg(feature = "hut")]
impl From<hut::UsagePage> for UsagePage {
    fn from(page: hut::UsagePage) -> UsagePage {
        UsagePage::from(&page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_split() {
        let usage = Usage::new(UsagePage(0x01), 0x30);
        assert_eq!(u32::from(usage), 0x0001_0030);
        assert_eq!(usage.usage_page(), UsagePage(0x01));
        assert_eq!(usage.usage_id(), 0x30);
        assert_eq!(format!("{usage}"), "0001:0030");
        assert!(Usage::NONE.is_none());
    }

    #[test]
    fn report_id_numbered() {
        assert!(!ReportId(0).is_numbered());
        assert!(ReportId::from(3u8).is_numbered());
        assert_eq!(format!("{}", ReportId(7)), "7");
    }

    #[cfg(feature = "hut")]
    #[test]
    fn hut_conversion() {
        use hut::AsUsage;

        let x = Usage::from(hut::GenericDesktop::X.usage());
        assert_eq!(x, Usage(0x0001_0030));
        let page = UsagePage::from(hut::UsagePage::GenericDesktop);
        assert_eq!(page, UsagePage(0x01));
    }
}
