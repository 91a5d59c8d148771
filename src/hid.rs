// SPDX-License-Identifier: MIT

//! Item level access to a report descriptor. [fetch_item] reads one
//! [Item] at a given offset and [ReportDescriptorItems] walks a whole
//! descriptor. Items carry no parser state, [Item::item_type] gives the
//! typed view the parser dispatches on.
//!
//! Section numbers refer to the
//! [HID Device Class Definition for HID 1.11](https://www.usb.org/document-library/device-class-definition-hid-111).
//!
//! # Itemizing HID Report Descriptors
//!
//! ```
//! # use hidhost::hid::*;
//! #[rustfmt::skip]
//! let bytes = [
//!     0x05, 0x01,        // Usage Page (Generic Desktop)
//!     0x09, 0x02,        // Usage (Mouse)
//!     0xa1, 0x01,        // Collection (Application)
//!     0xc0,              // End Collection
//! ];
//! for item in ReportDescriptorItems::from(&bytes[..]) {
//!     let item = item.unwrap();
//!     match item.item_type() {
//!         ItemType::Main(MainItem::Collection(c)) => println!("{c:?} at {}", item.offset()),
//!         _ => {}
//!     }
//! }
//! ```

use thiserror::Error;

/// The tag that turns a short item header into a long item
/// header (Section 6.2.2.3), `0xfe` for a well-formed long item.
pub const ITEM_TAG_LONG: u8 = 0x0f;

const ITEM_TYPE_MAIN: u8 = 0;
const ITEM_TYPE_GLOBAL: u8 = 1;
const ITEM_TYPE_LOCAL: u8 = 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HidError {
    #[error("Insufficient data at offset {offset}: need {needed} bytes, {available} available")]
    InsufficientData {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

type Result<T> = std::result::Result<T, HidError>;

/// Convert a signed n-bit integer to a signed 32-bit integer.
///
/// Widths of 8, 16 and 32 bits map directly onto the native types,
/// anything else is sign-extended by hand from bit `n - 1`.
pub fn snto32(value: u32, n: u32) -> i32 {
    match n {
        0 => 0,
        8 => value as u8 as i8 as i32,
        16 => value as u16 as i16 as i32,
        32.. => value as i32,
        n => {
            if value & (1 << (n - 1)) != 0 {
                (value | (u32::MAX << n)) as i32
            } else {
                value as i32
            }
        }
    }
}

/// Represents one value extracted from the 0, 1, 2 or 4 (LE) data bytes
/// of a short item. Whether the value is signed depends on the parser
/// state, so both interpretations are available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HidValue {
    value: u32,
    nbytes: usize,
}

impl HidValue {
    /// The length of the value in bytes, required to
    /// determine if the actual value may be signed
    pub fn len(&self) -> usize {
        self.nbytes
    }

    pub fn is_empty(&self) -> bool {
        self.nbytes == 0
    }

    /// The value as unsigned integer of the item's width. Any width
    /// other than 1, 2 or 4 bytes yields 0.
    pub fn udata(&self) -> u32 {
        match self.nbytes {
            1 | 2 | 4 => self.value,
            _ => 0,
        }
    }

    /// The value as signed integer of the item's width. Any width
    /// other than 1, 2 or 4 bytes yields 0.
    pub fn sdata(&self) -> i32 {
        match self.nbytes {
            1 => snto32(self.value, 8),
            2 => snto32(self.value, 16),
            4 => snto32(self.value, 32),
            _ => 0,
        }
    }
}

impl From<&[u8]> for HidValue {
    fn from(bytes: &[u8]) -> HidValue {
        let value = match bytes {
            [b0] => u32::from(*b0),
            [b0, b1] => u32::from(u16::from_le_bytes([*b0, *b1])),
            [b0, b1, b2, b3] => u32::from_le_bytes([*b0, *b1, *b2, *b3]),
            _ => 0,
        };
        HidValue {
            value,
            nbytes: bytes.len(),
        }
    }
}

/// Short items carry 0, 1, 2 or 4 data bytes (Section 6.2.2.2), long
/// items up to 255 (Section 6.2.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFormat {
    Short,
    Long,
}

/// A single item as fetched from a report descriptor. The data bytes
/// are borrowed from the descriptor, never copied.
#[derive(Debug, Clone, Copy)]
pub struct Item<'a> {
    offset: usize,
    header: u8,
    format: ItemFormat,
    itype: u8,
    tag: u8,
    data: &'a [u8],
}

impl<'a> Item<'a> {
    /// The offset of this item in the report descriptor it was fetched from.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The header byte. For long items this is `0xfe`.
    pub fn header(&self) -> u8 {
        self.header
    }

    pub fn format(&self) -> ItemFormat {
        self.format
    }

    /// The tag of this item. For short items these are the upper 4 bits of
    /// the header byte shifted down, for long items the 8-bit long item tag.
    pub fn tag(&self) -> u8 {
        self.tag
    }

    /// The logical size of the data in bytes. A size class of 3 in the
    /// header byte is reported as 4.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes this item occupies in the descriptor,
    /// inclusive of its header.
    pub fn encoded_len(&self) -> usize {
        match self.format {
            ItemFormat::Short => 1 + self.data.len(),
            ItemFormat::Long => 3 + self.data.len(),
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn value(&self) -> HidValue {
        HidValue::from(self.data)
    }

    pub fn udata(&self) -> u32 {
        self.value().udata()
    }

    pub fn sdata(&self) -> i32 {
        self.value().sdata()
    }

    /// Interprets this item according to its type and tag.
    pub fn item_type(&self) -> ItemType {
        if self.format == ItemFormat::Long {
            return ItemType::Long { tag: self.tag };
        }
        let value = self.value();
        match self.itype {
            ITEM_TYPE_MAIN => ItemType::Main(MainItem::from_tag(self.tag, value)),
            ITEM_TYPE_GLOBAL => ItemType::Global(GlobalItem::from_tag(self.tag, value)),
            ITEM_TYPE_LOCAL => ItemType::Local(LocalItem::from_tag(self.tag, value)),
            _ => ItemType::Reserved { tag: self.tag },
        }
    }
}

/// Fetch the item starting at `offset`.
///
/// Returns `Ok(None)` once `offset` reaches the end of `bytes`. The only
/// error is an item whose declared length exceeds the remaining bytes.
pub fn fetch_item(bytes: &[u8], offset: usize) -> Result<Option<Item<'_>>> {
    let Some(&header) = bytes.get(offset) else {
        return Ok(None);
    };
    let rest = &bytes[offset + 1..];
    let itype = (header >> 2) & 0b11;
    let tag = (header >> 4) & 0b1111;

    if tag == ITEM_TAG_LONG {
        ensure!(
            rest.len() >= 2,
            HidError::InsufficientData {
                offset,
                needed: 3,
                available: rest.len() + 1,
            }
        );
        let size = rest[0] as usize;
        let tag = rest[1];
        ensure!(
            rest.len() - 2 >= size,
            HidError::InsufficientData {
                offset,
                needed: size + 3,
                available: rest.len() + 1,
            }
        );
        return Ok(Some(Item {
            offset,
            header,
            format: ItemFormat::Long,
            itype,
            tag,
            data: &rest[2..2 + size],
        }));
    }

    let size = match header & 0b11 {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    };
    ensure!(
        rest.len() >= size,
        HidError::InsufficientData {
            offset,
            needed: size + 1,
            available: rest.len() + 1,
        }
    );
    Ok(Some(Item {
        offset,
        header,
        format: ItemFormat::Short,
        itype,
        tag,
        data: &rest[..size],
    }))
}

/// Iterator over the items of a report descriptor. Iteration stops after
/// the first error.
#[derive(Debug, Clone)]
pub struct ReportDescriptorItems<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> ReportDescriptorItems<'a> {
    /// The offset of the next item to be fetched.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> From<&'a [u8]> for ReportDescriptorItems<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ReportDescriptorItems {
            bytes,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for ReportDescriptorItems<'a> {
    type Item = Result<Item<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match fetch_item(self.bytes, self.offset) {
            Ok(Some(item)) => {
                self.offset += item.encoded_len();
                Some(Ok(item))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// The type of a HID item may be one of [MainItem], [GlobalItem], or [LocalItem].
///
/// [ItemType::Long] and [ItemType::Reserved] are placeholders; no long item
/// tags are defined by the HID specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Main(MainItem),
    Global(GlobalItem),
    Local(LocalItem),
    Long { tag: u8 },
    Reserved { tag: u8 },
}

bitflags::bitflags! {
    /// Input, Output and Feature item data flags (Section 6.2.2.5).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct MainFlags: u32 {
        /// Constant rather than data, typically padding.
        const CONSTANT = 1 << 0;
        /// One value per usage rather than an array of usage indices.
        const VARIABLE = 1 << 1;
        /// Values are relative to the previous report.
        const RELATIVE = 1 << 2;
        const WRAP = 1 << 3;
        const NONLINEAR = 1 << 4;
        const NO_PREFERRED = 1 << 5;
        const NULL_STATE = 1 << 6;
        /// Output and Feature only, reserved for Input.
        const VOLATILE = 1 << 7;
        const BUFFERED_BYTES = 1 << 8;
    }
}

impl MainFlags {
    pub fn is_variable(&self) -> bool {
        self.contains(MainFlags::VARIABLE)
    }

    pub fn is_array(&self) -> bool {
        !self.is_variable()
    }

    pub fn is_constant(&self) -> bool {
        self.contains(MainFlags::CONSTANT)
    }

    pub fn is_relative(&self) -> bool {
        self.contains(MainFlags::RELATIVE)
    }
}

/// Main Items, see Section 6.2.2.4
///
/// > Main items are used to either define or group certain types of data fields within a
/// > Report descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainItem {
    Input(MainFlags),
    Output(MainFlags),
    Feature(MainFlags),
    Collection(CollectionType),
    EndCollection,
    Reserved { tag: u8 },
}

impl MainItem {
    fn from_tag(tag: u8, value: HidValue) -> MainItem {
        let data = value.udata();
        match tag {
            0x8 => MainItem::Input(MainFlags::from_bits_retain(data)),
            0x9 => MainItem::Output(MainFlags::from_bits_retain(data)),
            0xa => MainItem::Collection(CollectionType::from((data & 0xff) as u8)),
            0xb => MainItem::Feature(MainFlags::from_bits_retain(data)),
            0xc => MainItem::EndCollection,
            tag => MainItem::Reserved { tag },
        }
    }
}

/// See Section 6.2.2.6. A collection groups several items together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectionType {
    #[default]
    Physical,
    Application,
    Logical,
    Report,
    NamedArray,
    UsageSwitch,
    UsageModifier,
    Reserved {
        value: u8,
    },
    VendorDefined {
        value: u8,
    },
}

impl From<u8> for CollectionType {
    fn from(v: u8) -> CollectionType {
        match v {
            0x00 => CollectionType::Physical,
            0x01 => CollectionType::Application,
            0x02 => CollectionType::Logical,
            0x03 => CollectionType::Report,
            0x04 => CollectionType::NamedArray,
            0x05 => CollectionType::UsageSwitch,
            0x06 => CollectionType::UsageModifier,
            value @ 0x07..=0x7f => CollectionType::Reserved { value },
            value @ 0x80..=0xff => CollectionType::VendorDefined { value },
        }
    }
}

impl From<CollectionType> for u8 {
    fn from(c: CollectionType) -> u8 {
        match c {
            CollectionType::Physical => 0x00,
            CollectionType::Application => 0x01,
            CollectionType::Logical => 0x02,
            CollectionType::Report => 0x03,
            CollectionType::NamedArray => 0x04,
            CollectionType::UsageSwitch => 0x05,
            CollectionType::UsageModifier => 0x06,
            CollectionType::Reserved { value } => value,
            CollectionType::VendorDefined { value } => value,
        }
    }
}

/// See Section 6.2.2.7, a global item applies to all subsequently identified items.
///
/// The values are kept raw: whether e.g. a Logical Maximum is signed
/// depends on the Logical Minimum seen before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalItem {
    UsagePage(HidValue),
    LogicalMinimum(HidValue),
    LogicalMaximum(HidValue),
    PhysicalMinimum(HidValue),
    PhysicalMaximum(HidValue),
    UnitExponent(HidValue),
    Unit(HidValue),
    ReportSize(HidValue),
    ReportId(HidValue),
    ReportCount(HidValue),
    Push,
    Pop,
    Reserved { tag: u8 },
}

impl GlobalItem {
    fn from_tag(tag: u8, value: HidValue) -> GlobalItem {
        match tag {
            0x0 => GlobalItem::UsagePage(value),
            0x1 => GlobalItem::LogicalMinimum(value),
            0x2 => GlobalItem::LogicalMaximum(value),
            0x3 => GlobalItem::PhysicalMinimum(value),
            0x4 => GlobalItem::PhysicalMaximum(value),
            0x5 => GlobalItem::UnitExponent(value),
            0x6 => GlobalItem::Unit(value),
            0x7 => GlobalItem::ReportSize(value),
            0x8 => GlobalItem::ReportId(value),
            0x9 => GlobalItem::ReportCount(value),
            0xa => GlobalItem::Push,
            0xb => GlobalItem::Pop,
            tag => GlobalItem::Reserved { tag },
        }
    }
}

/// See Section 6.2.2.8, a local item applies to the current [MainItem] only.
///
/// A Usage with 1 or 2 data bytes is a usage ID within the current
/// usage page, with 4 data bytes it carries its own usage page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalItem {
    Usage(HidValue),
    UsageMinimum(HidValue),
    UsageMaximum(HidValue),
    DesignatorIndex(HidValue),
    DesignatorMinimum(HidValue),
    DesignatorMaximum(HidValue),
    StringIndex(HidValue),
    StringMinimum(HidValue),
    StringMaximum(HidValue),
    Delimiter(HidValue),
    Reserved { tag: u8 },
}

impl LocalItem {
    fn from_tag(tag: u8, value: HidValue) -> LocalItem {
        match tag {
            0x0 => LocalItem::Usage(value),
            0x1 => LocalItem::UsageMinimum(value),
            0x2 => LocalItem::UsageMaximum(value),
            0x3 => LocalItem::DesignatorIndex(value),
            0x4 => LocalItem::DesignatorMinimum(value),
            0x5 => LocalItem::DesignatorMaximum(value),
            0x7 => LocalItem::StringIndex(value),
            0x8 => LocalItem::StringMinimum(value),
            0x9 => LocalItem::StringMaximum(value),
            0xa => LocalItem::Delimiter(value),
            tag => LocalItem::Reserved { tag },
        }
    }
}
