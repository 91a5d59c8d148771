// SPDX-License-Identifier: MIT

//! A HID Report Descriptor parser and differential HID Report decoder
//! for USB hosts.
//!
//! A [Device] parses the report descriptor handed to it by the transport
//! into a static object graph of collections, reports and fields. Every
//! entity lives in a fixed-capacity pool reserved when the device is
//! created, see [Limits]. Raw input reports are then decoded against that
//! graph and every usage whose value changed is passed to an
//! [EventSink](input::EventSink).
//!
//! ```
//! use hidhost::{DeviceSlot, Limits, ReportType};
//! use hidhost::input::EventSink;
//! use hidhost::{Field, FieldUsage};
//!
//! struct Printer;
//!
//! impl EventSink for Printer {
//!     fn event(&mut self, _field: &Field, usage: &FieldUsage, value: i32) {
//!         println!("{} -> {value}", usage.hid);
//!     }
//! }
//!
//! static HID_DEVICE: DeviceSlot = DeviceSlot::new();
//!
//! #[rustfmt::skip]
//! let rdesc = [
//!     0x05, 0x01,        // Usage Page (Generic Desktop)
//!     0x09, 0x02,        // Usage (Mouse)
//!     0xa1, 0x01,        // Collection (Application)
//!     0x09, 0x30,        //   Usage (X)
//!     0x15, 0x81,        //   Logical Minimum (-127)
//!     0x25, 0x7f,        //   Logical Maximum (127)
//!     0x75, 0x08,        //   Report Size (8)
//!     0x95, 0x01,        //   Report Count (1)
//!     0x81, 0x06,        //   Input (Data,Var,Rel)
//!     0xc0,              // End Collection
//! ];
//!
//! let mut device = HID_DEVICE.request(Limits::default()).unwrap();
//! device.set_descriptor(&rdesc).unwrap();
//! device.open().unwrap();
//! device.decode_report(ReportType::Input, &[0xfe], &mut Printer).unwrap();
//! ```

use thiserror::Error;

/// Return early with the given error if the condition does not hold.
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

pub mod device;
pub mod hid;
pub mod input;
mod parser;
pub mod pool;
pub mod types;

pub use device::{Device, DeviceHandle, DeviceSlot};
use hid::{CollectionType, HidError, MainFlags};
use pool::{Arena, Span};
pub use types::*;

/// Compile-time bounds of the parser. Capacities that scale with
/// the device are configured at runtime through [Limits].
pub mod consts {
    /// Report IDs are a single byte, ID 0 is the unnumbered report.
    pub const HID_MAX_IDS: usize = 256;
    /// Maximum number of fields in a single report.
    pub const HID_MAX_FIELDS: usize = 64;
    pub const HID_GLOBAL_STACK_SIZE: usize = 4;
    pub const HID_COLLECTION_STACK_SIZE: usize = 4;
    pub const HID_REPORT_TYPES: usize = 3;
    /// Largest Report Size accepted, in bits.
    pub const HID_MAX_REPORT_SIZE: u32 = 128;

    pub const HID_DEFAULT_NUM_COLLECTIONS: usize = 16;
    pub const HID_MAX_USAGES: usize = 1024;
    pub const HID_REPORT_DESCRIPTOR_SIZE: usize = 1024;
    pub const HID_MAX_REPORTS_PER_TYPE: usize = 16;
    pub const HID_FIELD_POOL_SIZE: usize = 64;
    pub const HID_USAGE_POOL_SIZE: usize = 1024;
    pub const HID_VALUE_POOL_SIZE: usize = 512;
    pub const HID_MAX_BUFFER_SIZE: usize = 64;

    /// Keyboard/Keypad ErrorRollOver, reported by keyboards in every
    /// slot of their key array when too many keys are pressed.
    pub const HID_USAGE_ERROR_ROLLOVER: u32 = 0x0007_0001;
}

use consts::*;

/// Pool capacities of a [Device]. All memory is reserved when the
/// device is created and never grows afterwards.
///
/// ```
/// # use hidhost::Limits;
/// let limits = Limits {
///     field_pool: 8,
///     ..Limits::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest report descriptor accepted by [Device::set_descriptor], in bytes.
    pub descriptor_size: usize,
    /// Reports per [ReportType].
    pub reports_per_type: usize,
    pub field_pool: usize,
    pub usage_pool: usize,
    pub value_pool: usize,
    /// Usages declared before a single main item, and the largest
    /// accepted Report Count.
    pub max_usages: usize,
    pub collections: usize,
    /// Largest raw report decoded, in bytes, excluding the report ID.
    pub buffer_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            descriptor_size: HID_REPORT_DESCRIPTOR_SIZE,
            reports_per_type: HID_MAX_REPORTS_PER_TYPE,
            field_pool: HID_FIELD_POOL_SIZE,
            usage_pool: HID_USAGE_POOL_SIZE,
            value_pool: HID_VALUE_POOL_SIZE,
            max_usages: HID_MAX_USAGES,
            collections: HID_DEFAULT_NUM_COLLECTIONS,
            buffer_size: HID_MAX_BUFFER_SIZE,
        }
    }
}

/// Errors in the structure of a report descriptor. Any of these
/// aborts the parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Global environment stack overflow")]
    GlobalStackOverflow,
    #[error("Global environment stack underflow")]
    GlobalStackUnderflow,
    #[error("Collection stack overflow")]
    CollectionStackOverflow,
    #[error("Collection stack underflow")]
    CollectionStackUnderflow,
    #[error("Unbalanced collection at end of report descriptor")]
    UnbalancedCollection,
    #[error("Unbalanced delimiter at end of report descriptor")]
    UnbalancedDelimiter,
    #[error("Nested delimiters")]
    NestedDelimiter,
    #[error("Bogus close delimiter")]
    BogusCloseDelimiter,
    #[error("Logical range invalid {minimum:#x} {maximum:#x}")]
    InvalidLogicalRange { minimum: i32, maximum: i32 },
    #[error("Invalid report size {0}")]
    InvalidReportSize(u32),
    #[error("Invalid report count {0}")]
    InvalidReportCount(u32),
    #[error("Report ID {0} is invalid")]
    InvalidReportId(u32),
    #[error("Unknown global tag {0:#x}")]
    UnknownGlobalTag(u8),
    #[error("Unexpected long item with tag {tag:#x}")]
    UnexpectedLongItem { tag: u8 },
}

/// A fixed-size pool or table ran out of space.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("Pool {pool} exhausted: requested {requested}, {available} available")]
    PoolExhausted {
        pool: &'static str,
        requested: usize,
        available: usize,
    },
    #[error("Max reports per type reached for {report_type:?} reports")]
    TooManyReports { report_type: ReportType },
    #[error("Too many fields in {report_type:?} report {id}")]
    TooManyFields { report_type: ReportType, id: ReportId },
    #[error("Usage index exceeded")]
    TooManyUsages,
    #[error("Too many collections")]
    TooManyCollections,
}

/// The bytes handed in are unusable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Empty report descriptor")]
    EmptyDescriptor,
    #[error("Report descriptor of {size} bytes exceeds the maximum of {max}")]
    DescriptorTooLarge { size: usize, max: usize },
    #[error("Item fetching failed: {0}")]
    Truncated(#[from] HidError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Errors while decoding or querying reports. These never modify
/// the state of the device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Report descriptor not parsed")]
    NotParsed,
    #[error("Empty report")]
    EmptyReport,
    #[error("Undefined {report_type:?} report {id}")]
    UnknownReport { report_type: ReportType, id: ReportId },
    #[error("Invalid report ID {0}")]
    InvalidReportId(u32),
    #[error("Not enough fields in {report_type:?} report {id}: {fields}")]
    NotEnoughFields {
        report_type: ReportType,
        id: ReportId,
        fields: usize,
    },
    #[error("Not enough values in {report_type:?} report {id} field {field_index}: {count}")]
    NotEnoughValues {
        report_type: ReportType,
        id: ReportId,
        field_index: usize,
        count: u32,
    },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReportType {
    #[default]
    Input = 0,
    Output = 1,
    Feature = 2,
}

impl ReportType {
    pub const ALL: [ReportType; HID_REPORT_TYPES] =
        [ReportType::Input, ReportType::Output, ReportType::Feature];
}

/// A collection as opened by the report descriptor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Collection {
    pub collection_type: CollectionType,
    /// The first usage declared before the collection was opened,
    /// [Usage::NONE] if there was none.
    pub usage: Usage,
    /// Nesting depth, 0 for a top-level collection.
    pub level: usize,
}

/// Index of a [Field] in the field pool of its device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FieldId(usize);

/// One usage slot of a [Field].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldUsage {
    pub hid: Usage,
    /// Index of the innermost collection open when the usage was declared.
    pub collection_index: usize,
    /// Position of this usage within its field.
    pub usage_index: usize,
}

/// `report_count` elements of `report_size` bits each, created by a
/// single Input, Output or Feature item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Field {
    /// Position of this field within its report.
    pub index: usize,
    pub report_type: ReportType,
    pub report_id: ReportId,
    pub flags: MainFlags,
    /// Bit offset of the first element, excluding any report ID byte.
    pub report_offset: usize,
    pub report_size: ReportSize,
    pub report_count: ReportCount,
    pub logical_minimum: LogicalMinimum,
    pub logical_maximum: LogicalMaximum,
    pub physical_minimum: PhysicalMinimum,
    pub physical_maximum: PhysicalMaximum,
    pub unit: Unit,
    pub unit_exponent: UnitExponent,
    /// Usage of the innermost enclosing physical collection.
    pub physical: Usage,
    /// Usage of the innermost enclosing logical collection.
    pub logical: Usage,
    /// Usage of the innermost enclosing application collection.
    pub application: Usage,
    usages: Span,
    values: Span,
    primed: bool,
}

impl Field {
    pub fn is_variable(&self) -> bool {
        self.flags.is_variable()
    }

    /// The number of usage slots, at least `report_count`.
    pub fn maxusage(&self) -> usize {
        self.usages.len()
    }

    /// The bits of the report occupied by this field.
    pub fn bits(&self) -> std::ops::Range<usize> {
        let nbits = self.report_size.0 as usize * self.report_count.0 as usize;
        self.report_offset..self.report_offset + nbits
    }
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    id: ReportId,
    report_type: ReportType,
    size: usize,
    fields: heapless::Vec<FieldId, HID_MAX_FIELDS>,
}

impl Report {
    /// The report ID, 0 for the unnumbered report.
    pub fn id(&self) -> ReportId {
        self.id
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    /// The size of this report in bits, excluding the report ID.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The size of this report in bytes, excluding the report ID.
    pub fn byte_len(&self) -> usize {
        self.size.div_ceil(8)
    }

    /// The fields of this report in the order they were declared.
    pub fn fields(&self) -> &[FieldId] {
        &self.fields
    }
}

/// All reports of one [ReportType].
#[derive(Debug)]
pub struct ReportEnum {
    numbered: bool,
    reports: Arena<Report>,
    id_hash: Box<[Option<usize>]>,
}

impl ReportEnum {
    fn new(capacity: usize) -> Self {
        ReportEnum {
            numbered: false,
            reports: Arena::new("reports", capacity),
            id_hash: vec![None; HID_MAX_IDS].into_boxed_slice(),
        }
    }

    fn reset(&mut self) {
        self.numbered = false;
        self.reports.reset();
        self.id_hash.fill(None);
    }

    /// True once any report with a non-zero ID was registered. Raw
    /// reports of a numbered report type start with the report ID.
    pub fn is_numbered(&self) -> bool {
        self.numbered
    }

    pub fn reports(&self) -> &[Report] {
        self.reports.allocated()
    }

    pub fn get(&self, id: ReportId) -> Option<&Report> {
        self.id_hash[usize::from(id.0)].and_then(|index| self.reports.get(index))
    }
}

/// Owner of every collection, report and field of a parsed report
/// descriptor.
#[derive(Debug)]
pub struct Registry {
    report_enums: [ReportEnum; HID_REPORT_TYPES],
    collections: Arena<Collection>,
    max_application: usize,
    fields: Arena<Field>,
    usages: Arena<FieldUsage>,
    values: Arena<i32>,
}

impl Registry {
    fn new(limits: &Limits) -> Self {
        Registry {
            report_enums: ReportType::ALL.map(|_| ReportEnum::new(limits.reports_per_type)),
            collections: Arena::new("collections", limits.collections),
            max_application: 0,
            fields: Arena::new("fields", limits.field_pool),
            usages: Arena::new("usages", limits.usage_pool),
            values: Arena::new("values", limits.value_pool),
        }
    }

    /// Drop the whole object graph and rewind every pool.
    fn reset(&mut self) {
        for report_enum in self.report_enums.iter_mut() {
            report_enum.reset();
        }
        self.collections.reset();
        self.max_application = 0;
        self.fields.reset();
        self.usages.reset();
        self.values.reset();
    }

    pub fn report_enum(&self, report_type: ReportType) -> &ReportEnum {
        &self.report_enums[report_type as usize]
    }

    pub fn reports(&self, report_type: ReportType) -> &[Report] {
        self.report_enum(report_type).reports()
    }

    pub fn report(&self, report_type: ReportType, id: ReportId) -> Option<&Report> {
        self.report_enum(report_type).get(id)
    }

    /// All collections in the order they were opened.
    pub fn collections(&self) -> &[Collection] {
        self.collections.allocated()
    }

    /// Number of application collections.
    pub fn max_application(&self) -> usize {
        self.max_application
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id.0)
    }

    /// The fields of `report` in declaration order.
    pub fn report_fields<'a>(&'a self, report: &'a Report) -> impl Iterator<Item = &'a Field> + 'a {
        report.fields.iter().filter_map(|id| self.field(*id))
    }

    pub fn field_usages(&self, field: &Field) -> &[FieldUsage] {
        self.usages.slice(field.usages)
    }

    /// The values of `field` as of the last decoded report.
    pub fn field_values(&self, field: &Field) -> &[i32] {
        self.values.slice(field.values)
    }

    pub fn field_pool(&self) -> &Arena<Field> {
        &self.fields
    }

    pub fn usage_pool(&self) -> &Arena<FieldUsage> {
        &self.usages
    }

    pub fn value_pool(&self) -> &Arena<i32> {
        &self.values
    }

    /// Check that a report exists and has the expected shape before
    /// relying on it. ID 0 selects the first report of `report_type`.
    pub fn validate_report(
        &self,
        report_type: ReportType,
        id: u32,
        field_index: usize,
        min_count: u32,
    ) -> Result<&Report, ReportError> {
        ensure!((id as usize) < HID_MAX_IDS, ReportError::InvalidReportId(id));
        let report_id = ReportId(id as u8);
        let report_enum = self.report_enum(report_type);
        let report = if id == 0 {
            report_enum.reports().first()
        } else {
            report_enum.get(report_id)
        };
        let report = report.ok_or(ReportError::UnknownReport {
            report_type,
            id: report_id,
        })?;
        let field = report
            .fields
            .get(field_index)
            .and_then(|id| self.field(*id))
            .ok_or(ReportError::NotEnoughFields {
                report_type,
                id: report_id,
                fields: report.fields.len(),
            })?;
        ensure!(
            field.report_count.0 >= min_count,
            ReportError::NotEnoughValues {
                report_type,
                id: report_id,
                field_index,
                count: field.report_count.0,
            }
        );
        Ok(report)
    }

    /// Return the index of the report for `(report_type, id)`, registering
    /// it if this is the first field of that report.
    fn register_report(
        &mut self,
        report_type: ReportType,
        id: ReportId,
    ) -> Result<usize, CapacityError> {
        let report_enum = &mut self.report_enums[report_type as usize];
        if let Some(index) = report_enum.id_hash[usize::from(id.0)] {
            return Ok(index);
        }
        let report = Report {
            id,
            report_type,
            size: 0,
            fields: heapless::Vec::new(),
        };
        let index = report_enum
            .reports
            .push(report)
            .map_err(|_| CapacityError::TooManyReports { report_type })?;
        if id.is_numbered() {
            report_enum.numbered = true;
        }
        report_enum.id_hash[usize::from(id.0)] = Some(index);
        Ok(index)
    }

    /// Reserve `nbits` at the end of a report, returning their bit offset.
    /// `report` must come from [Registry::register_report] for the same
    /// `report_type` since the last reset.
    fn advance_report(&mut self, report_type: ReportType, report: usize, nbits: usize) -> usize {
        let report = &mut self.report_enums[report_type as usize].reports[report];
        let offset = report.size;
        report.size += nbits;
        offset
    }

    /// Add `field` to a report, copying its usages into the usage pool and
    /// reserving `report_count` value slots. `report` as for [Registry::advance_report].
    fn register_field(
        &mut self,
        report_type: ReportType,
        report: usize,
        mut field: Field,
        usages: impl ExactSizeIterator<Item = FieldUsage>,
    ) -> Result<FieldId, CapacityError> {
        let nusages = usages.len();
        let nvalues = field.report_count.0 as usize;
        let report = &mut self.report_enums[report_type as usize].reports[report];
        if report.fields.is_full() {
            return Err(CapacityError::TooManyFields {
                report_type,
                id: report.id,
            });
        }
        // check every pool before taking anything
        for (name, available, requested) in [
            (self.fields.name(), self.fields.available(), 1),
            (self.usages.name(), self.usages.available(), nusages),
            (self.values.name(), self.values.available(), nvalues),
        ] {
            if requested > available {
                return Err(CapacityError::PoolExhausted {
                    pool: name,
                    requested,
                    available,
                });
            }
        }

        field.index = report.fields.len();
        field.usages = self.usages.alloc(nusages)?;
        field.values = self.values.alloc(nvalues)?;
        for (slot, usage) in self.usages[field.usages].iter_mut().zip(usages) {
            *slot = usage;
        }
        let id = FieldId(self.fields.push(field)?);
        report
            .fields
            .push(id)
            .map_err(|_| CapacityError::TooManyFields {
                report_type,
                id: field.report_id,
            })?;
        Ok(id)
    }

    /// Record a newly opened collection, returning its index.
    fn open_collection(&mut self, collection: Collection) -> Result<usize, CapacityError> {
        let index = self
            .collections
            .push(collection)
            .map_err(|_| CapacityError::TooManyCollections)?;
        if collection.collection_type == CollectionType::Application {
            self.max_application += 1;
        }
        Ok(index)
    }

    fn collection(&self, index: usize) -> Option<&Collection> {
        self.collections.get(index)
    }
}
