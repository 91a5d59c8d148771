// SPDX-License-Identifier: MIT

//! The report descriptor state machine. Items are fed in one at a time and
//! dispatched by type: global items update the global state, local items
//! collect usages for the next main item and main items turn the current
//! state into collections and fields of the [Registry].

use crate::consts::*;
use crate::hid::{
    snto32, CollectionType, GlobalItem, HidValue, Item, ItemType, LocalItem, MainFlags, MainItem,
    ReportDescriptorItems,
};
use crate::{
    CapacityError, Collection, Field, FieldUsage, InputError, Limits, LogicalMaximum,
    LogicalMinimum, ParserError, PhysicalMaximum, PhysicalMinimum, Registry, ReportCount, ReportId,
    ReportSize, ReportType, StructuralError, Unit, UnitExponent, Usage,
};
use tracing::{debug, trace, warn};

/// The global item state. Values are stored as decoded from their
/// items, any validation happens when a field is created.
#[derive(Clone, Copy, Debug, Default)]
struct Globals {
    usage_page: u32,
    logical_minimum: i32,
    logical_maximum: i32,
    physical_minimum: i32,
    physical_maximum: i32,
    unit_exponent: i32,
    unit: u32,
    report_size: u32,
    report_id: u32,
    report_count: u32,
}

/// The local item state, reset after every main item.
#[derive(Debug)]
struct Locals {
    usage: Box<[u32]>,
    collection_index: Box<[usize]>,
    usage_index: usize,
    usage_minimum: u32,
    delimiter_depth: u32,
    delimiter_branch: u32,
}

impl Locals {
    fn new(max_usages: usize) -> Self {
        Locals {
            usage: vec![0; max_usages].into_boxed_slice(),
            collection_index: vec![0; max_usages].into_boxed_slice(),
            usage_index: 0,
            usage_minimum: 0,
            delimiter_depth: 0,
            delimiter_branch: 0,
        }
    }

    fn reset(&mut self) {
        self.usage_index = 0;
        self.usage_minimum = 0;
        self.delimiter_depth = 0;
        self.delimiter_branch = 0;
    }

    fn usages(&self) -> &[u32] {
        &self.usage[..self.usage_index]
    }
}

#[derive(Debug)]
pub(crate) struct Parser {
    global: Globals,
    global_stack: [Globals; HID_GLOBAL_STACK_SIZE],
    global_stack_ptr: usize,
    local: Locals,
    collection_stack: [usize; HID_COLLECTION_STACK_SIZE],
    collection_stack_ptr: usize,
}

impl Parser {
    pub(crate) fn new(limits: &Limits) -> Self {
        Parser {
            global: Globals::default(),
            global_stack: [Globals::default(); HID_GLOBAL_STACK_SIZE],
            global_stack_ptr: 0,
            local: Locals::new(limits.max_usages),
            collection_stack: [0; HID_COLLECTION_STACK_SIZE],
            collection_stack_ptr: 0,
        }
    }

    fn reset(&mut self) {
        self.global = Globals::default();
        self.global_stack_ptr = 0;
        self.local.reset();
        self.collection_stack_ptr = 0;
    }

    /// Parse `bytes` into `registry`. On error the registry is left
    /// partially populated, the caller is expected to reset it.
    pub(crate) fn parse(&mut self, bytes: &[u8], registry: &mut Registry) -> Result<(), ParserError> {
        ensure!(!bytes.is_empty(), InputError::EmptyDescriptor);
        self.reset();

        for item in ReportDescriptorItems::from(bytes) {
            let item = item.map_err(InputError::from)?;
            trace!(
                "item {:02x} at offset {}: {:?}",
                item.header(),
                item.offset(),
                item.item_type()
            );
            self.parse_item(&item, registry).inspect_err(|e| {
                warn!("item {:02x} at offset {} rejected: {e}", item.header(), item.offset());
            })?;
        }

        ensure!(
            self.collection_stack_ptr == 0,
            StructuralError::UnbalancedCollection
        );
        ensure!(
            self.local.delimiter_depth == 0,
            StructuralError::UnbalancedDelimiter
        );
        Ok(())
    }

    fn parse_item(&mut self, item: &Item, registry: &mut Registry) -> Result<(), ParserError> {
        match item.item_type() {
            ItemType::Main(main) => self.parse_main(main, registry),
            ItemType::Global(global) => Ok(self.parse_global(global)?),
            ItemType::Local(local) => self.parse_local(local),
            ItemType::Long { tag } => Err(StructuralError::UnexpectedLongItem { tag }.into()),
            ItemType::Reserved { tag } => {
                debug!("reserved item type, tag {tag:#x}");
                Ok(())
            }
        }
    }

    fn parse_global(&mut self, item: GlobalItem) -> Result<(), StructuralError> {
        match item {
            GlobalItem::Push => {
                ensure!(
                    self.global_stack_ptr < HID_GLOBAL_STACK_SIZE,
                    StructuralError::GlobalStackOverflow
                );
                self.global_stack[self.global_stack_ptr] = self.global;
                self.global_stack_ptr += 1;
            }
            GlobalItem::Pop => {
                ensure!(
                    self.global_stack_ptr > 0,
                    StructuralError::GlobalStackUnderflow
                );
                self.global_stack_ptr -= 1;
                self.global = self.global_stack[self.global_stack_ptr];
            }
            GlobalItem::UsagePage(v) => self.global.usage_page = v.udata(),
            GlobalItem::LogicalMinimum(v) => self.global.logical_minimum = v.sdata(),
            GlobalItem::LogicalMaximum(v) => {
                // e.g. 0xff is 255 after a minimum of 0 but -1 after a minimum of -127
                self.global.logical_maximum = if self.global.logical_minimum < 0 {
                    v.sdata()
                } else {
                    v.udata() as i32
                };
            }
            GlobalItem::PhysicalMinimum(v) => self.global.physical_minimum = v.sdata(),
            GlobalItem::PhysicalMaximum(v) => {
                self.global.physical_maximum = if self.global.physical_minimum < 0 {
                    v.sdata()
                } else {
                    v.udata() as i32
                };
            }
            GlobalItem::UnitExponent(v) => {
                let raw = v.sdata();
                // a bare nibble is a 4-bit two's complement value
                self.global.unit_exponent = if raw as u32 & 0xffff_fff0 == 0 {
                    snto32(raw as u32, 4)
                } else {
                    raw
                };
            }
            GlobalItem::Unit(v) => self.global.unit = v.udata(),
            GlobalItem::ReportSize(v) => {
                let size = v.udata();
                ensure!(
                    size <= HID_MAX_REPORT_SIZE,
                    StructuralError::InvalidReportSize(size)
                );
                self.global.report_size = size;
            }
            GlobalItem::ReportCount(v) => {
                let count = v.udata();
                ensure!(
                    count as usize <= self.local.usage.len(),
                    StructuralError::InvalidReportCount(count)
                );
                self.global.report_count = count;
            }
            GlobalItem::ReportId(v) => {
                let id = v.udata();
                ensure!(
                    id != 0 && (id as usize) < HID_MAX_IDS,
                    StructuralError::InvalidReportId(id)
                );
                self.global.report_id = id;
            }
            GlobalItem::Reserved { tag } => return Err(StructuralError::UnknownGlobalTag(tag)),
        }
        Ok(())
    }

    /// A usage of 1 or 2 bytes is relative to the current usage page.
    fn full_usage(&self, value: HidValue) -> u32 {
        if value.len() <= 2 {
            (self.global.usage_page << 16).wrapping_add(value.udata())
        } else {
            value.udata()
        }
    }

    fn parse_local(&mut self, item: LocalItem) -> Result<(), ParserError> {
        match item {
            LocalItem::Delimiter(v) => {
                if v.udata() != 0 {
                    ensure!(
                        self.local.delimiter_depth == 0,
                        StructuralError::NestedDelimiter
                    );
                    self.local.delimiter_depth += 1;
                    self.local.delimiter_branch += 1;
                } else {
                    ensure!(
                        self.local.delimiter_depth >= 1,
                        StructuralError::BogusCloseDelimiter
                    );
                    self.local.delimiter_depth -= 1;
                }
            }
            LocalItem::Usage(v) => {
                if self.local.delimiter_branch > 1 {
                    debug!("alternative usage ignored");
                    return Ok(());
                }
                self.add_usage(self.full_usage(v))?;
            }
            LocalItem::UsageMinimum(v) => {
                if self.local.delimiter_branch > 1 {
                    debug!("alternative usage ignored");
                    return Ok(());
                }
                self.local.usage_minimum = self.full_usage(v);
            }
            LocalItem::UsageMaximum(v) => {
                if self.local.delimiter_branch > 1 {
                    debug!("alternative usage ignored");
                    return Ok(());
                }
                let maximum = self.full_usage(v);
                for usage in self.local.usage_minimum..=maximum {
                    self.add_usage(usage)?;
                }
            }
            item => debug!("unsupported local item {item:?}"),
        }
        Ok(())
    }

    fn add_usage(&mut self, usage: u32) -> Result<(), CapacityError> {
        let index = self.local.usage_index;
        ensure!(index < self.local.usage.len(), CapacityError::TooManyUsages);
        self.local.usage[index] = usage;
        self.local.collection_index[index] = self.current_collection().unwrap_or(0);
        self.local.usage_index += 1;
        Ok(())
    }

    fn parse_main(&mut self, item: MainItem, registry: &mut Registry) -> Result<(), ParserError> {
        let result = match item {
            MainItem::Collection(collection_type) => self.open_collection(collection_type, registry),
            MainItem::EndCollection => self.close_collection().map_err(ParserError::from),
            MainItem::Input(flags) => self.add_field(ReportType::Input, flags, registry),
            MainItem::Output(flags) => self.add_field(ReportType::Output, flags, registry),
            MainItem::Feature(flags) => self.add_field(ReportType::Feature, flags, registry),
            MainItem::Reserved { tag } => {
                warn!("unknown main item tag {tag:#x}");
                Ok(())
            }
        };
        self.local.reset();
        result
    }

    fn current_collection(&self) -> Option<usize> {
        self.collection_stack[..self.collection_stack_ptr]
            .last()
            .copied()
    }

    fn open_collection(
        &mut self,
        collection_type: CollectionType,
        registry: &mut Registry,
    ) -> Result<(), ParserError> {
        let usage = self.local.usages().first().copied().unwrap_or(0);
        ensure!(
            self.collection_stack_ptr < HID_COLLECTION_STACK_SIZE,
            StructuralError::CollectionStackOverflow
        );
        let index = registry.open_collection(Collection {
            collection_type,
            usage: Usage(usage),
            level: self.collection_stack_ptr,
        })?;
        debug!(
            "collection {index} {collection_type:?} usage {} at level {}",
            Usage(usage),
            self.collection_stack_ptr
        );
        self.collection_stack[self.collection_stack_ptr] = index;
        self.collection_stack_ptr += 1;
        Ok(())
    }

    fn close_collection(&mut self) -> Result<(), StructuralError> {
        ensure!(
            self.collection_stack_ptr > 0,
            StructuralError::CollectionStackUnderflow
        );
        self.collection_stack_ptr -= 1;
        Ok(())
    }

    /// The usage of the innermost open collection of the given type.
    fn lookup_collection(&self, registry: &Registry, collection_type: CollectionType) -> Usage {
        self.collection_stack[..self.collection_stack_ptr]
            .iter()
            .rev()
            .filter_map(|index| registry.collection(*index))
            .find(|c| c.collection_type == collection_type)
            .map(|c| c.usage)
            .unwrap_or(Usage::NONE)
    }

    fn add_field(
        &mut self,
        report_type: ReportType,
        flags: MainFlags,
        registry: &mut Registry,
    ) -> Result<(), ParserError> {
        let global = self.global;
        let report_id = ReportId(global.report_id as u8);
        let report = registry.register_report(report_type, report_id)?;

        let (minimum, maximum) = (global.logical_minimum, global.logical_maximum);
        let invalid = if minimum < 0 {
            maximum < minimum
        } else {
            (maximum as u32) < (minimum as u32)
        };
        if invalid {
            debug!("logical range invalid {minimum:#x} {maximum:#x}");
            return Err(StructuralError::InvalidLogicalRange { minimum, maximum }.into());
        }

        let nbits = global.report_size as usize * global.report_count as usize;
        let offset = registry.advance_report(report_type, report, nbits);

        // no usages: constant padding, nothing to decode
        let nusages = self.local.usage_index;
        if nusages == 0 {
            trace!("{nbits} bits of padding at offset {offset} in report {report_id}");
            return Ok(());
        }

        let field = Field {
            report_type,
            report_id,
            flags,
            report_offset: offset,
            report_size: ReportSize(global.report_size),
            report_count: ReportCount(global.report_count),
            logical_minimum: LogicalMinimum(minimum),
            logical_maximum: LogicalMaximum(maximum),
            physical_minimum: PhysicalMinimum(global.physical_minimum),
            physical_maximum: PhysicalMaximum(global.physical_maximum),
            unit: Unit(global.unit),
            unit_exponent: UnitExponent(global.unit_exponent),
            physical: self.lookup_collection(registry, CollectionType::Physical),
            logical: self.lookup_collection(registry, CollectionType::Logical),
            application: self.lookup_collection(registry, CollectionType::Application),
            ..Field::default()
        };

        // the last usage repeats for any remaining elements
        let count = nusages.max(global.report_count as usize);
        let locals = &self.local;
        let usages = (0..count).map(|i| {
            let j = i.min(nusages - 1);
            FieldUsage {
                hid: Usage(locals.usage[j]),
                collection_index: locals.collection_index[j],
                usage_index: i,
            }
        });
        let id = registry.register_field(report_type, report, field, usages)?;
        debug!(
            "{report_type:?} report {report_id}: field {id:?} at bit {offset}, {} x {} bits, {count} usages",
            global.report_count, global.report_size
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> (Result<(), ParserError>, Registry) {
        parse_with(bytes, Limits::default())
    }

    fn parse_with(bytes: &[u8], limits: Limits) -> (Result<(), ParserError>, Registry) {
        let mut registry = Registry::new(&limits);
        let mut parser = Parser::new(&limits);
        let result = parser.parse(bytes, &mut registry);
        (result, registry)
    }

    fn first_field(registry: &Registry, report_type: ReportType) -> Field {
        let report = &registry.reports(report_type)[0];
        *registry.report_fields(report).next().unwrap()
    }

    #[test]
    fn logical_maximum_signedness() {
        #[rustfmt::skip]
        let bytes = [
            0x09, 0x30,        // Usage (X)
            0x15, 0x00,        // Logical Minimum (0)
            0x25, 0xff,        // Logical Maximum (255)
            0x75, 0x08,        // Report Size (8)
            0x95, 0x01,        // Report Count (1)
            0x81, 0x02,        // Input (Data,Var,Abs)
            0x09, 0x31,        // Usage (Y)
            0x15, 0x81,        // Logical Minimum (-127)
            0x25, 0x7f,        // Logical Maximum (127)
            0x81, 0x02,        // Input (Data,Var,Abs)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let report = &registry.reports(ReportType::Input)[0];
        let fields: Vec<&Field> = registry.report_fields(report).collect();
        assert_eq!(fields[0].logical_minimum, LogicalMinimum(0));
        assert_eq!(fields[0].logical_maximum, LogicalMaximum(255));
        assert_eq!(fields[1].logical_minimum, LogicalMinimum(-127));
        assert_eq!(fields[1].logical_maximum, LogicalMaximum(127));
        assert_eq!(fields[1].report_offset, 8);
        assert_eq!(report.size(), 16);
    }

    #[test]
    fn logical_range_rejected() {
        #[rustfmt::skip]
        let bytes = [
            0x09, 0x30,        // Usage (X)
            0x15, 0x05,        // Logical Minimum (5)
            0x25, 0x01,        // Logical Maximum (1)
            0x75, 0x08,        // Report Size (8)
            0x95, 0x01,        // Report Count (1)
            0x81, 0x02,        // Input (Data,Var,Abs)
        ];
        let (result, _) = parse(&bytes);
        assert_eq!(
            result,
            Err(ParserError::Structural(StructuralError::InvalidLogicalRange {
                minimum: 5,
                maximum: 1
            }))
        );
    }

    #[test]
    fn unit_exponent_nibble() {
        #[rustfmt::skip]
        let bytes = [
            0x09, 0x30,        // Usage (X)
            0x55, 0x0e,        // Unit Exponent (-2)
            0x75, 0x08,        // Report Size (8)
            0x95, 0x01,        // Report Count (1)
            0x81, 0x02,        // Input (Data,Var,Abs)
            0x09, 0x31,        // Usage (Y)
            0x55, 0x03,        // Unit Exponent (3)
            0x81, 0x02,        // Input (Data,Var,Abs)
            0x09, 0x32,        // Usage (Z)
            0x55, 0xfd,        // Unit Exponent (-3)
            0x81, 0x02,        // Input (Data,Var,Abs)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let report = &registry.reports(ReportType::Input)[0];
        let exponents: Vec<i32> = registry
            .report_fields(report)
            .map(|f| f.unit_exponent.0)
            .collect();
        assert_eq!(exponents, [-2, 3, -3]);
    }

    #[test]
    fn push_pop() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,        // Usage Page (Generic Desktop)
            0x75, 0x08,        // Report Size (8)
            0xa4,              // Push
            0x05, 0x09,        //   Usage Page (Button)
            0x75, 0x01,        //   Report Size (1)
            0xb4,              // Pop
            0x09, 0x30,        // Usage (X)
            0x95, 0x01,        // Report Count (1)
            0x81, 0x02,        // Input (Data,Var,Abs)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let field = first_field(&registry, ReportType::Input);
        assert_eq!(field.report_size, ReportSize(8));
        assert_eq!(registry.field_usages(&field)[0].hid, Usage(0x0001_0030));

        let (result, _) = parse(&[0xb4]);
        assert_eq!(
            result,
            Err(StructuralError::GlobalStackUnderflow.into())
        );

        let overflow = [0xa4; HID_GLOBAL_STACK_SIZE + 1];
        let (result, _) = parse(&overflow);
        assert_eq!(result, Err(StructuralError::GlobalStackOverflow.into()));
    }

    #[test]
    fn global_item_limits() {
        // Report Size (129)
        let (result, _) = parse(&[0x75, 0x81]);
        assert_eq!(result, Err(StructuralError::InvalidReportSize(129).into()));

        // Report ID (0)
        let (result, _) = parse(&[0x85, 0x00]);
        assert_eq!(result, Err(StructuralError::InvalidReportId(0).into()));

        // Report ID (256)
        let (result, _) = parse(&[0x86, 0x00, 0x01]);
        assert_eq!(result, Err(StructuralError::InvalidReportId(256).into()));

        // Report Count (9) with room for 8 usages
        let limits = Limits {
            max_usages: 8,
            ..Limits::default()
        };
        let (result, _) = parse_with(&[0x95, 0x09], limits);
        assert_eq!(result, Err(StructuralError::InvalidReportCount(9).into()));

        // reserved global tag 0xc
        let (result, _) = parse(&[0xc4]);
        assert_eq!(result, Err(StructuralError::UnknownGlobalTag(0xc).into()));
    }

    #[test]
    fn usage_range() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x09,        // Usage Page (Button)
            0x19, 0x05,        // Usage Minimum (5)
            0x29, 0x08,        // Usage Maximum (8)
            0x75, 0x01,        // Report Size (1)
            0x95, 0x04,        // Report Count (4)
            0x81, 0x02,        // Input (Data,Var,Abs)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let field = first_field(&registry, ReportType::Input);
        let usages: Vec<u32> = registry
            .field_usages(&field)
            .iter()
            .map(|u| u.hid.0)
            .collect();
        assert_eq!(usages, [0x0009_0005, 0x0009_0006, 0x0009_0007, 0x0009_0008]);
    }

    #[test]
    fn last_usage_repeats() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,        // Usage Page (Generic Desktop)
            0x09, 0x30,        // Usage (X)
            0x09, 0x31,        // Usage (Y)
            0x75, 0x08,        // Report Size (8)
            0x95, 0x04,        // Report Count (4)
            0x81, 0x02,        // Input (Data,Var,Abs)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let field = first_field(&registry, ReportType::Input);
        assert_eq!(field.maxusage(), 4);
        let usages: Vec<(u32, usize)> = registry
            .field_usages(&field)
            .iter()
            .map(|u| (u.hid.0, u.usage_index))
            .collect();
        assert_eq!(
            usages,
            [(0x0001_0030, 0), (0x0001_0031, 1), (0x0001_0031, 2), (0x0001_0031, 3)]
        );
    }

    #[test]
    fn extended_usage() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,                    // Usage Page (Generic Desktop)
            0x0b, 0x38, 0x02, 0x0c, 0x00,  // Usage (Consumer AC Pan)
            0x75, 0x08,                    // Report Size (8)
            0x95, 0x01,                    // Report Count (1)
            0x81, 0x06,                    // Input (Data,Var,Rel)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let field = first_field(&registry, ReportType::Input);
        assert_eq!(registry.field_usages(&field)[0].hid, Usage(0x000c_0238));
    }

    #[test]
    fn padding_has_no_field() {
        #[rustfmt::skip]
        let bytes = [
            0x75, 0x05,        // Report Size (5)
            0x95, 0x01,        // Report Count (1)
            0x81, 0x03,        // Input (Cnst,Var,Abs)
            0x05, 0x09,        // Usage Page (Button)
            0x09, 0x01,        // Usage (1)
            0x75, 0x03,        // Report Size (3)
            0x81, 0x02,        // Input (Data,Var,Abs)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let report = &registry.reports(ReportType::Input)[0];
        assert_eq!(report.fields().len(), 1);
        assert_eq!(report.size(), 8);
        assert_eq!(first_field(&registry, ReportType::Input).report_offset, 5);
    }

    #[test]
    fn innermost_physical_collection() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,        // Usage Page (Generic Desktop)
            0x09, 0x02,        // Usage (Mouse)
            0xa1, 0x01,        // Collection (Application)
            0x09, 0x01,        //   Usage (Pointer)
            0xa1, 0x00,        //   Collection (Physical)
            0x09, 0x3a,        //     Usage (Counted Buffer)
            0xa1, 0x00,        //     Collection (Physical)
            0x09, 0x30,        //       Usage (X)
            0x75, 0x08,        //       Report Size (8)
            0x95, 0x01,        //       Report Count (1)
            0x81, 0x02,        //       Input (Data,Var,Abs)
            0xc0,              //     End Collection
            0xc0,              //   End Collection
            0xc0,              // End Collection
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();

        let field = first_field(&registry, ReportType::Input);
        assert_eq!(field.application, Usage(0x0001_0002));
        assert_eq!(field.physical, Usage(0x0001_003a));
        assert_eq!(field.logical, Usage::NONE);
    }

    #[test]
    fn collection_nesting() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,        // Usage Page (Generic Desktop)
            0x09, 0x02,        // Usage (Mouse)
            0xa1, 0x01,        // Collection (Application)
            0x09, 0x01,        //   Usage (Pointer)
            0xa1, 0x00,        //   Collection (Physical)
            0x09, 0x3a,        //     Usage (Counted Buffer)
            0xa1, 0x02,        //     Collection (Logical)
            0x09, 0x30,        //       Usage (X)
            0x75, 0x08,        //       Report Size (8)
            0x95, 0x01,        //       Report Count (1)
            0x81, 0x02,        //       Input (Data,Var,Abs)
            0xc0,              //     End Collection
            0xc0,              //   End Collection
            0xc0,              // End Collection
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();

        let levels: Vec<(CollectionType, usize)> = registry
            .collections()
            .iter()
            .map(|c| (c.collection_type, c.level))
            .collect();
        assert_eq!(
            levels,
            [
                (CollectionType::Application, 0),
                (CollectionType::Physical, 1),
                (CollectionType::Logical, 2)
            ]
        );
        assert_eq!(registry.max_application(), 1);

        let field = first_field(&registry, ReportType::Input);
        assert_eq!(field.application, Usage(0x0001_0002));
        assert_eq!(field.physical, Usage(0x0001_0001));
        assert_eq!(field.logical, Usage(0x0001_003a));
        assert_eq!(registry.field_usages(&field)[0].collection_index, 2);
    }

    #[test]
    fn collection_stack() {
        // End Collection without Collection
        let (result, _) = parse(&[0xc0]);
        assert_eq!(result, Err(StructuralError::CollectionStackUnderflow.into()));

        // Collection (Application) never closed
        let (result, _) = parse(&[0xa1, 0x01]);
        assert_eq!(result, Err(StructuralError::UnbalancedCollection.into()));

        let mut nested = Vec::new();
        for _ in 0..=HID_COLLECTION_STACK_SIZE {
            nested.extend_from_slice(&[0xa1, 0x00]);
        }
        let (result, _) = parse(&nested);
        assert_eq!(result, Err(StructuralError::CollectionStackOverflow.into()));

        let limits = Limits {
            collections: 2,
            ..Limits::default()
        };
        let (result, _) = parse_with(&[0xa1, 0x01, 0xc0, 0xa1, 0x01, 0xc0, 0xa1, 0x01, 0xc0], limits);
        assert_eq!(result, Err(CapacityError::TooManyCollections.into()));
    }

    #[test]
    fn delimiters() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,        // Usage Page (Generic Desktop)
            0xa9, 0x01,        // Delimiter (Open)
            0x09, 0x30,        //   Usage (X)
            0xa9, 0x00,        // Delimiter (Close)
            0xa9, 0x01,        // Delimiter (Open)
            0x09, 0x31,        //   Usage (Y)
            0xa9, 0x00,        // Delimiter (Close)
            0x75, 0x08,        // Report Size (8)
            0x95, 0x01,        // Report Count (1)
            0x81, 0x02,        // Input (Data,Var,Abs)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let field = first_field(&registry, ReportType::Input);
        let usages = registry.field_usages(&field);
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].hid, Usage(0x0001_0030));

        let (result, _) = parse(&[0xa9, 0x01, 0xa9, 0x01]);
        assert_eq!(result, Err(StructuralError::NestedDelimiter.into()));

        let (result, _) = parse(&[0xa9, 0x00]);
        assert_eq!(result, Err(StructuralError::BogusCloseDelimiter.into()));

        let (result, _) = parse(&[0xa9, 0x01]);
        assert_eq!(result, Err(StructuralError::UnbalancedDelimiter.into()));
    }

    #[test]
    fn too_many_usages() {
        let limits = Limits {
            max_usages: 4,
            ..Limits::default()
        };
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x09,        // Usage Page (Button)
            0x19, 0x01,        // Usage Minimum (1)
            0x29, 0x05,        // Usage Maximum (5)
        ];
        let (result, _) = parse_with(&bytes, limits);
        assert_eq!(result, Err(CapacityError::TooManyUsages.into()));
    }

    #[test]
    fn unsupported_items() {
        #[rustfmt::skip]
        let bytes = [
            0x79, 0x04,        // String Index (4)
            0xd1, 0x00,        // Main item with reserved tag 0xd
            0xfe, 0x01, 0x10, 0x00, // Long item
        ];
        let (result, _) = parse(&bytes);
        assert_eq!(
            result,
            Err(StructuralError::UnexpectedLongItem { tag: 0x10 }.into())
        );
    }

    #[test]
    fn empty_and_truncated() {
        let (result, _) = parse(&[]);
        assert_eq!(result, Err(InputError::EmptyDescriptor.into()));

        let (result, _) = parse(&[0x05, 0x01, 0x26, 0xff]);
        assert!(matches!(
            result,
            Err(ParserError::Input(InputError::Truncated(_)))
        ));
    }

    #[test]
    fn numbered_reports() {
        #[rustfmt::skip]
        let bytes = [
            0x05, 0x01,        // Usage Page (Generic Desktop)
            0x85, 0x01,        // Report ID (1)
            0x09, 0x30,        // Usage (X)
            0x75, 0x08,        // Report Size (8)
            0x95, 0x02,        // Report Count (2)
            0x81, 0x02,        // Input (Data,Var,Abs)
            0x85, 0x02,        // Report ID (2)
            0x09, 0x31,        // Usage (Y)
            0x95, 0x01,        // Report Count (1)
            0x81, 0x02,        // Input (Data,Var,Abs)
            0x09, 0x32,        // Usage (Z)
            0xb1, 0x02,        // Feature (Data,Var,Abs)
        ];
        let (result, registry) = parse(&bytes);
        result.unwrap();
        let input = registry.report_enum(ReportType::Input);
        assert!(input.is_numbered());
        assert_eq!(input.reports().len(), 2);
        assert_eq!(input.get(ReportId(1)).unwrap().size(), 16);
        assert_eq!(input.get(ReportId(2)).unwrap().size(), 8);
        assert!(input.get(ReportId(0)).is_none());

        let feature = registry.report(ReportType::Feature, ReportId(2)).unwrap();
        assert_eq!(feature.size(), 8);
        assert!(registry.report_enum(ReportType::Feature).is_numbered());
        assert!(registry.reports(ReportType::Output).is_empty());
    }
}
