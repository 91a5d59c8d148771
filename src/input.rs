// SPDX-License-Identifier: MIT

//! Decoding of raw reports against a parsed report descriptor.
//!
//! Decoding is differential: every field remembers the values of the last
//! report and only usages whose value changed are passed to the
//! [EventSink]. Variable fields emit one event per changed element, array
//! fields a release (value 0) for every usage that left the array followed
//! by a press (value 1) for every usage that entered it.

use crate::consts::HID_USAGE_ERROR_ROLLOVER;
use crate::hid::snto32;
use crate::{
    Device, Field, FieldId, FieldUsage, Registry, Report, ReportError, ReportId, ReportType,
    Usage,
};
use tracing::{debug, trace, warn};

/// Receiver of decoded usage events.
pub trait EventSink {
    /// Called for every usage whose value changed.
    fn event(&mut self, field: &Field, usage: &FieldUsage, value: i32);

    /// Called once after all fields of `report` were decoded.
    fn report(&mut self, _report: &Report) {}
}

impl<F> EventSink for F
where
    F: FnMut(&Field, &FieldUsage, i32),
{
    fn event(&mut self, field: &Field, usage: &FieldUsage, value: i32) {
        self(field, usage, value)
    }
}

/// Extract `n` bits starting at bit `offset` of `report`, LSB first.
///
/// Up to 8 bytes starting at byte `offset / 8` are read, bytes past the end
/// of `report` read as zero. Values wider than 32 bits are truncated.
pub fn extract(report: &[u8], offset: usize, n: u32) -> u32 {
    if n > 32 {
        warn!("extract() called with n ({n}) > 32");
    }
    let start = offset / 8;
    let mut bytes = [0u8; 8];
    if let Some(src) = report.get(start..) {
        let len = src.len().min(bytes.len());
        bytes[..len].copy_from_slice(&src[..len]);
    }
    let value = u64::from_le_bytes(bytes) >> (offset % 8);
    let mask = match n {
        64.. => u64::MAX,
        n => (1u64 << n) - 1,
    };
    (value & mask) as u32
}

/// The usage of array value `value`, `None` if `value` is out of the
/// logical range or maps to no usage.
fn array_usage<'a>(field: &Field, usages: &'a [FieldUsage], value: i32) -> Option<&'a FieldUsage> {
    let (minimum, maximum) = (field.logical_minimum.0, field.logical_maximum.0);
    if value < minimum || value > maximum {
        return None;
    }
    let index = usize::try_from(i64::from(value) - i64::from(minimum)).ok()?;
    usages.get(index).filter(|usage| !usage.hid.is_none())
}

/// Emit the difference between two array field snapshots: releases for
/// usages in `previous` but not in `current`, then presses for usages in
/// `current` but not in `previous`. Repeated values emit once.
pub fn diff_array<S: EventSink + ?Sized>(
    field: &Field,
    usages: &[FieldUsage],
    previous: &[i32],
    current: &[i32],
    sink: &mut S,
) {
    for (n, value) in previous.iter().enumerate() {
        if current.contains(value) || previous[..n].contains(value) {
            continue;
        }
        if let Some(usage) = array_usage(field, usages, *value) {
            sink.event(field, usage, 0);
        }
    }
    for (n, value) in current.iter().enumerate() {
        if previous.contains(value) || current[..n].contains(value) {
            continue;
        }
        if let Some(usage) = array_usage(field, usages, *value) {
            sink.event(field, usage, 1);
        }
    }
}

/// Emit every element of a variable field that differs from the
/// previous report. Relative fields and fields never decoded before
/// emit every element.
fn diff_variable<S: EventSink + ?Sized>(
    field: &Field,
    usages: &[FieldUsage],
    previous: &[i32],
    current: &[i32],
    sink: &mut S,
) {
    let emit_all = !field.primed || field.flags.is_relative();
    for ((old, new), usage) in previous.iter().zip(current).zip(usages) {
        if emit_all || old != new {
            sink.event(field, usage, *new);
        }
    }
}

impl Registry {
    /// Decode one field of a report.
    ///
    /// `id` must be listed by a report of this registry. Its value span
    /// holds `report_count` slots and `current` at least `max_usages`,
    /// which bounds every `report_count`.
    fn input_field<S: EventSink + ?Sized>(
        &mut self,
        id: FieldId,
        data: &[u8],
        current: &mut [i32],
        sink: &mut S,
    ) {
        let field = self.fields[id.0];
        let current = &mut current[..field.report_count.0 as usize];
        let size = field.report_size.0;
        let minimum = field.logical_minimum.0;
        let usages = &self.usages[field.usages];

        for (n, value) in current.iter_mut().enumerate() {
            let raw = extract(data, field.report_offset + n * size as usize, size);
            *value = if minimum < 0 { snto32(raw, size) } else { raw as i32 };

            if field.flags.is_array()
                && array_usage(&field, usages, *value)
                    .is_some_and(|u| u.hid == Usage(HID_USAGE_ERROR_ROLLOVER))
            {
                debug!("ErrorRollOver in field {id:?}, ignoring report");
                return;
            }
        }

        let previous = &mut self.values[field.values];
        if field.flags.is_variable() {
            diff_variable(&field, usages, previous, current, sink);
        } else {
            diff_array(&field, usages, previous, current, sink);
        }
        previous.copy_from_slice(current);

        self.fields[id.0].primed = true;
    }
}

impl Device {
    /// Decode one raw report of `report_type` and pass every changed
    /// usage to `sink`.
    ///
    /// If the report type uses report IDs, `data[0]` is the report ID.
    /// Reports shorter than declared are zero-padded, longer reports
    /// are truncated.
    pub fn decode_report<S: EventSink + ?Sized>(
        &mut self,
        report_type: ReportType,
        data: &[u8],
        sink: &mut S,
    ) -> Result<(), ReportError> {
        ensure!(self.is_parsed(), ReportError::NotParsed);
        ensure!(!data.is_empty(), ReportError::EmptyReport);

        let report_enum = self.registry.report_enum(report_type);
        let (id, payload) = match (report_enum.is_numbered(), data) {
            (true, [id, payload @ ..]) => (ReportId(*id), payload),
            _ => (ReportId(0), data),
        };
        let Some(report) = report_enum.get(id) else {
            warn!("undefined {report_type:?} report {id} received");
            return Err(ReportError::UnknownReport { report_type, id });
        };

        let rsize = report.byte_len().min(self.limits().buffer_size);
        if payload.len() < rsize {
            debug!(
                "{report_type:?} report {id} is short ({} < {rsize} bytes)",
                payload.len()
            );
        }
        let len = payload.len().min(rsize);
        self.scratch.fill(0);
        self.scratch[..len].copy_from_slice(&payload[..len]);
        trace!("{report_type:?} report {id}: {:02x?}", &self.scratch[..rsize]);

        let fields = report.fields.clone();
        for field in fields {
            self.registry
                .input_field(field, &self.scratch, &mut self.values, sink);
        }

        if let Some(report) = self.registry.report(report_type, id) {
            sink.report(report);
        }
        Ok(())
    }
}
