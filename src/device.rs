// SPDX-License-Identifier: MIT

//! The device lifecycle: request a [DeviceHandle] from a [DeviceSlot], hand
//! it the report descriptor, [open](Device::open) it and decode reports
//! until the handle is dropped.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::parser::Parser;
use crate::{InputError, Limits, ParserError, Registry, Report, ReportError, ReportType};
use tracing::{debug, info, warn};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    struct DeviceStatus: u8 {
        const DESCRIPTOR = 1 << 0;
        const PARSED = 1 << 1;
    }
}

/// A HID device with its report descriptor and every pool needed
/// to parse it.
#[derive(Debug)]
pub struct Device {
    limits: Limits,
    descriptor: Box<[u8]>,
    descriptor_len: usize,
    status: DeviceStatus,
    parser: Parser,
    pub(crate) registry: Registry,
    /// Zero-padded copy of the report being decoded.
    pub(crate) scratch: Box<[u8]>,
    /// Values of the field being decoded.
    pub(crate) values: Box<[i32]>,
}

impl Device {
    pub(crate) fn new(limits: Limits) -> Self {
        Device {
            limits,
            descriptor: vec![0; limits.descriptor_size].into_boxed_slice(),
            descriptor_len: 0,
            status: DeviceStatus::empty(),
            parser: Parser::new(&limits),
            registry: Registry::new(&limits),
            // extract() reads up to 8 bytes past the last byte of a field
            scratch: vec![0; limits.buffer_size + 8].into_boxed_slice(),
            values: vec![0; limits.max_usages].into_boxed_slice(),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Copy the raw report descriptor into the device. This does not
    /// parse the descriptor, see [Device::open]. A parsed device is
    /// closed, the new descriptor needs to be opened again.
    pub fn set_descriptor(&mut self, bytes: &[u8]) -> Result<(), InputError> {
        ensure!(!bytes.is_empty(), InputError::EmptyDescriptor);
        ensure!(
            bytes.len() <= self.descriptor.len(),
            InputError::DescriptorTooLarge {
                size: bytes.len(),
                max: self.descriptor.len(),
            }
        );
        if self.is_parsed() {
            self.close();
        }
        self.descriptor[..bytes.len()].copy_from_slice(bytes);
        self.descriptor_len = bytes.len();
        self.status.insert(DeviceStatus::DESCRIPTOR);
        debug!("report descriptor of {} bytes", bytes.len());
        Ok(())
    }

    /// The report descriptor as passed to [Device::set_descriptor].
    pub fn descriptor(&self) -> &[u8] {
        &self.descriptor[..self.descriptor_len]
    }

    /// Parse the report descriptor. Any previously parsed state is
    /// dropped first. On error the device is closed again.
    pub fn open(&mut self) -> Result<(), ParserError> {
        self.registry.reset();
        self.status.remove(DeviceStatus::PARSED);
        ensure!(
            self.status.contains(DeviceStatus::DESCRIPTOR),
            InputError::EmptyDescriptor
        );

        let descriptor = &self.descriptor[..self.descriptor_len];
        match self.parser.parse(descriptor, &mut self.registry) {
            Ok(()) => {
                self.status.insert(DeviceStatus::PARSED);
                info!(
                    "report descriptor parsed: {} collections, {} input, {} output, {} feature reports, {} fields",
                    self.registry.collections().len(),
                    self.registry.reports(ReportType::Input).len(),
                    self.registry.reports(ReportType::Output).len(),
                    self.registry.reports(ReportType::Feature).len(),
                    self.registry.field_pool().position(),
                );
                Ok(())
            }
            Err(e) => {
                warn!("report descriptor rejected: {e}");
                self.close();
                Err(e)
            }
        }
    }

    /// Drop every collection, report and field and return all pool
    /// slots. The report descriptor itself is kept, the device can be
    /// opened again.
    pub fn close(&mut self) {
        self.registry.reset();
        self.status.remove(DeviceStatus::PARSED);
        debug!("device closed");
    }

    pub fn is_parsed(&self) -> bool {
        self.status.contains(DeviceStatus::PARSED)
    }

    /// The parsed object graph. Empty unless [Device::is_parsed].
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// See [Registry::validate_report].
    pub fn validate_report(
        &self,
        report_type: ReportType,
        id: u32,
        field_index: usize,
        min_count: u32,
    ) -> Result<&Report, ReportError> {
        self.registry
            .validate_report(report_type, id, field_index, min_count)
            .inspect_err(|e| warn!("{e}"))
    }
}

/// Storage for the one HID device this host supports, usually a `static`.
///
/// ```
/// # use hidhost::{DeviceSlot, Limits};
/// static HID_DEVICE: DeviceSlot = DeviceSlot::new();
///
/// let device = HID_DEVICE.request(Limits::default()).unwrap();
/// assert!(HID_DEVICE.request(Limits::default()).is_none());
/// drop(device);
/// assert!(HID_DEVICE.request(Limits::default()).is_some());
/// ```
#[derive(Debug, Default)]
pub struct DeviceSlot {
    requested: AtomicBool,
}

impl DeviceSlot {
    pub const fn new() -> Self {
        DeviceSlot {
            requested: AtomicBool::new(false),
        }
    }

    /// Claim the slot. Returns `None` while a previously requested
    /// device has not been dropped.
    pub fn request(&self, limits: Limits) -> Option<DeviceHandle<'_>> {
        if self.requested.swap(true, Ordering::Acquire) {
            warn!("HID device already requested");
            return None;
        }
        info!("HID device requested");
        Some(DeviceHandle {
            slot: self,
            device: Device::new(limits),
        })
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }
}

/// Exclusive access to the device of a [DeviceSlot]. Dropping the handle
/// releases the device and all of its memory.
#[derive(Debug)]
pub struct DeviceHandle<'a> {
    slot: &'a DeviceSlot,
    device: Device,
}

impl Deref for DeviceHandle<'_> {
    type Target = Device;

    fn deref(&self) -> &Device {
        &self.device
    }
}

impl DerefMut for DeviceHandle<'_> {
    fn deref_mut(&mut self) -> &mut Device {
        &mut self.device
    }
}

impl Drop for DeviceHandle<'_> {
    fn drop(&mut self) {
        self.slot.requested.store(false, Ordering::Release);
        info!("HID device released");
    }
}
