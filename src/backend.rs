// This file is part of fpga-cfg, an application to sequence FPGA configuration over FPP, SPI, CvP and PR managers.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// fpga-cfg is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// fpga-cfg is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Collaborator interfaces used by the core.
//!
//! The sequencer never touches the operating system directly. Loading firmware, driving the PCI
//! bus, loading kernel modules and publishing status changes all go through the traits below.
//! The daemon binds them to sysfs (see [`crate::sysfs`]), tests bind them to in-memory mocks.

use crate::error::FpgaCfgError;
use std::fmt;
use std::sync::Arc;

/// Location of a PCI function in PCI domain 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PciAddress {
    pub bus: u8,
    pub dev: u8,
    pub func: u8,
}

impl PciAddress {
    pub const DEV_MAX: u8 = 0x1f;
    pub const FUNC_MAX: u8 = 7;

    /// Returns `None` when `dev` or `func` is out of range for a PCI address.
    pub fn new(bus: u8, dev: u8, func: u8) -> Option<Self> {
        if dev > Self::DEV_MAX || func > Self::FUNC_MAX {
            return None;
        }
        Some(PciAddress { bus, dev, func })
    }

    /// Parse the sysfs form `0000:03:00.0`. Only domain 0 is accepted.
    pub fn from_sysfs_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("0000:")?;
        let (bus, dev_func) = rest.split_once(':')?;
        let (dev, func) = dev_func.split_once('.')?;
        Self::new(
            u8::from_str_radix(bus, 16).ok()?,
            u8::from_str_radix(dev, 16).ok()?,
            u8::from_str_radix(func, 16).ok()?,
        )
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0000:{:02x}:{:02x}.{:x}", self.bus, self.dev, self.func)
    }
}

/// What to load and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    /// Image path relative to the firmware search root.
    pub firmware_name: String,
    pub flags: u32,
}

impl ImageInfo {
    pub const PARTIAL_RECONFIG: u32 = 1 << 0;
    pub const BITSTREAM_LSB_FIRST: u32 = 1 << 3;

    pub fn new(firmware_name: &str, flags: u32) -> Self {
        ImageInfo {
            firmware_name: firmware_name.to_string(),
            flags,
        }
    }
}

/// A firmware loader ("FPGA manager").
///
/// Handles are reference counted. Dropping the last `Arc` releases the manager.
pub trait FpgaManager: Send + Sync {
    /// Stable identity used to deduplicate registrations, e.g. `fpga0`.
    fn identity(&self) -> &str;
    /// Name reported by the manager driver, e.g. `ftdi-fpp-fpga-mgr 1 0403:6010`.
    fn name(&self) -> &str;
    /// Load an image. Blocks until the manager reports completion.
    fn load(&self, info: &ImageInfo) -> Result<(), FpgaCfgError>;
}

impl fmt::Debug for dyn FpgaManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FpgaManager")
            .field("identity", &self.identity())
            .field("name", &self.name())
            .finish()
    }
}

/// The PCI bus the FPGA shows up on once its periphery image is loaded.
pub trait PciBus: Send + Sync {
    fn device_present(&self, addr: PciAddress) -> bool;
    /// Name of the driver currently bound to `addr`, if any.
    fn bound_driver(&self, addr: PciAddress) -> Option<String>;
    /// Release whatever driver is bound to `addr`. Completion is reported as a bus event.
    fn unbind(&self, addr: PciAddress) -> Result<(), FpgaCfgError>;
    /// Set the driver override of `addr` to `driver` and ask the bus to probe it.
    fn bind(&self, addr: PciAddress, driver: &str) -> Result<(), FpgaCfgError>;
    fn set_driver_override(&self, addr: PciAddress, driver: &str) -> Result<(), FpgaCfgError>;
    /// Hand device specific driver arguments to the device before its driver probes.
    fn pass_driver_args(
        &self,
        addr: PciAddress,
        driver: &str,
        args: &str,
    ) -> Result<(), FpgaCfgError>;
    /// Get the manager that configures the FPGA behind `addr` (CvP or PR).
    fn acquire_manager(&self, addr: PciAddress) -> Result<Arc<dyn FpgaManager>, FpgaCfgError>;
}

/// Kernel module loading.
pub trait ModuleLoader: Send + Sync {
    fn load_module(&self, name: &str, args: &str) -> Result<(), FpgaCfgError>;
    /// Abort a helper that is still running. Used at shutdown.
    fn kill_in_flight(&self) {}
}

/// Receives attribute change notifications for an instance.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, instance: &str, attribute: &str);

    /// The PR attribute names of `instance` changed to `image`/`meta`.
    fn pr_attributes_changed(&self, instance: &str, _image: &str, _meta: &str) {
        self.notify(instance, "pr");
    }
}

/// The set of collaborators an instance works with.
#[derive(Clone)]
pub struct Backends {
    pub bus: Arc<dyn PciBus>,
    pub modules: Arc<dyn ModuleLoader>,
    pub notifier: Arc<dyn StatusNotifier>,
}
