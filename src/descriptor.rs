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

//! Configuration descriptors.
//!
//! A descriptor is the text block written to an instance's load surface:
//!
//! ```text
//! {
//! fpga-pcie-bus-nr = "03:00.0";
//! fpp-image = "/lib/firmware/periph.rbf";
//! cvp-image = "/lib/firmware/core.rbf";
//! }
//! ```
//!
//! [`parser`] validates the framing and the line grammar, and applies every recognized key to a
//! [`DescriptorFields`] in place. [`keys`] holds the fixed key catalog.

pub mod keys;
pub mod parser;

use crate::backend::PciAddress;
use crate::descriptor::keys::Group;
use std::fmt;

/// One configuration step the sequencer can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Load through the FPP ring manager.
    FppRing,
    /// Load through an SPI manager that is part of a ring.
    SpiRing,
    /// Load through a standalone SPI manager.
    SpiSingle,
    /// Configuration via protocol over PCIe.
    Cvp,
    /// Partial reconfiguration of an already configured FPGA.
    PartialReconfig,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::FppRing => "FPP",
            Operation::SpiRing | Operation::SpiSingle => "SPI",
            Operation::Cvp => "CvP",
            Operation::PartialReconfig => "PR",
        };
        write!(f, "{name}")
    }
}

/// Paths describing the image for one backend group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubDescriptor {
    /// Image path relative to the firmware root, as handed to the manager.
    pub firmware: String,
    /// Image path as written in the descriptor.
    pub firmware_abs: String,
    /// Metadata path as written in the descriptor.
    pub metadata_abs: String,
}

/// Every field a descriptor can set on an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorFields {
    pub fpp: SubDescriptor,
    pub spi: SubDescriptor,
    pub cvp: SubDescriptor,
    pub pr: SubDescriptor,
    pub pci: PciAddress,
    /// `fpga-pcie-bus-nr` exactly as written.
    pub bdf: String,
    pub fpga_type: String,
    pub bs_lsb_first: bool,
    pub mfd_driver: String,
    pub mfd_driver_args: String,
    pub primary: Option<Operation>,
    pub secondary: Option<Operation>,
}

impl DescriptorFields {
    pub fn new(default_mfd_driver: &str) -> Self {
        DescriptorFields {
            fpp: SubDescriptor::default(),
            spi: SubDescriptor::default(),
            cvp: SubDescriptor::default(),
            pr: SubDescriptor::default(),
            pci: PciAddress::default(),
            bdf: String::new(),
            fpga_type: String::new(),
            bs_lsb_first: false,
            mfd_driver: default_mfd_driver.to_string(),
            mfd_driver_args: String::new(),
            primary: None,
            secondary: None,
        }
    }

    /// Clear the per-load scratch state before a new descriptor is parsed.
    ///
    /// Image paths, the PCI address and the type survive so that a descriptor only has to name
    /// what changes.
    pub fn reset_scratch(&mut self, default_mfd_driver: &str) {
        self.bs_lsb_first = false;
        self.primary = None;
        self.secondary = None;
        self.mfd_driver = default_mfd_driver.to_string();
        self.mfd_driver_args.clear();
    }

    pub fn sub(&self, group: Group) -> &SubDescriptor {
        match group {
            Group::Fpp => &self.fpp,
            Group::Spi => &self.spi,
            Group::Cvp => &self.cvp,
            Group::Pr => &self.pr,
        }
    }

    pub fn sub_mut(&mut self, group: Group) -> &mut SubDescriptor {
        match group {
            Group::Fpp => &mut self.fpp,
            Group::Spi => &mut self.spi,
            Group::Cvp => &mut self.cvp,
            Group::Pr => &mut self.pr,
        }
    }
}
