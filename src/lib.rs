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

//! FPGA configuration orchestration.
//!
//! Watches FPGA managers, gives each ring or single-SPI manager a [`instance::ConfigInstance`],
//! and runs the configuration sequence described by a descriptor against it:
//!
//! - [`descriptor`] - descriptor framing, key table and parser
//! - [`registry`] - manager registry creating and destroying instances
//! - [`sequencer`] - FPP/SPI ring loads, single SPI, PR and CvP sequences
//! - [`history`] - bounded per-instance load history
//! - [`wait`] and [`events`] - PCI bind/unbind notifications and waiting on them
//! - [`backend`] - collaborator traits, implemented on sysfs by [`sysfs`]
//! - [`comm`] - the D-Bus surface

pub mod backend;
pub mod comm;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod history;
pub mod instance;
pub mod registry;
pub mod sequencer;
pub mod sysfs;
pub mod system_io;
pub mod wait;
