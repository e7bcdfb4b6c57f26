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

//! DBus proxy interfaces for the fpga-cfgd daemon.
//!
//! - [`control_proxy`] - loads, history reset and debug level
//! - [`status_proxy`] - read-only queries of the configuration instances
//!
//! # DBus Service Information
//!
//! - **Service Name**: `org.fpgacfg.daemon`
//! - **Control Interface**: `org.fpgacfg.daemon.control` at `/org/fpgacfg/daemon/control`
//! - **Status Interface**: `org.fpgacfg.daemon.status` at `/org/fpgacfg/daemon/status`

pub mod control_proxy;
pub mod status_proxy;
