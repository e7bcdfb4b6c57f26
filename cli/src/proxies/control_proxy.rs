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

use zbus::{Result, proxy};

#[proxy(
    default_service = "org.fpgacfg.daemon",
    interface = "org.fpgacfg.daemon.control",
    default_path = "/org/fpgacfg/daemon/control"
)]
pub trait Control {
    async fn load(&self, instance: &str, descriptor: Vec<u8>) -> Result<String>;

    async fn write_history(&self, instance: &str, value: &str) -> Result<()>;

    async fn set_debug(&self, instance: &str, level: i32) -> Result<()>;
}
