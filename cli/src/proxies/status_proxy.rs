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
    interface = "org.fpgacfg.daemon.status",
    default_path = "/org/fpgacfg/daemon/status"
)]
pub trait Status {
    async fn list_instances(&self) -> Result<String>;
    async fn get_status(&self, instance: &str) -> Result<u32>;
    async fn get_ready(&self, instance: &str) -> Result<u32>;
    async fn get_load(&self, instance: &str) -> Result<u32>;
    async fn get_state(&self, instance: &str) -> Result<String>;
    async fn get_debug(&self, instance: &str) -> Result<i32>;
    async fn get_history_size(&self, instance: &str) -> Result<u64>;
    async fn read_history(&self, instance: &str, offset: u64, length: u64) -> Result<Vec<u8>>;
    async fn get_image(&self, instance: &str, group: &str) -> Result<String>;
    async fn get_meta(&self, instance: &str, group: &str) -> Result<String>;
    async fn get_pr_attributes(&self, instance: &str) -> Result<(String, String)>;
    async fn get_sequence_numbers(&self, instance: &str) -> Result<(u64, u64)>;
}
