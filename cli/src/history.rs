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

use crate::proxies::control_proxy::ControlProxy;
use crate::status::{call_read_history, resolve_instance};
use zbus::Connection;

const READ_CHUNK: u64 = 4096;

async fn call_reset_history(instance: &str) -> Result<(), zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = ControlProxy::new(&connection).await?;
    proxy.write_history(instance, "0").await
}

/// Prints the load history, or resets it when `reset` is set
pub async fn history_handler(instance: &Option<String>, reset: bool) -> Result<String, zbus::Error> {
    let instance = resolve_instance(instance).await?;
    if reset {
        call_reset_history(&instance).await?;
        return Ok(format!("history of {instance} reset"));
    }
    let history = call_read_history(&instance, READ_CHUNK).await?;
    Ok(String::from_utf8_lossy(&history).trim_end().to_string())
}
