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
use crate::status::resolve_instance;
use std::path::Path;
use zbus::Connection;

/// Sends the dbus command to run a descriptor
async fn call_load(instance: &str, descriptor: Vec<u8>) -> Result<String, zbus::Error> {
    let connection = Connection::system().await?;
    let proxy = ControlProxy::new(&connection).await?;
    proxy.load(instance, descriptor).await
}

/// Reads the descriptor file and hands it to the daemon unchanged
pub async fn load_handler(instance: &Option<String>, file: &Path) -> Result<String, zbus::Error> {
    let descriptor = std::fs::read(file).map_err(|e| {
        zbus::Error::Failure(format!("could not read descriptor {}: {e}", file.display()))
    })?;
    let instance = resolve_instance(instance).await?;
    call_load(&instance, descriptor).await
}
