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
use zbus::Connection;

pub async fn debug_handler(instance: &Option<String>, level: i32) -> Result<String, zbus::Error> {
    let instance = resolve_instance(instance).await?;
    let connection = Connection::system().await?;
    let proxy = ControlProxy::new(&connection).await?;
    proxy.set_debug(&instance, level).await?;
    Ok(format!("debug level of {instance} set to {level}"))
}
