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

use crate::comm::dbus::instance_for;
use crate::config::DESCRIPTOR_MAX_LEN;
use crate::error::FpgaCfgError;
use crate::registry::ManagerRegistry;
use log::info;
use std::sync::Arc;
use zbus::{fdo, interface};

pub struct ControlInterface {
    registry: Arc<ManagerRegistry>,
}

impl ControlInterface {
    pub fn new(registry: Arc<ManagerRegistry>) -> Self {
        ControlInterface { registry }
    }
}

#[interface(name = "org.fpgacfg.daemon.control")]
impl ControlInterface {
    /// Run the configuration sequence for `descriptor` on `instance`.
    ///
    /// The sequence blocks on the FPGA managers and on driver rebinds, so it runs on the
    /// blocking pool. Loads on the same instance queue behind each other.
    async fn load(&self, instance: &str, descriptor: Vec<u8>) -> Result<String, fdo::Error> {
        info!(
            "load called with instance: {instance} and a {} byte descriptor",
            descriptor.len()
        );
        if descriptor.len() > DESCRIPTOR_MAX_LEN {
            return Err(FpgaCfgError::Argument(format!(
                "descriptor of {} bytes exceeds the {DESCRIPTOR_MAX_LEN} byte limit",
                descriptor.len()
            ))
            .into());
        }
        let inst = instance_for(&self.registry, instance)?;
        let worker = inst.clone();
        tokio::task::spawn_blocking(move || worker.load(&descriptor))
            .await
            .map_err(|e| FpgaCfgError::Internal(format!("load task for {instance} failed: {e}")))??;
        let (cfg_seq, _) = inst.sequence_numbers();
        Ok(format!("{instance}: load {cfg_seq} done"))
    }

    /// Write `value` to the history of `instance`; `0` resets it.
    async fn write_history(&self, instance: &str, value: &str) -> Result<(), fdo::Error> {
        info!("write_history called with instance: {instance} and value: {value}");
        let inst = instance_for(&self.registry, instance)?;
        inst.write_history(value)?;
        Ok(())
    }

    async fn set_debug(&self, instance: &str, level: i32) -> Result<(), fdo::Error> {
        info!("set_debug called with instance: {instance} and level: {level}");
        instance_for(&self.registry, instance)?.set_debug_level(level);
        Ok(())
    }
}
