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

use crate::comm::dbus::{group_from_str, instance_for};
use crate::registry::ManagerRegistry;
use log::info;
use std::sync::Arc;
use zbus::{fdo, interface};

pub struct StatusInterface {
    registry: Arc<ManagerRegistry>,
}

impl StatusInterface {
    pub fn new(registry: Arc<ManagerRegistry>) -> Self {
        StatusInterface { registry }
    }

    fn done_flag(&self, instance: &str) -> Result<u32, fdo::Error> {
        Ok(u32::from(instance_for(&self.registry, instance)?.status()))
    }
}

#[interface(name = "org.fpgacfg.daemon.status")]
impl StatusInterface {
    /// Names of all instances, one per line.
    async fn list_instances(&self) -> Result<String, fdo::Error> {
        info!("list_instances called");
        let mut ret_string = String::new();
        for inst in self.registry.instances() {
            ret_string += format!("{}\n", inst.name()).as_str();
        }
        Ok(ret_string)
    }

    async fn get_status(&self, instance: &str) -> Result<u32, fdo::Error> {
        info!("get_status called with instance: {instance}");
        self.done_flag(instance)
    }

    async fn get_ready(&self, instance: &str) -> Result<u32, fdo::Error> {
        info!("get_ready called with instance: {instance}");
        self.done_flag(instance)
    }

    async fn get_load(&self, instance: &str) -> Result<u32, fdo::Error> {
        info!("get_load called with instance: {instance}");
        self.done_flag(instance)
    }

    /// Current step of the configuration sequence, e.g. `idle` or `await-rebind`.
    async fn get_state(&self, instance: &str) -> Result<String, fdo::Error> {
        info!("get_state called with instance: {instance}");
        Ok(instance_for(&self.registry, instance)?.state().to_string())
    }

    async fn get_debug(&self, instance: &str) -> Result<i32, fdo::Error> {
        info!("get_debug called with instance: {instance}");
        Ok(instance_for(&self.registry, instance)?.debug_level())
    }

    async fn get_history_size(&self, instance: &str) -> Result<u64, fdo::Error> {
        info!("get_history_size called with instance: {instance}");
        let size = instance_for(&self.registry, instance)?.history().size();
        Ok(size as u64)
    }

    /// Up to `length` bytes of the history text starting at byte `offset`.
    async fn read_history(
        &self,
        instance: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, fdo::Error> {
        info!("read_history called with instance: {instance}, offset: {offset}, length: {length}");
        let inst = instance_for(&self.registry, instance)?;
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let length = usize::try_from(length).unwrap_or(usize::MAX);
        Ok(inst.history().read(offset, length))
    }

    async fn get_image(&self, instance: &str, group: &str) -> Result<String, fdo::Error> {
        info!("get_image called with instance: {instance} and group: {group}");
        let group = group_from_str(group)?;
        Ok(instance_for(&self.registry, instance)?.image(group)?)
    }

    async fn get_meta(&self, instance: &str, group: &str) -> Result<String, fdo::Error> {
        info!("get_meta called with instance: {instance} and group: {group}");
        let group = group_from_str(group)?;
        Ok(instance_for(&self.registry, instance)?.meta(group)?)
    }

    /// Names of the PR image and metadata attributes, `image<N>` and `meta<N>`.
    async fn get_pr_attributes(&self, instance: &str) -> Result<(String, String), fdo::Error> {
        info!("get_pr_attributes called with instance: {instance}");
        let inst = instance_for(&self.registry, instance)?;
        inst.pr_attribute_names().ok_or_else(|| {
            fdo::Error::InvalidArgs(format!("{instance} does not support partial reconfiguration"))
        })
    }

    /// `(configuration sequence, PR sequence)`.
    async fn get_sequence_numbers(&self, instance: &str) -> Result<(u64, u64), fdo::Error> {
        info!("get_sequence_numbers called with instance: {instance}");
        Ok(instance_for(&self.registry, instance)?.sequence_numbers())
    }
}
