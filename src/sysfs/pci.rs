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

//! PCI bus access through `/sys/bus/pci`.
//!
//! ```text
//! /sys/bus/pci
//! ├── devices
//! │   └── 0000:03:00.0 -> ../../../devices/pci0000:00/0000:00:1c.0/0000:03:00.0
//! │       ├── driver -> ../../../../bus/pci/drivers/fpga_mfd
//! │       └── driver_override
//! ├── drivers
//! │   └── fpga_mfd
//! │       └── unbind
//! └── drivers_probe
//! ```

use crate::backend::{FpgaManager, PciAddress, PciBus};
use crate::error::FpgaCfgError;
use crate::sysfs::fpga_manager::{SysfsFpgaManager, list_fpga_managers};
use crate::system_io::{fs_read_link, fs_write};
use log::{info, trace, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SysfsPciBus {
    devices_dir: PathBuf,
    drivers_probe: PathBuf,
    module_params_dir: PathBuf,
    sys_fs_prefix: PathBuf,
}

impl SysfsPciBus {
    /// `devices_dir` is the bus' `devices` directory. `drivers_probe` is expected next to it.
    pub fn new(devices_dir: &Path, module_params_dir: &Path, sys_fs_prefix: &Path) -> Self {
        let bus_dir = devices_dir.parent().unwrap_or(devices_dir);
        SysfsPciBus {
            devices_dir: devices_dir.to_path_buf(),
            drivers_probe: bus_dir.join("drivers_probe"),
            module_params_dir: module_params_dir.to_path_buf(),
            sys_fs_prefix: sys_fs_prefix.to_path_buf(),
        }
    }

    fn device_dir(&self, addr: PciAddress) -> PathBuf {
        self.devices_dir.join(addr.to_string())
    }

    pub fn devices_dir(&self) -> &Path {
        &self.devices_dir
    }

    /// Driver bound to the device called `name` in the devices directory.
    pub fn driver_of(&self, name: &str) -> Option<String> {
        let link = self.devices_dir.join(name).join("driver");
        fs_read_link(&link)
            .ok()
            .and_then(|target| target.file_name().map(|n| n.to_string_lossy().into_owned()))
    }
}

impl PciBus for SysfsPciBus {
    fn device_present(&self, addr: PciAddress) -> bool {
        self.device_dir(addr).is_dir()
    }

    fn bound_driver(&self, addr: PciAddress) -> Option<String> {
        self.driver_of(&addr.to_string())
    }

    fn unbind(&self, addr: PciAddress) -> Result<(), FpgaCfgError> {
        let unbind = self.device_dir(addr).join("driver").join("unbind");
        trace!("unbinding {addr}");
        fs_write(&unbind, false, addr.to_string())
    }

    fn bind(&self, addr: PciAddress, driver: &str) -> Result<(), FpgaCfgError> {
        self.set_driver_override(addr, driver)?;
        fs_write(&self.drivers_probe, false, addr.to_string())
    }

    fn set_driver_override(&self, addr: PciAddress, driver: &str) -> Result<(), FpgaCfgError> {
        fs_write(
            &self.device_dir(addr).join("driver_override"),
            false,
            driver,
        )
    }

    /// Writes each `name=value` argument to the driver's module parameter of that name.
    ///
    /// Arguments without a matching writable parameter are skipped with a warning.
    fn pass_driver_args(
        &self,
        addr: PciAddress,
        driver: &str,
        args: &str,
    ) -> Result<(), FpgaCfgError> {
        let params_dir = self.module_params_dir.join(driver).join("parameters");
        info!("{addr}: passing device specific module parameters to {driver}");
        for arg in args.split_whitespace() {
            let Some((name, value)) = arg.split_once('=') else {
                warn!("{addr}: ignoring driver argument '{arg}' without a value");
                continue;
            };
            let param = params_dir.join(name);
            if !param.is_file() {
                warn!("{addr}: {driver} has no parameter '{name}'");
                continue;
            }
            fs_write(&param, false, value)?;
        }
        Ok(())
    }

    /// The manager whose parent device is `addr`.
    fn acquire_manager(&self, addr: PciAddress) -> Result<Arc<dyn FpgaManager>, FpgaCfgError> {
        let wanted = addr.to_string();
        for handle in list_fpga_managers(&self.sys_fs_prefix)? {
            let Ok(manager) = SysfsFpgaManager::open(&self.sys_fs_prefix, &handle) else {
                continue;
            };
            if manager.parent_device().is_ok_and(|parent| parent == wanted) {
                return Ok(Arc::new(manager));
            }
        }
        Err(FpgaCfgError::Argument(format!(
            "no FPGA manager with parent device {wanted}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysfs::test_tree::TestTree;
    use googletest::prelude::*;

    const ADDR: PciAddress = PciAddress {
        bus: 3,
        dev: 0,
        func: 0,
    };

    fn bus_tree(tag: &str) -> (TestTree, SysfsPciBus) {
        let tree = TestTree::new(tag);
        tree.file("bus/drivers_probe", "");
        tree.file("bus/devices/0000:03:00.0/driver_override", "");
        tree.file("bus/drivers/altera-cvp/unbind", "");
        tree.symlink("bus/drivers/altera-cvp", "bus/devices/0000:03:00.0/driver");
        tree.file("class/fpga0/name", "Altera CvP FPGA Manager\n");
        tree.symlink("bus/devices/0000:03:00.0", "class/fpga0/device");
        tree.file("class/fpga1/name", "altera-ps-spi spi1.0\n");
        tree.file("module/fpga_mfd/parameters/irq", "");
        let bus = SysfsPciBus::new(
            &tree.path().join("bus/devices"),
            &tree.path().join("module"),
            &tree.path().join("class"),
        );
        (tree, bus)
    }

    #[gtest]
    fn reports_presence_and_driver() {
        let (_tree, bus) = bus_tree("pci-presence");
        expect_that!(bus.device_present(ADDR), eq(true));
        expect_that!(bus.bound_driver(ADDR), some(eq("altera-cvp")));
        let absent = PciAddress::new(4, 0, 0).unwrap();
        expect_that!(bus.device_present(absent), eq(false));
        expect_that!(bus.bound_driver(absent), none());
    }

    #[gtest]
    fn unbind_writes_the_address_to_the_driver() {
        let (tree, bus) = bus_tree("pci-unbind");
        bus.unbind(ADDR).unwrap();
        assert_that!(tree.read("bus/drivers/altera-cvp/unbind"), eq("0000:03:00.0"));
    }

    #[gtest]
    fn bind_sets_override_and_probes() {
        let (tree, bus) = bus_tree("pci-bind");
        bus.bind(ADDR, "fpga_mfd").unwrap();
        expect_that!(
            tree.read("bus/devices/0000:03:00.0/driver_override"),
            eq("fpga_mfd")
        );
        expect_that!(tree.read("bus/drivers_probe"), eq("0000:03:00.0"));
    }

    #[gtest]
    fn driver_args_go_to_module_parameters() {
        let (tree, bus) = bus_tree("pci-args");
        bus.pass_driver_args(ADDR, "fpga_mfd", "irq=5 unknown=1 flag")
            .unwrap();
        assert_that!(tree.read("module/fpga_mfd/parameters/irq"), eq("5"));
    }

    #[gtest]
    fn acquire_finds_manager_by_parent_device() {
        let (_tree, bus) = bus_tree("pci-acquire");
        let manager = bus.acquire_manager(ADDR).unwrap();
        expect_that!(manager.identity(), eq("fpga0"));
        expect_that!(
            bus.acquire_manager(PciAddress::new(4, 0, 0).unwrap()),
            err(anything())
        );
    }
}
