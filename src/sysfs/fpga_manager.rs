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

//! FPGA managers in the `fpga_manager` class.
//!
//! A sysfs map of an fpga in fpga_manager class looks like this for a PCIe CvP manager:
//! ```text
//! /sys/class/fpga_manager/fpga1
//! ├── device -> ../../../0000:03:00.0
//! ├── firmware
//! ├── flags
//! ├── name
//! ├── state
//! ├── status
//! ├── subsystem -> ../../../../../../class/fpga_manager
//! └── uevent
//! ```
//! Of these files, only the following are interacted with:
//! - `name` - Manager name, which decides the instance kind
//! - `device` - Parent device, used to find the manager of a PCIe function
//! - `flags` - Programming flags (hexadecimal format: "0x...")
//! - `firmware` - Trigger bitstream loading by writing the file name
//! - `state` - Manager state after loading

use crate::backend::{FpgaManager, ImageInfo};
use crate::error::FpgaCfgError;
use crate::system_io::{fs_read, fs_read_dir, fs_read_link, fs_write};
use log::{info, trace, warn};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SysfsFpgaManager {
    device_handle: String,
    name: String,
    dir: PathBuf,
}

impl SysfsFpgaManager {
    /// Open `device_handle` (e.g. `fpga0`) under `sys_fs_prefix` and read its name.
    pub fn open(sys_fs_prefix: &Path, device_handle: &str) -> Result<Self, FpgaCfgError> {
        let dir = sys_fs_prefix.join(device_handle);
        let name = fs_read(&dir.join("name"))?.trim_end_matches('\n').to_string();
        Ok(SysfsFpgaManager {
            device_handle: device_handle.to_string(),
            name,
            dir,
        })
    }

    /// File name of the parent device, e.g. `0000:03:00.0`.
    pub fn parent_device(&self) -> Result<String, FpgaCfgError> {
        let link = fs_read_link(&self.dir.join("device"))?;
        link.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                FpgaCfgError::Internal(format!("{link:?} does not name a parent device"))
            })
    }

    /// Current manager state with the trailing newline removed.
    pub fn state(&self) -> Result<String, FpgaCfgError> {
        let state_path = self.dir.join("state");
        trace!("reading {state_path:?}");
        fs_read(&state_path).map(|s| s.trim_end_matches('\n').to_string())
    }

    fn set_flags(&self, flags: u32) -> Result<(), FpgaCfgError> {
        let flag_path = self.dir.join("flags");
        trace!("Writing 0x'{flags:X}' to '{flag_path:?}");
        fs_write(&flag_path, false, format!("0x{flags:X}"))
    }

    fn assert_state(&self) -> Result<(), FpgaCfgError> {
        let state = self.state()?;
        match state.as_str() {
            "operating" => {
                info!("{}'s state is 'operating'", self.device_handle);
                Ok(())
            }
            _ => Err(FpgaCfgError::LoadFailed {
                manager: self.name.clone(),
                firmware: String::new(),
                reason: format!(
                    "after loading, {}'s state should be 'operating' but it is '{state}'",
                    self.device_handle
                ),
            }),
        }
    }
}

impl FpgaManager for SysfsFpgaManager {
    fn identity(&self) -> &str {
        &self.device_handle
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Set the flags, then write the image name to `firmware` which makes the kernel load it.
    fn load(&self, info: &ImageInfo) -> Result<(), FpgaCfgError> {
        if let Err(e) = self.set_flags(info.flags) {
            warn!("{}: could not set flags: {e}", self.device_handle);
            return Err(e);
        }
        fs_write(&self.dir.join("firmware"), false, &info.firmware_name).map_err(|e| {
            FpgaCfgError::LoadFailed {
                manager: self.name.clone(),
                firmware: info.firmware_name.clone(),
                reason: e.to_string(),
            }
        })?;
        self.assert_state().map_err(|e| match e {
            FpgaCfgError::LoadFailed {
                manager, reason, ..
            } => FpgaCfgError::LoadFailed {
                manager,
                firmware: info.firmware_name.clone(),
                reason,
            },
            other => other,
        })
    }
}

/// Device handles (`fpga0`, `fpga1`, ...) present under `sys_fs_prefix`.
pub fn list_fpga_managers(sys_fs_prefix: &Path) -> Result<Vec<String>, FpgaCfgError> {
    let mut handles = fs_read_dir(sys_fs_prefix)?;
    handles.sort();
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysfs::test_tree::TestTree;
    use googletest::prelude::*;

    fn manager_tree(state: &str) -> TestTree {
        let tree = TestTree::new("fpga-manager");
        tree.file("fpga0/name", "altera-ps-spi spi1.0\n");
        tree.file("fpga0/flags", "0");
        tree.file("fpga0/firmware", "");
        tree.file("fpga0/state", state);
        tree
    }

    #[gtest]
    fn open_reads_the_name() {
        let tree = manager_tree("operating\n");
        let manager = SysfsFpgaManager::open(tree.path(), "fpga0").unwrap();
        expect_that!(manager.name(), eq("altera-ps-spi spi1.0"));
        expect_that!(manager.identity(), eq("fpga0"));
    }

    #[gtest]
    fn load_writes_flags_and_firmware() {
        let tree = manager_tree("operating\n");
        let manager = SysfsFpgaManager::open(tree.path(), "fpga0").unwrap();
        manager
            .load(&ImageInfo::new("a.rbf", ImageInfo::BITSTREAM_LSB_FIRST))
            .unwrap();
        expect_that!(tree.read("fpga0/flags"), eq("0x8"));
        expect_that!(tree.read("fpga0/firmware"), eq("a.rbf"));
    }

    #[gtest]
    fn load_fails_when_manager_is_not_operating() {
        let tree = manager_tree("write error\n");
        let manager = SysfsFpgaManager::open(tree.path(), "fpga0").unwrap();
        let result = manager.load(&ImageInfo::new("a.rbf", 0));
        assert_that!(
            result,
            err(displays_as(all![
                starts_with("FpgaCfgError::LoadFailed"),
                contains_substring("a.rbf"),
                contains_substring("write error")
            ]))
        );
    }

    #[gtest]
    fn parent_device_follows_the_link() {
        let tree = manager_tree("operating\n");
        tree.dir("devices/0000:03:00.0");
        tree.symlink("devices/0000:03:00.0", "fpga0/device");
        let manager = SysfsFpgaManager::open(tree.path(), "fpga0").unwrap();
        assert_that!(manager.parent_device(), ok(eq("0000:03:00.0")));
    }

    #[gtest]
    fn missing_manager_fails_to_open() {
        let tree = TestTree::new("fpga-manager-missing");
        assert_that!(
            SysfsFpgaManager::open(tree.path(), "fpga9"),
            err(displays_as(starts_with("FpgaCfgError::IORead")))
        );
    }
}
