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

//! Daemon configuration.
//!
//! Values come from `/etc/fpga-cfg/config.toml` when present, otherwise from the hardcoded
//! defaults below. The result is a plain [`SystemConfig`] value which is handed to the registry
//! and sysfs adapters at startup.
//!
//! ```toml
//! [defaults]
//! firmware_prefix = "/lib/firmware/"
//! history_max_entries = 5000
//! bind_timeout_ms = 1000
//! preload_modules = ["fpga-mgr", "altera-ps-spi"]
//! ```

use crate::error::FpgaCfgError;
use crate::system_io::fs_read;
use log::{trace, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// These are hardcoded backups used when the config file is missing or incomplete
pub static CONFIG_FILE: &str = "/etc/fpga-cfg/config.toml";
pub static FW_PREFIX: &str = "/lib/firmware/";
pub static SYSFS_PREFIX: &str = "/sys/class/fpga_manager/";
pub static PCI_DEVICES_DIR: &str = "/sys/bus/pci/devices/";
pub static MODULE_PARAMS_DIR: &str = "/sys/module/";
pub static MODPROBE_PATH: &str = "/sbin/modprobe";
pub static DEFAULT_MFD_DRIVER: &str = "fpga_mfd";
pub static CVP_DRIVER: &str = "altera-cvp";

/// Modules loaded at startup so their managers can show up.
pub const PRELOAD_MODULES: [&str; 5] = [
    "fpga-mgr",
    "altera-ps-spi",
    "xilinx-spi",
    "altera-cvp",
    "fpga-mfd",
];

pub const HISTORY_ENTRIES_MIN: usize = 500;
pub const HISTORY_ENTRIES_MAX: usize = 10000;
pub const HISTORY_ENTRIES_DFLT: usize = 5000;

pub const UNBIND_TIMEOUT_MS: u64 = 500;
pub const BIND_TIMEOUT_MS: u64 = 1000;
pub const POLL_INTERVAL_MS: u64 = 100;

/// Largest accepted descriptor, in bytes.
pub const DESCRIPTOR_MAX_LEN: usize = 16 * 1024;

/// Timeouts used while waiting for the PCI bus to report driver (un)binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub unbind: Duration,
    pub bind: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            unbind: Duration::from_millis(UNBIND_TIMEOUT_MS),
            bind: Duration::from_millis(BIND_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    pub firmware_prefix: String,
    pub sys_fs_prefix: PathBuf,
    pub pci_devices_dir: PathBuf,
    /// Root of the per-module `parameters/` directories.
    pub module_params_dir: PathBuf,
    pub modprobe_path: PathBuf,
    pub default_mfd_driver: String,
    pub preload_modules: Vec<String>,
    pub history_max_entries: usize,
    pub timeouts: Timeouts,
    pub poll_interval: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            firmware_prefix: FW_PREFIX.to_string(),
            sys_fs_prefix: PathBuf::from(SYSFS_PREFIX),
            pci_devices_dir: PathBuf::from(PCI_DEVICES_DIR),
            module_params_dir: PathBuf::from(MODULE_PARAMS_DIR),
            modprobe_path: PathBuf::from(MODPROBE_PATH),
            default_mfd_driver: DEFAULT_MFD_DRIVER.to_string(),
            preload_modules: PRELOAD_MODULES.iter().map(|m| m.to_string()).collect(),
            history_max_entries: HISTORY_ENTRIES_DFLT,
            timeouts: Timeouts::default(),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
        }
    }
}

/// Clamp a requested history length into the supported range, warning when it had to move.
pub fn clamp_history_entries(requested: usize) -> usize {
    if requested < HISTORY_ENTRIES_MIN {
        warn!("Using min. history_max_entries {HISTORY_ENTRIES_MIN} instead of {requested}");
        HISTORY_ENTRIES_MIN
    } else if requested > HISTORY_ENTRIES_MAX {
        warn!("Using max. history_max_entries {HISTORY_ENTRIES_MAX} instead of {requested}");
        HISTORY_ENTRIES_MAX
    } else {
        requested
    }
}

/// This is the top level struct which holds all sections
#[derive(Debug, Deserialize)]
struct TomlConfig {
    defaults: Option<DefaultsToml>,
}

/// This is the "defaults" struct
#[derive(Debug, Deserialize)]
struct DefaultsToml {
    firmware_prefix: Option<String>,
    sys_fs_prefix: Option<String>,
    pci_devices_dir: Option<String>,
    module_params_dir: Option<String>,
    modprobe_path: Option<String>,
    default_mfd_driver: Option<String>,
    preload_modules: Option<Vec<String>>,
    history_max_entries: Option<usize>,
    unbind_timeout_ms: Option<u64>,
    bind_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl From<DefaultsToml> for SystemConfig {
    fn from(value: DefaultsToml) -> Self {
        trace!("User provided config: {value:?}");
        let defaults = SystemConfig::default();
        SystemConfig {
            firmware_prefix: value.firmware_prefix.unwrap_or_else(|| {
                trace!("No firmware_prefix provided. Using hardcoded value.");
                defaults.firmware_prefix
            }),
            sys_fs_prefix: value
                .sys_fs_prefix
                .map(PathBuf::from)
                .unwrap_or(defaults.sys_fs_prefix),
            pci_devices_dir: value
                .pci_devices_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.pci_devices_dir),
            module_params_dir: value
                .module_params_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.module_params_dir),
            modprobe_path: value
                .modprobe_path
                .map(PathBuf::from)
                .unwrap_or(defaults.modprobe_path),
            default_mfd_driver: value
                .default_mfd_driver
                .unwrap_or(defaults.default_mfd_driver),
            preload_modules: value
                .preload_modules
                .unwrap_or(defaults.preload_modules),
            history_max_entries: value
                .history_max_entries
                .map(clamp_history_entries)
                .unwrap_or(defaults.history_max_entries),
            timeouts: Timeouts {
                unbind: value
                    .unbind_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.timeouts.unbind),
                bind: value
                    .bind_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.timeouts.bind),
            },
            poll_interval: value
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

/// Parse config file contents. `file` is only used for error reporting.
pub fn config_from_str(toml_string: &str, file: &Path) -> Result<SystemConfig, FpgaCfgError> {
    let config: TomlConfig = toml::from_str(toml_string).map_err(|e| FpgaCfgError::TomlDe {
        file: file.to_path_buf(),
        e,
    })?;
    match config.defaults {
        Some(defaults_toml) => Ok(defaults_toml.into()),
        None => Err(FpgaCfgError::Internal(
            "config file did not contain a `[defaults]` section.".to_string(),
        )),
    }
}

fn config_from_file(config_path: &Path) -> Result<SystemConfig, FpgaCfgError> {
    if !config_path.is_file() {
        return Err(FpgaCfgError::Internal(format!(
            "Config file not found in {config_path:?}. Using hardcoded defaults"
        )));
    }
    let toml_string = fs_read(config_path)?;
    config_from_str(&toml_string, config_path)
}

/// Load the system config, falling back to defaults on any failure.
pub fn load_system_config(config_path: &Path) -> SystemConfig {
    match config_from_file(config_path) {
        Ok(config) => {
            trace!("Successfully loaded config: {config:?}");
            config
        }
        Err(e) => {
            warn!("Using hardcoded defaults because failed to load config: {e}");
            SystemConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::below_min(10, HISTORY_ENTRIES_MIN)]
    #[case::at_min(500, 500)]
    #[case::default(5000, 5000)]
    #[case::above_max(20000, HISTORY_ENTRIES_MAX)]
    fn history_entries_are_clamped(#[case] requested: usize, #[case] expected: usize) {
        assert_that!(clamp_history_entries(requested), eq(expected));
    }

    #[gtest]
    fn partial_defaults_keep_hardcoded_values() {
        let config = config_from_str(
            "[defaults]\nfirmware_prefix = \"/opt/fw/\"\nbind_timeout_ms = 20\n",
            Path::new("test.toml"),
        )
        .unwrap();
        assert_that!(config.firmware_prefix, eq("/opt/fw/"));
        assert_that!(config.timeouts.bind, eq(Duration::from_millis(20)));
        assert_that!(
            config.timeouts.unbind,
            eq(Duration::from_millis(UNBIND_TIMEOUT_MS))
        );
        assert_that!(config.history_max_entries, eq(HISTORY_ENTRIES_DFLT));
    }

    #[gtest]
    fn preload_modules_can_be_replaced() {
        let default = SystemConfig::default();
        assert_that!(default.preload_modules.len(), eq(PRELOAD_MODULES.len()));
        assert_that!(
            default.preload_modules.first().map(String::as_str),
            some(eq("fpga-mgr"))
        );

        let config = config_from_str(
            "[defaults]\npreload_modules = [\"fpga-mgr\"]\n",
            Path::new("test.toml"),
        )
        .unwrap();
        assert_that!(config.preload_modules, elements_are![eq("fpga-mgr")]);

        let none = config_from_str("[defaults]\npreload_modules = []\n", Path::new("test.toml"))
            .unwrap();
        assert_that!(none.preload_modules, is_empty());
    }

    #[gtest]
    fn missing_defaults_section_fails() {
        let result = config_from_str("[other]\nkey = 1\n", Path::new("test.toml"));
        assert_that!(
            result,
            err(displays_as(contains_substring("[defaults]")))
        );
    }

    #[gtest]
    fn bad_toml_fails() {
        let result = config_from_str("[defaults\n", Path::new("test.toml"));
        assert_that!(
            result,
            err(displays_as(contains_substring("FpgaCfgError::TomlDe")))
        );
    }

    #[gtest]
    fn missing_file_falls_back_to_defaults() {
        let config = load_system_config(Path::new("/nonexistent/fpga-cfg.toml"));
        assert_that!(config, eq(&SystemConfig::default()));
    }
}
