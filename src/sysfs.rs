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

//! Linux implementations of the collaborator traits.
//!
//! - [`fpga_manager`] - managers in `/sys/class/fpga_manager`
//! - [`pci`] - driver (un)binding through `/sys/bus/pci`
//! - [`modprobe`] - module loading through `/sbin/modprobe`
//! - [`watcher`] - polling device watcher feeding the registry and the bus event hub

pub mod fpga_manager;
pub mod modprobe;
pub mod pci;
pub mod watcher;

use crate::backend::{Backends, StatusNotifier};
use crate::config::SystemConfig;
use std::sync::Arc;

/// Bind the collaborator traits to sysfs, reporting status changes to `notifier`.
pub fn sysfs_backends(config: &SystemConfig, notifier: Arc<dyn StatusNotifier>) -> Backends {
    Backends {
        bus: Arc::new(sysfs_pci_bus(config)),
        modules: Arc::new(modprobe::Modprobe::new(&config.modprobe_path)),
        notifier,
    }
}

pub fn sysfs_pci_bus(config: &SystemConfig) -> pci::SysfsPciBus {
    pci::SysfsPciBus::new(
        &config.pci_devices_dir,
        &config.module_params_dir,
        &config.sys_fs_prefix,
    )
}

#[cfg(test)]
pub(crate) mod test_tree {
    //! Throwaway directory trees standing in for sysfs.

    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    pub struct TestTree {
        root: PathBuf,
    }

    impl TestTree {
        pub fn new(tag: &str) -> Self {
            let root = std::env::temp_dir().join(format!(
                "fpga-cfg-{tag}-{}-{}",
                std::process::id(),
                COUNTER.fetch_add(1, Ordering::Relaxed)
            ));
            std::fs::create_dir_all(&root).unwrap();
            TestTree { root }
        }

        pub fn path(&self) -> &Path {
            &self.root
        }

        pub fn dir(&self, rel: &str) {
            std::fs::create_dir_all(self.root.join(rel)).unwrap();
        }

        pub fn file(&self, rel: &str, contents: &str) {
            let path = self.root.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }

        /// Create `link_rel` pointing at `target_rel`.
        pub fn symlink(&self, target_rel: &str, link_rel: &str) {
            std::os::unix::fs::symlink(self.root.join(target_rel), self.root.join(link_rel))
                .unwrap();
        }

        pub fn read(&self, rel: &str) -> String {
            std::fs::read_to_string(self.root.join(rel)).unwrap()
        }

        pub fn remove(&self, rel: &str) {
            let path = self.root.join(rel);
            if std::fs::symlink_metadata(&path).unwrap().is_dir() {
                std::fs::remove_dir_all(path).unwrap();
            } else {
                std::fs::remove_file(path).unwrap();
            }
        }
    }

    impl Drop for TestTree {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}
