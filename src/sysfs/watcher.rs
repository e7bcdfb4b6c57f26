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

//! Device watcher.
//!
//! Polls the `fpga_manager` class and the PCI devices directory and turns what changed since the
//! last poll into registry and bus events:
//!
//! - a new manager directory calls [`ManagerRegistry::on_backend_added`], a vanished one calls
//!   [`ManagerRegistry::on_backend_removed`]
//! - a PCI device that appears publishes [`BusEvent::BindDriver`] so a waiting instance can set
//!   the driver override
//! - a `driver` link that appears publishes [`BusEvent::BoundDriver`], one that disappears
//!   publishes [`BusEvent::UnboundDriver`]

use crate::backend::PciAddress;
use crate::events::BusEvent;
use crate::registry::ManagerRegistry;
use crate::sysfs::fpga_manager::{SysfsFpgaManager, list_fpga_managers};
use crate::sysfs::pci::SysfsPciBus;
use crate::system_io::fs_read_dir;
use log::{error, trace, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Snapshot {
    managers: BTreeSet<String>,
    /// PCI devices and their bound driver.
    devices: BTreeMap<PciAddress, Option<String>>,
}

pub struct DeviceWatcher {
    registry: Arc<ManagerRegistry>,
    bus: SysfsPciBus,
    sys_fs_prefix: PathBuf,
    last: Mutex<Snapshot>,
}

impl DeviceWatcher {
    pub fn new(registry: Arc<ManagerRegistry>, bus: SysfsPciBus) -> Self {
        let sys_fs_prefix = registry.config().sys_fs_prefix.clone();
        DeviceWatcher {
            registry,
            bus,
            sys_fs_prefix,
            last: Mutex::new(Snapshot::default()),
        }
    }

    fn scan_managers(&self) -> BTreeSet<String> {
        match list_fpga_managers(&self.sys_fs_prefix) {
            Ok(handles) => handles.into_iter().collect(),
            Err(e) => {
                trace!("{e}");
                BTreeSet::new()
            }
        }
    }

    fn scan_devices(&self) -> BTreeMap<PciAddress, Option<String>> {
        let names = match fs_read_dir(self.bus.devices_dir()) {
            Ok(names) => names,
            Err(e) => {
                trace!("{e}");
                return BTreeMap::new();
            }
        };
        names
            .iter()
            .filter_map(|name| {
                PciAddress::from_sysfs_name(name).map(|addr| (addr, self.bus.driver_of(name)))
            })
            .collect()
    }

    /// Compare the system with the last poll and report the differences.
    pub fn poll_once(&self) {
        let managers = self.scan_managers();
        let devices = self.scan_devices();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);

        for handle in last.managers.difference(&managers) {
            self.registry.on_backend_removed(handle);
        }
        for handle in managers.difference(&last.managers) {
            match SysfsFpgaManager::open(&self.sys_fs_prefix, handle) {
                Ok(manager) => {
                    if let Err(e) = self.registry.on_backend_added(Arc::new(manager)) {
                        warn!("{handle}: {e}");
                    }
                }
                Err(e) => error!("{e}"),
            }
        }

        let hub = self.registry.hub();
        for (addr, driver) in &last.devices {
            if driver.is_some() && devices.get(addr).is_none_or(|now| now != driver) {
                hub.publish(&BusEvent::UnboundDriver { addr: *addr });
            }
        }
        for (addr, driver) in &devices {
            let before = last.devices.get(addr);
            if before.is_none() {
                hub.publish(&BusEvent::BindDriver {
                    addr: *addr,
                    driver: driver.clone(),
                });
            }
            if let Some(name) = driver
                && before.is_none_or(|was| was.as_ref() != Some(name))
            {
                hub.publish(&BusEvent::BoundDriver {
                    addr: *addr,
                    driver: name.clone(),
                });
            }
        }

        *last = Snapshot { managers, devices };
    }

    /// Poll forever on the tokio runtime. Scans run on the blocking pool.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let watcher = self.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || watcher.poll_once()).await {
                error!("device watcher poll failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backends, ModuleLoader, PciBus, StatusNotifier};
    use crate::config::SystemConfig;
    use crate::events::BusEventHub;
    use crate::sysfs::test_tree::TestTree;
    use googletest::prelude::*;

    struct Silent;
    impl StatusNotifier for Silent {
        fn notify(&self, _instance: &str, _attribute: &str) {}
    }
    struct NoModules;
    impl ModuleLoader for NoModules {
        fn load_module(&self, _name: &str, _args: &str) -> Result<(), crate::error::FpgaCfgError> {
            Ok(())
        }
    }

    struct Fixture {
        tree: TestTree,
        registry: Arc<ManagerRegistry>,
        watcher: DeviceWatcher,
        events: Arc<Mutex<Vec<BusEvent>>>,
    }

    fn fixture(tag: &str) -> Fixture {
        let tree = TestTree::new(tag);
        tree.dir("class");
        tree.dir("bus/devices");
        tree.dir("module");
        let config = SystemConfig {
            sys_fs_prefix: tree.path().join("class"),
            pci_devices_dir: tree.path().join("bus/devices"),
            module_params_dir: tree.path().join("module"),
            ..SystemConfig::default()
        };
        let bus = SysfsPciBus::new(
            &config.pci_devices_dir,
            &config.module_params_dir,
            &config.sys_fs_prefix,
        );
        let backends = Backends {
            bus: Arc::new(bus.clone()) as Arc<dyn PciBus>,
            modules: Arc::new(NoModules),
            notifier: Arc::new(Silent),
        };
        let hub = Arc::new(BusEventHub::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        hub.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        let registry = Arc::new(ManagerRegistry::new(config, backends, hub));
        let watcher = DeviceWatcher::new(registry.clone(), bus);
        Fixture {
            tree,
            registry,
            watcher,
            events,
        }
    }

    #[gtest]
    fn managers_are_added_and_removed() {
        let f = fixture("watch-managers");
        f.tree.file("class/fpga0/name", "ftdi-fpp-fpga-mgr 1 0403:6010\n");
        f.tree.file("class/fpga1/name", "Altera CvP FPGA Manager\n");
        f.watcher.poll_once();
        expect_that!(f.registry.len(), eq(1));
        expect_that!(f.registry.instance("fpp_1.0"), some(anything()));

        f.watcher.poll_once();
        expect_that!(f.registry.len(), eq(1));

        f.tree.remove("class/fpga0");
        f.watcher.poll_once();
        expect_that!(f.registry.is_empty(), eq(true));
    }

    #[gtest]
    fn driver_changes_become_bus_events() {
        let f = fixture("watch-devices");
        let addr = PciAddress::new(3, 0, 0).unwrap();
        f.tree.dir("bus/drivers/altera-cvp");
        f.tree.dir("bus/drivers/fpga_mfd");

        f.tree.dir("bus/devices/0000:03:00.0");
        f.watcher.poll_once();
        f.tree
            .symlink("bus/drivers/altera-cvp", "bus/devices/0000:03:00.0/driver");
        f.watcher.poll_once();
        f.tree.remove("bus/devices/0000:03:00.0/driver");
        f.tree
            .symlink("bus/drivers/fpga_mfd", "bus/devices/0000:03:00.0/driver");
        f.watcher.poll_once();
        f.tree.remove("bus/devices/0000:03:00.0");
        f.watcher.poll_once();

        assert_that!(
            *f.events.lock().unwrap(),
            elements_are![
                eq(&BusEvent::BindDriver { addr, driver: None }),
                eq(&BusEvent::BoundDriver {
                    addr,
                    driver: "altera-cvp".to_string()
                }),
                eq(&BusEvent::UnboundDriver { addr }),
                eq(&BusEvent::BoundDriver {
                    addr,
                    driver: "fpga_mfd".to_string()
                }),
                eq(&BusEvent::UnboundDriver { addr }),
            ]
        );
    }
}
