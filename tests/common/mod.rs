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

//! In-memory collaborators for driving configuration instances without hardware.

#![allow(dead_code)]

use fpga_cfg::backend::{
    Backends, FpgaManager, ImageInfo, ModuleLoader, PciAddress, PciBus, StatusNotifier,
};
use fpga_cfg::config::{SystemConfig, Timeouts};
use fpga_cfg::error::FpgaCfgError;
use fpga_cfg::events::{BusEvent, BusEventHub};
use fpga_cfg::instance::ConfigInstance;
use fpga_cfg::registry::ManagerRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FPP_MANAGER: &str = "ftdi-fpp-fpga-mgr 1 0403:6010";
pub const SPI_RING_MANAGER: &str = "altera-ps-spi spi1.0";
pub const SPI_SINGLE_MANAGER: &str = "xlnx-slave-spi spi2.0";
pub const CVP_MANAGER: &str = "Altera CvP FPGA Manager";

pub const FPGA_ADDR: PciAddress = PciAddress {
    bus: 3,
    dev: 0,
    func: 0,
};

type Hook = Box<dyn Fn() + Send + Sync>;

pub struct MockManager {
    identity: String,
    name: String,
    loads: Mutex<Vec<(String, u32)>>,
    fail: Mutex<bool>,
    after_load: Mutex<Option<Hook>>,
}

impl MockManager {
    pub fn new(identity: &str, name: &str) -> Arc<Self> {
        Arc::new(MockManager {
            identity: identity.to_string(),
            name: name.to_string(),
            loads: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
            after_load: Mutex::new(None),
        })
    }

    /// `(firmware name, flags)` of every load so far.
    pub fn loads(&self) -> Vec<(String, u32)> {
        self.loads.lock().unwrap().clone()
    }

    pub fn fail_loads(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Run `hook` after every successful load, e.g. to simulate the FPGA showing up on the bus.
    pub fn after_load(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.after_load.lock().unwrap() = Some(Box::new(hook));
    }
}

impl FpgaManager for MockManager {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, info: &ImageInfo) -> Result<(), FpgaCfgError> {
        if *self.fail.lock().unwrap() {
            return Err(FpgaCfgError::LoadFailed {
                manager: self.name.clone(),
                firmware: info.firmware_name.clone(),
                reason: "state is 'write error'".to_string(),
            });
        }
        self.loads
            .lock()
            .unwrap()
            .push((info.firmware_name.clone(), info.flags));
        if let Some(hook) = self.after_load.lock().unwrap().as_ref() {
            hook();
        }
        Ok(())
    }
}

#[derive(Default)]
struct BusState {
    present: HashSet<PciAddress>,
    drivers: HashMap<PciAddress, String>,
    overrides: HashMap<PciAddress, String>,
    managers: HashMap<PciAddress, Arc<MockManager>>,
    binds: Vec<(PciAddress, String)>,
    unbinds: Vec<PciAddress>,
    driver_args: Vec<(PciAddress, String, String)>,
    bind_fails: bool,
    silent: bool,
}

/// A PCI bus that reports (un)binding through the hub unless it is made silent.
pub struct MockBus {
    hub: Arc<BusEventHub>,
    state: Mutex<BusState>,
}

impl MockBus {
    pub fn new(hub: Arc<BusEventHub>) -> Arc<Self> {
        Arc::new(MockBus {
            hub,
            state: Mutex::new(BusState::default()),
        })
    }

    pub fn add_device(&self, addr: PciAddress, driver: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.present.insert(addr);
        if let Some(driver) = driver {
            state.drivers.insert(addr, driver.to_string());
        }
    }

    /// `manager` configures the FPGA behind `addr` (CvP or PR).
    pub fn add_manager(&self, addr: PciAddress, manager: Arc<MockManager>) {
        self.state.lock().unwrap().managers.insert(addr, manager);
    }

    /// Swallow bus events, as if the kernel never reported them.
    pub fn silence(&self) {
        self.state.lock().unwrap().silent = true;
    }

    pub fn fail_binds(&self) {
        self.state.lock().unwrap().bind_fails = true;
    }

    /// The FPGA appears at `addr` and `probing` probes it, honouring the driver override.
    pub fn hotplug(&self, addr: PciAddress, probing: &str) {
        {
            self.state.lock().unwrap().present.insert(addr);
        }
        self.publish(BusEvent::BindDriver {
            addr,
            driver: Some(probing.to_string()),
        });
        let driver = {
            let mut state = self.state.lock().unwrap();
            let driver = state
                .overrides
                .get(&addr)
                .cloned()
                .unwrap_or_else(|| probing.to_string());
            state.drivers.insert(addr, driver.clone());
            driver
        };
        self.publish(BusEvent::BoundDriver { addr, driver });
    }

    fn publish(&self, event: BusEvent) {
        if !self.state.lock().unwrap().silent {
            self.hub.publish(&event);
        }
    }

    pub fn binds(&self) -> Vec<(PciAddress, String)> {
        self.state.lock().unwrap().binds.clone()
    }

    pub fn unbinds(&self) -> Vec<PciAddress> {
        self.state.lock().unwrap().unbinds.clone()
    }

    pub fn bound_driver_of(&self, addr: PciAddress) -> Option<String> {
        self.state.lock().unwrap().drivers.get(&addr).cloned()
    }

    pub fn driver_override(&self, addr: PciAddress) -> Option<String> {
        self.state.lock().unwrap().overrides.get(&addr).cloned()
    }

    pub fn driver_args(&self) -> Vec<(PciAddress, String, String)> {
        self.state.lock().unwrap().driver_args.clone()
    }
}

impl PciBus for MockBus {
    fn device_present(&self, addr: PciAddress) -> bool {
        self.state.lock().unwrap().present.contains(&addr)
    }

    fn bound_driver(&self, addr: PciAddress) -> Option<String> {
        self.state.lock().unwrap().drivers.get(&addr).cloned()
    }

    fn unbind(&self, addr: PciAddress) -> Result<(), FpgaCfgError> {
        let was_bound = {
            let mut state = self.state.lock().unwrap();
            state.unbinds.push(addr);
            state.drivers.remove(&addr).is_some()
        };
        if was_bound {
            self.publish(BusEvent::UnboundDriver { addr });
        }
        Ok(())
    }

    fn bind(&self, addr: PciAddress, driver: &str) -> Result<(), FpgaCfgError> {
        {
            let mut state = self.state.lock().unwrap();
            state.binds.push((addr, driver.to_string()));
            if state.bind_fails {
                return Err(FpgaCfgError::Internal(format!("{driver} refused {addr}")));
            }
            state.overrides.insert(addr, driver.to_string());
            state.drivers.insert(addr, driver.to_string());
        }
        self.publish(BusEvent::BoundDriver {
            addr,
            driver: driver.to_string(),
        });
        Ok(())
    }

    fn set_driver_override(&self, addr: PciAddress, driver: &str) -> Result<(), FpgaCfgError> {
        self.state
            .lock()
            .unwrap()
            .overrides
            .insert(addr, driver.to_string());
        Ok(())
    }

    fn pass_driver_args(
        &self,
        addr: PciAddress,
        driver: &str,
        args: &str,
    ) -> Result<(), FpgaCfgError> {
        self.state
            .lock()
            .unwrap()
            .driver_args
            .push((addr, driver.to_string(), args.to_string()));
        Ok(())
    }

    fn acquire_manager(&self, addr: PciAddress) -> Result<Arc<dyn FpgaManager>, FpgaCfgError> {
        let state = self.state.lock().unwrap();
        match state.managers.get(&addr) {
            Some(manager) => Ok(manager.clone()),
            None => Err(FpgaCfgError::Argument(format!("no manager behind {addr}"))),
        }
    }
}

#[derive(Default)]
pub struct MockModules {
    loaded: Mutex<Vec<(String, String)>>,
    missing: Mutex<Vec<String>>,
    kills: Mutex<usize>,
}

impl MockModules {
    pub fn loaded(&self) -> Vec<(String, String)> {
        self.loaded.lock().unwrap().clone()
    }

    /// Make loads of `name` fail.
    pub fn make_missing(&self, name: &str) {
        self.missing.lock().unwrap().push(name.to_string());
    }

    pub fn kills(&self) -> usize {
        *self.kills.lock().unwrap()
    }
}

impl ModuleLoader for MockModules {
    fn load_module(&self, name: &str, args: &str) -> Result<(), FpgaCfgError> {
        if self.missing.lock().unwrap().iter().any(|m| m == name) {
            return Err(FpgaCfgError::Internal(format!("module {name} not found")));
        }
        self.loaded
            .lock()
            .unwrap()
            .push((name.to_string(), args.to_string()));
        Ok(())
    }

    fn kill_in_flight(&self) {
        *self.kills.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// Attributes reported for `instance`, in order.
    pub fn attributes(&self, instance: &str) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == instance)
            .map(|(_, attribute)| attribute.clone())
            .collect()
    }
}

impl StatusNotifier for RecordingNotifier {
    fn notify(&self, instance: &str, attribute: &str) {
        self.seen
            .lock()
            .unwrap()
            .push((instance.to_string(), attribute.to_string()));
    }
}

/// Defaults with waits short enough for tests.
pub fn test_config() -> SystemConfig {
    SystemConfig {
        timeouts: Timeouts {
            unbind: Duration::from_millis(50),
            bind: Duration::from_millis(100),
        },
        ..SystemConfig::default()
    }
}

pub struct Harness {
    pub hub: Arc<BusEventHub>,
    pub bus: Arc<MockBus>,
    pub modules: Arc<MockModules>,
    pub notifier: Arc<RecordingNotifier>,
    pub registry: ManagerRegistry,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SystemConfig) -> Self {
        let hub = Arc::new(BusEventHub::new());
        let bus = MockBus::new(hub.clone());
        let modules = Arc::new(MockModules::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let backends = Backends {
            bus: bus.clone(),
            modules: modules.clone(),
            notifier: notifier.clone(),
        };
        let registry = ManagerRegistry::new(config, backends, hub.clone());
        Harness {
            hub,
            bus,
            modules,
            notifier,
            registry,
        }
    }

    /// Register a manager and return the instance created for it.
    pub fn attach(&self, identity: &str, name: &str) -> (Arc<MockManager>, Arc<ConfigInstance>) {
        let manager = MockManager::new(identity, name);
        let inst = self
            .registry
            .on_backend_added(manager.clone())
            .unwrap()
            .unwrap();
        (manager, inst)
    }
}

/// Wrap descriptor lines in the `{`/`}` frame.
pub fn descriptor(lines: &[&str]) -> Vec<u8> {
    let mut text = String::from("{\n");
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("}\n");
    text.into_bytes()
}
