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

//! Manager registry.
//!
//! Tracks FPGA managers by identity and keeps one [`ConfigInstance`] per ring or single-SPI
//! manager. Managers come and go through [`ManagerRegistry::on_backend_added`] and
//! [`ManagerRegistry::on_backend_removed`], fed by the device watcher at runtime and by tests
//! directly.

use crate::backend::{Backends, FpgaManager};
use crate::config::SystemConfig;
use crate::error::FpgaCfgError;
use crate::events::BusEventHub;
use crate::instance::{ConfigInstance, InstanceIdentity, InstanceKind};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Hands out the smallest id not in use.
#[derive(Debug, Default)]
struct IdAllocator {
    used: BTreeSet<u32>,
}

impl IdAllocator {
    fn get(&mut self) -> u32 {
        let id = (0..)
            .zip(self.used.iter())
            .find(|(expected, used)| expected != *used)
            .map(|(expected, _)| expected)
            .unwrap_or(self.used.len() as u32);
        self.used.insert(id);
        id
    }

    fn release(&mut self, id: u32) {
        self.used.remove(&id);
    }
}

#[derive(Default)]
struct Registrations {
    /// Instances keyed by manager identity.
    by_identity: BTreeMap<String, Arc<ConfigInstance>>,
    ids: IdAllocator,
}

pub struct ManagerRegistry {
    config: Arc<SystemConfig>,
    backends: Backends,
    hub: Arc<BusEventHub>,
    registrations: Mutex<Registrations>,
}

impl ManagerRegistry {
    pub fn new(config: SystemConfig, backends: Backends, hub: Arc<BusEventHub>) -> Self {
        ManagerRegistry {
            config: Arc::new(config),
            backends,
            hub,
            registrations: Mutex::new(Registrations::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registrations> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<BusEventHub> {
        &self.hub
    }

    /// Load the configured manager and driver modules. Failures are only logged.
    ///
    /// # Returns: `usize`
    /// * The number of modules that loaded
    pub fn preload_modules(&self) -> usize {
        let mut loaded = 0;
        for module in &self.config.preload_modules {
            match self.backends.modules.load_module(module, "") {
                Ok(()) => {
                    debug!("loaded module '{module}'");
                    loaded += 1;
                }
                Err(e) => warn!("Can't load {module}: {e}"),
            }
        }
        loaded
    }

    /// A manager appeared. Creates an instance if the manager drives a ring or a single SPI
    /// FPGA and is not registered yet.
    ///
    /// # Returns: `Result<Option<Arc<ConfigInstance>>, FpgaCfgError>`
    /// * `Ok(Some(instance))` - A new instance was created
    /// * `Ok(None)` - The manager needs no instance or is already registered
    /// * `Err(FpgaCfgError::Argument)` - The manager name lacks the address fields
    pub fn on_backend_added(
        &self,
        manager: Arc<dyn FpgaManager>,
    ) -> Result<Option<Arc<ConfigInstance>>, FpgaCfgError> {
        let Some(kind) = InstanceKind::from_manager_name(manager.name()) else {
            debug!(
                "no configuration instance for manager '{}' ({})",
                manager.name(),
                manager.identity()
            );
            return Ok(None);
        };

        let mut registrations = self.lock();
        if registrations.by_identity.contains_key(manager.identity()) {
            debug!("manager {} already registered", manager.identity());
            return Ok(None);
        }
        let id = registrations.ids.get();
        let identity =
            match InstanceIdentity::from_manager(kind, manager.name(), manager.identity(), id) {
                Ok(identity) => identity,
                Err(e) => {
                    registrations.ids.release(id);
                    error!("{e}");
                    return Err(e);
                }
            };
        let inst = ConfigInstance::attach(
            identity,
            manager.clone(),
            self.config.clone(),
            self.backends.clone(),
            self.hub.clone(),
        );
        registrations
            .by_identity
            .insert(manager.identity().to_string(), inst.clone());
        info!(
            "created instance {} for manager '{}'",
            inst.name(),
            manager.name()
        );
        Ok(Some(inst))
    }

    /// A manager went away. Unknown identities are ignored.
    pub fn on_backend_removed(&self, manager_identity: &str) {
        let removed = {
            let mut registrations = self.lock();
            let removed = registrations.by_identity.remove(manager_identity);
            if let Some(inst) = &removed {
                registrations.ids.release(inst.identity().id);
            }
            removed
        };
        if let Some(inst) = removed {
            info!("removing instance {}", inst.name());
            inst.detach();
        }
    }

    /// Remove every instance. Used at shutdown.
    pub fn detach_all(&self) {
        let removed: Vec<Arc<ConfigInstance>> = {
            let mut registrations = self.lock();
            let removed = std::mem::take(&mut registrations.by_identity);
            registrations.ids = IdAllocator::default();
            removed.into_values().collect()
        };
        self.backends.modules.kill_in_flight();
        for inst in removed {
            info!("removing instance {}", inst.name());
            inst.detach();
        }
    }

    /// Look up an instance by its name, e.g. `fpp_1.0`.
    pub fn instance(&self, name: &str) -> Option<Arc<ConfigInstance>> {
        self.lock()
            .by_identity
            .values()
            .find(|inst| inst.name() == name)
            .cloned()
    }

    /// Like [`ManagerRegistry::instance`] but with an error for unknown names.
    pub fn get(&self, name: &str) -> Result<Arc<ConfigInstance>, FpgaCfgError> {
        self.instance(name)
            .ok_or_else(|| FpgaCfgError::Argument(format!("no configuration instance '{name}'")))
    }

    pub fn instances(&self) -> Vec<Arc<ConfigInstance>> {
        self.lock().by_identity.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
