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

//! Configuration instances.
//!
//! One [`ConfigInstance`] exists per ring or single-SPI FPGA manager. It owns everything a load
//! needs: the fields set by descriptors, counters, the history log and the bind waiter. Loads on
//! one instance are serialized; queries never wait for a load to finish.

use crate::backend::{Backends, FpgaManager};
use crate::config::SystemConfig;
use crate::descriptor::keys::Group;
use crate::descriptor::parser::leading_int;
use crate::descriptor::{DescriptorFields, Operation};
use crate::error::FpgaCfgError;
use crate::events::{BusEvent, BusEventHub, SubscriptionId};
use crate::history::{HistoryLog, header_line};
use crate::sequencer::{self, SequencerState};
use crate::wait::BindWaiter;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Manager names that start with this never get an instance.
pub const CVP_MANAGER_PATTERN: &str = "Altera CvP";

/// Manager name patterns that create an instance, and what kind they create.
pub const MANAGER_PATTERNS: [(&str, InstanceKind); 3] = [
    ("ftdi-fpp-fpga-mgr", InstanceKind::FppRing),
    ("altera-ps-spi", InstanceKind::SpiRing),
    ("xlnx-slave-spi", InstanceKind::SpiSingle),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    FppRing,
    SpiRing,
    SpiSingle,
}

impl InstanceKind {
    /// The kind of instance a manager called `name` gets, if any.
    pub fn from_manager_name(name: &str) -> Option<Self> {
        if name.starts_with(CVP_MANAGER_PATTERN) {
            return None;
        }
        MANAGER_PATTERNS
            .iter()
            .find(|(pattern, _)| name.starts_with(pattern))
            .map(|(_, kind)| *kind)
    }

    /// What `spi-image` selects on this kind of instance.
    pub fn spi_operation(&self) -> Operation {
        match self {
            InstanceKind::SpiSingle => Operation::SpiSingle,
            _ => Operation::SpiRing,
        }
    }

    /// Whether the instance publishes image/meta attributes for `group`.
    pub fn exposes(&self, group: Group) -> bool {
        match group {
            Group::Fpp | Group::Pr => *self == InstanceKind::FppRing,
            Group::Spi => *self != InstanceKind::FppRing,
            Group::Cvp => *self != InstanceKind::SpiSingle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    /// Directory style name, e.g. `fpp_1.0` or `spi_spi1.0`.
    pub name: String,
    pub id: u32,
    pub kind: InstanceKind,
    /// USB id parsed from an FPP manager name.
    pub usb_dev_id: Option<String>,
    /// Identity of the manager the instance was created for.
    pub manager_identity: String,
}

impl InstanceIdentity {
    /// Derive the identity from the manager name.
    ///
    /// FPP managers are named `<pattern> <address> <usb-id>`, SPI managers `<pattern> <address>`.
    pub fn from_manager(
        kind: InstanceKind,
        manager_name: &str,
        manager_identity: &str,
        id: u32,
    ) -> Result<Self, FpgaCfgError> {
        let mut words = manager_name.split_whitespace().skip(1);
        let (name, usb_dev_id) = match kind {
            InstanceKind::FppRing => match (words.next(), words.next()) {
                (Some(addr), Some(usb_id)) => (format!("fpp_{addr}.{id}"), Some(usb_id.to_string())),
                _ => {
                    return Err(FpgaCfgError::Argument(format!(
                        "Can't find address or usb id in manager name '{manager_name}'"
                    )));
                }
            },
            InstanceKind::SpiRing | InstanceKind::SpiSingle => match words.next() {
                Some(addr) => (format!("spi_{addr}"), None),
                None => {
                    return Err(FpgaCfgError::Argument(format!(
                        "Can't find device id in manager name '{manager_name}'"
                    )));
                }
            },
        };
        Ok(InstanceIdentity {
            name,
            id,
            kind,
            usb_dev_id,
            manager_identity: manager_identity.to_string(),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ConfigInstance {
    identity: InstanceIdentity,
    config: Arc<SystemConfig>,
    manager: Arc<dyn FpgaManager>,
    backends: Backends,
    hub: Arc<BusEventHub>,
    subscription: Mutex<Option<SubscriptionId>>,
    load_lock: Mutex<()>,
    fields: Mutex<DescriptorFields>,
    state: Mutex<SequencerState>,
    cfg_seq: AtomicU64,
    pr_seq: AtomicU64,
    cfg_done: AtomicBool,
    debug: AtomicI32,
    history: HistoryLog,
    waiter: Arc<BindWaiter>,
}

impl std::fmt::Debug for ConfigInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigInstance")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl ConfigInstance {
    /// Create an instance and subscribe it to bus events.
    pub fn attach(
        identity: InstanceIdentity,
        manager: Arc<dyn FpgaManager>,
        config: Arc<SystemConfig>,
        backends: Backends,
        hub: Arc<BusEventHub>,
    ) -> Arc<Self> {
        let inst = Arc::new(ConfigInstance {
            fields: Mutex::new(DescriptorFields::new(&config.default_mfd_driver)),
            history: HistoryLog::new(config.history_max_entries),
            identity,
            config,
            manager,
            backends,
            hub,
            subscription: Mutex::new(None),
            load_lock: Mutex::new(()),
            state: Mutex::new(SequencerState::Idle),
            cfg_seq: AtomicU64::new(0),
            pr_seq: AtomicU64::new(0),
            cfg_done: AtomicBool::new(false),
            debug: AtomicI32::new(0),
            waiter: Arc::new(BindWaiter::new()),
        });

        let waiter = inst.waiter.clone();
        let bus = inst.backends.bus.clone();
        let name = inst.identity.name.clone();
        let id = inst.hub.subscribe(move |event| {
            let Some(request) = waiter.on_event(event) else {
                return;
            };
            if let Err(e) = bus.set_driver_override(request.addr, &request.driver_to_bind) {
                warn!("{name}: {e}");
            }
            if let (Some(args), BusEvent::BindDriver {
                driver: Some(probing),
                ..
            }) = (&request.driver_args, event)
            {
                info!("{name}: passing device specific driver arguments to {}", request.addr);
                if let Err(e) = bus.pass_driver_args(request.addr, probing, args) {
                    warn!("{name}: {e}");
                }
            }
        });
        *lock(&inst.subscription) = Some(id);
        debug!(
            "{}: attached to manager '{}'",
            inst.identity.name,
            inst.manager.name()
        );
        inst
    }

    /// Cancel outstanding waits, stop listening to bus events and wake whoever watches `ready`
    /// or `status`. Only the first call has an effect.
    pub fn detach(&self) {
        self.waiter.cancel();
        let Some(id) = lock(&self.subscription).take() else {
            return;
        };
        self.hub.unsubscribe(id);
        let notifier = &self.backends.notifier;
        notifier.notify(&self.identity.name, "ready");
        notifier.notify(&self.identity.name, "status");
        debug!("{}: detached", self.identity.name);
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn kind(&self) -> InstanceKind {
        self.identity.kind
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn waiter(&self) -> &BindWaiter {
        &self.waiter
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// The manager that runs `op` on this instance, if it has one.
    pub fn manager_for(&self, op: Operation) -> Option<&Arc<dyn FpgaManager>> {
        let owns = match op {
            Operation::FppRing => self.identity.kind == InstanceKind::FppRing,
            Operation::SpiRing => self.identity.kind == InstanceKind::SpiRing,
            Operation::SpiSingle => self.identity.kind == InstanceKind::SpiSingle,
            Operation::Cvp | Operation::PartialReconfig => false,
        };
        owns.then_some(&self.manager)
    }

    /// Run the configuration sequence for `descriptor`.
    ///
    /// Blocks until the sequence finishes. Concurrent loads on the same instance queue up.
    pub fn load(&self, descriptor: &[u8]) -> Result<(), FpgaCfgError> {
        let _guard = lock(&self.load_lock);
        sequencer::run(self, descriptor)
    }

    /// `1` after a successful load, `0` otherwise. Also served as `ready` and `load`.
    pub fn status(&self) -> bool {
        self.cfg_done.load(Ordering::SeqCst)
    }

    pub(crate) fn set_done(&self, done: bool) {
        self.cfg_done.store(done, Ordering::SeqCst);
    }

    pub fn state(&self) -> SequencerState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: SequencerState) {
        if self.debug_enabled() {
            debug!("{}: {state}", self.identity.name);
        }
        *lock(&self.state) = state;
    }

    pub fn debug_level(&self) -> i32 {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug_level(&self, level: i32) {
        self.debug.store(level, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_level() != 0
    }

    /// `(config sequence, PR sequence)`.
    pub fn sequence_numbers(&self) -> (u64, u64) {
        (
            self.cfg_seq.load(Ordering::SeqCst),
            self.pr_seq.load(Ordering::SeqCst),
        )
    }

    pub(crate) fn next_cfg_seq(&self) -> u64 {
        self.cfg_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn next_pr_seq(&self) -> u64 {
        self.pr_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn fields(&self) -> DescriptorFields {
        lock(&self.fields).clone()
    }

    pub(crate) fn store_fields(&self, fields: DescriptorFields) {
        *lock(&self.fields) = fields;
    }

    fn exposed_sub(&self, group: Group) -> Result<(), FpgaCfgError> {
        if self.identity.kind.exposes(group) {
            Ok(())
        } else {
            Err(FpgaCfgError::Argument(format!(
                "{} has no {} attributes",
                self.identity.name,
                group.as_str()
            )))
        }
    }

    /// Image path last set for `group`.
    pub fn image(&self, group: Group) -> Result<String, FpgaCfgError> {
        self.exposed_sub(group)?;
        Ok(lock(&self.fields).sub(group).firmware_abs.clone())
    }

    /// Metadata path last set for `group`.
    pub fn meta(&self, group: Group) -> Result<String, FpgaCfgError> {
        self.exposed_sub(group)?;
        Ok(lock(&self.fields).sub(group).metadata_abs.clone())
    }

    /// Current PR attribute names, `image<N>` and `meta<N>` for PR sequence `N`.
    pub fn pr_attribute_names(&self) -> Option<(String, String)> {
        if !self.identity.kind.exposes(Group::Pr) {
            return None;
        }
        let pr_seq = self.pr_seq.load(Ordering::SeqCst);
        Some((format!("image{pr_seq}"), format!("meta{pr_seq}")))
    }

    pub(crate) fn header_banner(&self) -> String {
        let fields = lock(&self.fields);
        header_line(&fields.fpga_type, &fields.bdf)
    }

    /// Handle a write to the history surface. `0` resets the log, other integers are ignored.
    pub fn write_history(&self, value: &str) -> Result<(), FpgaCfgError> {
        let number = leading_int(value).ok_or_else(|| {
            FpgaCfgError::Argument(format!("history expects an integer, got '{value}'"))
        })?;
        if number == 0 {
            info!("{}: history reset", self.identity.name);
            self.history.reset(self.header_banner())?;
            self.backends.notifier.notify(&self.identity.name, "history");
        }
        Ok(())
    }
}

impl Drop for ConfigInstance {
    fn drop(&mut self) {
        self.detach();
    }
}
