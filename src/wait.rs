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

//! Per-instance wait for PCI driver (un)binding.
//!
//! A [`BindWaiter`] is armed for one PCI address before the action that triggers the bus event,
//! so an event that arrives before the wait starts is not lost. Bus events for the armed address
//! update the state and wake the waiting thread; the waiter disarms itself when it sees the
//! completion event. Cancellation wakes every waiter for good.

use crate::backend::PciAddress;
use crate::events::BusEvent;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signalled,
    TimedOut,
    Cancelled,
}

/// What a bind-in-progress event asks of the bus, decided by [`BindWaiter::on_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub addr: PciAddress,
    /// Driver override to set.
    pub driver_to_bind: String,
    /// Arguments to pass to the device. Only set when the probing driver is the mfd driver.
    pub driver_args: Option<String>,
}

#[derive(Debug, Default)]
struct WaitState {
    armed: Option<PciAddress>,
    bound: bool,
    /// Device seen in the last bound event.
    pci_dev: Option<PciAddress>,
    driver_to_bind: Option<String>,
    mfd_driver: String,
    mfd_driver_args: String,
    cancelled: bool,
}

#[derive(Debug, Default)]
pub struct BindWaiter {
    state: Mutex<WaitState>,
    cond: Condvar,
}

impl BindWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WaitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start watching `addr`. `bound` is the state the device is in right now.
    pub fn arm(&self, addr: PciAddress, bound: bool) {
        let mut state = self.lock();
        state.armed = Some(addr);
        state.bound = bound;
    }

    pub fn disarm(&self) {
        self.lock().armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed.is_some()
    }

    /// Driver to set as override when the device probes. `None` clears it.
    pub fn set_driver_to_bind(&self, driver: Option<&str>) {
        self.lock().driver_to_bind = driver.map(str::to_string);
    }

    /// The follow-on driver and the arguments it gets when it probes.
    pub fn set_mfd_driver(&self, driver: &str, args: &str) {
        let mut state = self.lock();
        state.mfd_driver = driver.to_string();
        state.mfd_driver_args = args.to_string();
    }

    /// Forget the device seen by the last bound event.
    pub fn clear_bound_device(&self) {
        let mut state = self.lock();
        state.pci_dev = None;
        state.bound = false;
    }

    pub fn bound_device(&self) -> Option<PciAddress> {
        self.lock().pci_dev
    }

    /// Feed a bus event. Never blocks on a wait.
    ///
    /// Returns the override and argument request the caller must forward to the bus when the
    /// event is a bind in progress for the armed device.
    pub fn on_event(&self, event: &BusEvent) -> Option<BindRequest> {
        let mut state = self.lock();
        if state.cancelled || state.armed != Some(event.addr()) {
            return None;
        }
        match event {
            BusEvent::BindDriver { addr, driver } => {
                let driver_to_bind = state.driver_to_bind.clone()?;
                let driver_args = match driver {
                    Some(probing)
                        if *probing == state.mfd_driver && !state.mfd_driver_args.is_empty() =>
                    {
                        Some(state.mfd_driver_args.clone())
                    }
                    _ => None,
                };
                Some(BindRequest {
                    addr: *addr,
                    driver_to_bind,
                    driver_args,
                })
            }
            BusEvent::BoundDriver { addr, .. } => {
                state.armed = None;
                state.bound = true;
                state.pci_dev = Some(*addr);
                self.cond.notify_all();
                None
            }
            BusEvent::UnboundDriver { .. } => {
                state.armed = None;
                state.bound = false;
                self.cond.notify_all();
                None
            }
        }
    }

    fn wait_for(&self, timeout: Duration, bound: bool) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.cancelled {
                return WaitOutcome::Cancelled;
            }
            if state.bound == bound {
                return WaitOutcome::Signalled;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            state = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wait until a driver is bound to the armed device.
    pub fn wait_bound(&self, timeout: Duration) -> WaitOutcome {
        self.wait_for(timeout, true)
    }

    /// Wait until the driver of the armed device is released.
    pub fn wait_unbound(&self, timeout: Duration) -> WaitOutcome {
        self.wait_for(timeout, false)
    }

    /// Wake every current and future wait with [`WaitOutcome::Cancelled`].
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.cancelled = true;
        state.armed = None;
        self.cond.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }
}
