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

//! PCI bus event distribution.
//!
//! Bus adapters publish driver bind/unbind events to a [`BusEventHub`]. Instances subscribe a
//! closure while they exist and drop the subscription on teardown. Callbacks run on the
//! publishing thread and must return quickly.

use crate::backend::PciAddress;
use log::trace;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A driver is about to probe `addr`. `driver` is the probing driver when the bus knows it.
    BindDriver {
        addr: PciAddress,
        driver: Option<String>,
    },
    /// `driver` finished binding to `addr`.
    BoundDriver { addr: PciAddress, driver: String },
    /// The driver of `addr` was released.
    UnboundDriver { addr: PciAddress },
}

impl BusEvent {
    pub fn addr(&self) -> PciAddress {
        match self {
            BusEvent::BindDriver { addr, .. }
            | BusEvent::BoundDriver { addr, .. }
            | BusEvent::UnboundDriver { addr } => *addr,
        }
    }
}

pub type SubscriptionId = u64;
type Callback = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
pub struct BusEventHub {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<SubscriptionId, Callback>>,
}

impl BusEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(callback));
        trace!("bus event subscription {id} added");
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            trace!("bus event subscription {id} removed");
        }
    }

    /// Deliver `event` to every subscriber, in subscription order.
    ///
    /// The subscriber list is snapshotted first so a callback may (un)subscribe.
    pub fn publish(&self, event: &BusEvent) {
        trace!("bus event {event:?}");
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    fn addr() -> PciAddress {
        PciAddress {
            bus: 3,
            dev: 0,
            func: 0,
        }
    }

    #[gtest]
    fn publish_reaches_every_subscriber() {
        let hub = BusEventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = seen.clone();
            hub.subscribe(move |event| seen.lock().unwrap().push((tag, event.addr())));
        }
        hub.publish(&BusEvent::UnboundDriver { addr: addr() });
        assert_that!(
            *seen.lock().unwrap(),
            elements_are![eq(&("a", addr())), eq(&("b", addr()))]
        );
    }

    #[gtest]
    fn unsubscribed_callbacks_are_not_called() {
        let hub = BusEventHub::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let id = hub.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        hub.publish(&BusEvent::UnboundDriver { addr: addr() });
        hub.unsubscribe(id);
        hub.unsubscribe(id);
        hub.publish(&BusEvent::UnboundDriver { addr: addr() });
        assert_that!(count.load(Ordering::SeqCst), eq(1));
        assert_that!(hub.subscriber_count(), eq(0));
    }

    #[gtest]
    fn event_address() {
        let event = BusEvent::BoundDriver {
            addr: addr(),
            driver: "fpga_mfd".to_string(),
        };
        assert_that!(event.addr(), eq(addr()));
    }
}
