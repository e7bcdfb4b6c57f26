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

//! D-Bus surface of `fpga-cfgd`.
//!
//! - **Service Name**: `org.fpgacfg.daemon`
//! - **Control Interface**: `org.fpgacfg.daemon.control` at `/org/fpgacfg/daemon/control`
//! - **Status Interface**: `org.fpgacfg.daemon.status` at `/org/fpgacfg/daemon/status`
//!
//! Attribute changes reported through [`DbusNotifier`] are emitted as `StatusChanged(instance,
//! attribute)` signals on the status path.

pub mod control_interface;
pub mod status_interface;

use crate::backend::StatusNotifier;
use crate::descriptor::keys::Group;
use crate::error::FpgaCfgError;
use crate::instance::ConfigInstance;
use crate::registry::ManagerRegistry;
use log::{error, trace};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use zbus::Connection;

pub static SERVICE_NAME: &str = "org.fpgacfg.daemon";
pub static CONTROL_PATH: &str = "/org/fpgacfg/daemon/control";
pub static STATUS_PATH: &str = "/org/fpgacfg/daemon/status";
pub static STATUS_INTERFACE: &str = "org.fpgacfg.daemon.status";
pub static STATUS_CHANGED: &str = "StatusChanged";

/// A notification waiting to be emitted: `(instance, attribute)`.
pub type StatusChange = (String, String);

/// Queues attribute changes for [`forward_status_changes`].
///
/// Notifications come from the blocking pool, so they are handed over through an unbounded
/// channel instead of being emitted in place.
#[derive(Debug, Clone)]
pub struct DbusNotifier {
    tx: UnboundedSender<StatusChange>,
}

impl DbusNotifier {
    pub fn new() -> (Self, UnboundedReceiver<StatusChange>) {
        let (tx, rx) = unbounded_channel();
        (DbusNotifier { tx }, rx)
    }
}

impl StatusNotifier for DbusNotifier {
    fn notify(&self, instance: &str, attribute: &str) {
        trace!("{instance}: '{attribute}' changed");
        if self
            .tx
            .send((instance.to_string(), attribute.to_string()))
            .is_err()
        {
            trace!("no signal forwarder, dropping '{attribute}' change of {instance}");
        }
    }
}

/// Emit every queued change as a `StatusChanged` signal until all notifiers are gone.
pub async fn forward_status_changes(conn: Connection, mut rx: UnboundedReceiver<StatusChange>) {
    while let Some((instance, attribute)) = rx.recv().await {
        if let Err(e) = conn
            .emit_signal(
                None::<()>,
                STATUS_PATH,
                STATUS_INTERFACE,
                STATUS_CHANGED,
                &(instance.as_str(), attribute.as_str()),
            )
            .await
        {
            error!("failed to emit {STATUS_CHANGED} for {instance}: {e}");
        }
    }
}

/// Look up an instance by name on behalf of a D-Bus caller.
pub(crate) fn instance_for(
    registry: &ManagerRegistry,
    instance: &str,
) -> Result<Arc<ConfigInstance>, FpgaCfgError> {
    if instance.is_empty() || !instance.is_ascii() {
        return Err(FpgaCfgError::Argument(format!(
            "'{instance}' is not a valid instance name"
        )));
    }
    registry.get(instance)
}

/// Parse a group name as used in attribute names (`fpp`, `spi`, `cvp`, `pr`).
pub(crate) fn group_from_str(group: &str) -> Result<Group, FpgaCfgError> {
    Group::from_name(group).ok_or_else(|| {
        FpgaCfgError::Argument(format!(
            "unknown group '{group}', expected one of: {}",
            Group::ALL.map(|g| g.as_str()).join(", ")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::*;

    #[gtest]
    #[rstest]
    #[case::fpp("fpp", Group::Fpp)]
    #[case::pr("pr", Group::Pr)]
    fn parses_group_names(#[case] name: &str, #[case] expected: Group) {
        assert_that!(group_from_str(name), ok(eq(&expected)));
    }

    #[gtest]
    fn unknown_group_lists_the_valid_ones() {
        assert_that!(
            group_from_str("jtag"),
            err(displays_as(all![
                starts_with("FpgaCfgError::Argument"),
                contains_substring("fpp, spi, cvp, pr")
            ]))
        );
    }

    #[gtest]
    fn notifier_queues_changes_in_order() {
        let (notifier, mut rx) = DbusNotifier::new();
        notifier.notify("fpp_1.0", "status");
        notifier.notify("fpp_1.0", "history");
        let change = |attribute: &str| ("fpp_1.0".to_string(), attribute.to_string());
        expect_that!(rx.try_recv(), ok(eq(&change("status"))));
        expect_that!(rx.try_recv(), ok(eq(&change("history"))));
        expect_that!(rx.try_recv(), err(anything()));
    }

    #[gtest]
    fn notifier_survives_a_closed_channel() {
        let (notifier, rx) = DbusNotifier::new();
        drop(rx);
        notifier.notify("spi_spi1.0", "status");
    }
}
