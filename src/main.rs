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

//! FPGA configuration daemon (fpga-cfgd).
//!
//! Watches `/sys/class/fpga_manager` and the PCI bus, creates a configuration instance for every
//! FPP ring, SPI ring and single SPI manager, and serves loads and queries over D-Bus.
//!
//! # DBus Service
//!
//! - **Service Name**: `org.fpgacfg.daemon`
//! - **Status Interface**: `/org/fpgacfg/daemon/status` - Queries and `StatusChanged` signals
//! - **Control Interface**: `/org/fpgacfg/daemon/control` - Loads, history reset, debug level
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`, `error`
//!   or `off`). Defaults to `info`

use fpga_cfg::comm::dbus::control_interface::ControlInterface;
use fpga_cfg::comm::dbus::status_interface::StatusInterface;
use fpga_cfg::comm::dbus::{
    CONTROL_PATH, DbusNotifier, SERVICE_NAME, STATUS_PATH, forward_status_changes,
};
use fpga_cfg::config::{CONFIG_FILE, load_system_config};
use fpga_cfg::events::BusEventHub;
use fpga_cfg::history::uptime;
use fpga_cfg::registry::ManagerRegistry;
use fpga_cfg::sysfs::watcher::DeviceWatcher;
use fpga_cfg::sysfs::{sysfs_backends, sysfs_pci_bus};
use log::info;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use zbus::connection;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    // history timestamps count from here
    uptime();

    let config = load_system_config(Path::new(CONFIG_FILE));
    let (notifier, changes) = DbusNotifier::new();
    let backends = sysfs_backends(&config, Arc::new(notifier));
    let bus = sysfs_pci_bus(&config);
    let poll_interval = config.poll_interval;
    let registry = Arc::new(ManagerRegistry::new(
        config,
        backends,
        Arc::new(BusEventHub::new()),
    ));

    {
        let preloader = registry.clone();
        let loaded = tokio::task::spawn_blocking(move || preloader.preload_modules()).await?;
        info!(
            "loaded {loaded} of {} preload module(s)",
            registry.config().preload_modules.len()
        );
    }

    let watcher = Arc::new(DeviceWatcher::new(registry.clone(), bus));
    {
        let watcher = watcher.clone();
        tokio::task::spawn_blocking(move || watcher.poll_once()).await?;
    }
    info!("found {} configuration instance(s)", registry.len());
    tokio::spawn(watcher.run(poll_interval));

    let conn = connection::Builder::system()?
        .name(SERVICE_NAME)?
        .serve_at(STATUS_PATH, StatusInterface::new(registry.clone()))?
        .serve_at(CONTROL_PATH, ControlInterface::new(registry.clone()))?
        .build()
        .await?;
    tokio::spawn(forward_status_changes(conn.clone(), changes));

    info!("Started {SERVICE_NAME} dbus service");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    tokio::task::spawn_blocking(move || registry.detach_all()).await?;
    Ok(())
}
