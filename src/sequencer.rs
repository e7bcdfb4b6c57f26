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

//! Configuration sequencer.
//!
//! A load runs through these states:
//!
//! ```text
//! Idle -> Parsing -> { FppSpiLoad -> AwaitRebind | SpiSingleLoad | PrLoad } -> [CvpLoad] -> Done
//!                                                                                        \-> Failed
//! ```
//!
//! The ring loads (FPP and SPI ring) configure the periphery image, which makes the FPGA's PCIe
//! function show up on the bus. Any driver still bound to that function is released first, and
//! after the load the sequencer waits for a driver to bind again. A CvP step, if requested, then
//! loads the core image over PCIe and hands the device to the follow-on driver. Partial
//! reconfiguration and single SPI loads stand alone.
//!
//! A failed step ends the sequence. Steps that already completed are not rolled back.

use crate::backend::{FpgaManager, ImageInfo, PciAddress};
use crate::config::CVP_DRIVER;
use crate::descriptor::keys::Group;
use crate::descriptor::parser::{ParseContext, check_framing, parse_body};
use crate::descriptor::{DescriptorFields, Operation, SubDescriptor};
use crate::error::FpgaCfgError;
use crate::history::{load_record, uptime};
use crate::instance::ConfigInstance;
use crate::wait::WaitOutcome;
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Parsing,
    FppSpiLoad,
    SpiSingleLoad,
    PrLoad,
    AwaitRebind,
    CvpLoad,
    Done,
    Failed,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequencerState::Idle => "idle",
            SequencerState::Parsing => "parsing",
            SequencerState::FppSpiLoad => "ring-load",
            SequencerState::SpiSingleLoad => "spi-load",
            SequencerState::PrLoad => "pr-load",
            SequencerState::AwaitRebind => "await-rebind",
            SequencerState::CvpLoad => "cvp-load",
            SequencerState::Done => "done",
            SequencerState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Run one load on `inst`. The caller holds the instance's load lock.
pub(crate) fn run(inst: &ConfigInstance, descriptor: &[u8]) -> Result<(), FpgaCfgError> {
    let result = sequence(inst, descriptor);
    match &result {
        Ok(()) => {
            inst.set_state(SequencerState::Done);
            info!("{}: configuration done", inst.name());
        }
        Err(e) => {
            inst.set_state(SequencerState::Failed);
            warn!("{}: configuration failed: {e}", inst.name());
        }
    }
    inst.backends().notifier.notify(inst.name(), "status");
    result
}

fn sequence(inst: &ConfigInstance, descriptor: &[u8]) -> Result<(), FpgaCfgError> {
    inst.set_state(SequencerState::Parsing);
    let text = check_framing(descriptor)?;

    let config = inst.config();
    let mut fields = inst.fields();
    fields.reset_scratch(&config.default_mfd_driver);
    inst.set_done(false);

    let ctx = ParseContext {
        firmware_prefix: &config.firmware_prefix,
        spi_operation: inst.kind().spi_operation(),
        usb_dev_id: inst.identity().usb_dev_id.as_deref(),
        instance: inst.name(),
        debug: inst.debug_enabled(),
    };
    let parsed = parse_body(text, &mut fields, &ctx);
    inst.store_fields(fields.clone());
    parsed?;

    if !inst.history().has_header()
        && let Err(e) = inst.history().insert_header(inst.header_banner())
    {
        warn!("{}: {e}", inst.name());
    }

    match fields.primary {
        Some(op @ (Operation::FppRing | Operation::SpiRing)) => ring_load(inst, &fields, op)?,
        Some(Operation::SpiSingle) => return single_spi_load(inst, &fields),
        Some(Operation::PartialReconfig) => return pr_load(inst, &fields),
        Some(Operation::Cvp) | None => {}
    }

    if fields.secondary == Some(Operation::Cvp) {
        cvp_load(inst, &fields)?;
    }
    Ok(())
}

fn group_of(op: Operation) -> Group {
    match op {
        Operation::FppRing => Group::Fpp,
        Operation::SpiRing | Operation::SpiSingle => Group::Spi,
        Operation::Cvp => Group::Cvp,
        Operation::PartialReconfig => Group::Pr,
    }
}

fn manager_for<'a>(
    inst: &'a ConfigInstance,
    op: Operation,
) -> Result<&'a Arc<dyn FpgaManager>, FpgaCfgError> {
    inst.manager_for(op).ok_or_else(|| {
        FpgaCfgError::NoSuitableBackend(format!(
            "{} has no manager for {op} configuration",
            inst.name()
        ))
    })
}

fn load_image(
    manager: &dyn FpgaManager,
    sub: &SubDescriptor,
    flags: u32,
) -> Result<(), FpgaCfgError> {
    manager
        .load(&ImageInfo::new(&sub.firmware, flags))
        .map_err(|e| match e {
            FpgaCfgError::LoadFailed { .. } => e,
            other => FpgaCfgError::LoadFailed {
                manager: manager.name().to_string(),
                firmware: sub.firmware.clone(),
                reason: other.to_string(),
            },
        })
}

/// Count a successful load step and log it. A full history only costs the record.
fn record_load(inst: &ConfigInstance, sub: &SubDescriptor) -> u64 {
    inst.set_done(true);
    let seq = inst.next_cfg_seq();
    let record = load_record(uptime(), seq, &sub.firmware_abs, &sub.metadata_abs);
    if let Err(e) = inst.history().append(record) {
        warn!("{}: {e}", inst.name());
    }
    inst.backends().notifier.notify(inst.name(), "history");
    seq
}

/// The PCIe function of the FPGA, if it is on the bus.
fn find_pci_dev(inst: &ConfigInstance, fields: &DescriptorFields) -> Option<PciAddress> {
    let present = inst.backends().bus.device_present(fields.pci);
    if inst.debug_enabled() {
        if present {
            debug!("{}: found PCIe device {}", inst.name(), fields.pci);
        } else {
            debug!("{}: can't find PCIe device '{}'", inst.name(), fields.bdf);
        }
    }
    present.then_some(fields.pci)
}

fn unbind_old_driver(inst: &ConfigInstance, addr: PciAddress) -> Result<(), FpgaCfgError> {
    let bus = &inst.backends().bus;
    let waiter = inst.waiter();
    let timeout = inst.config().timeouts.unbind;

    waiter.arm(addr, true);
    if let Err(e) = bus.unbind(addr) {
        warn!("{}: {e}", inst.name());
    }
    match waiter.wait_unbound(timeout) {
        WaitOutcome::Signalled => {}
        WaitOutcome::Cancelled => {
            return Err(FpgaCfgError::Cancelled(format!(
                "{}: instance removed while waiting for {addr} to unbind",
                inst.name()
            )));
        }
        WaitOutcome::TimedOut => {
            warn!("{}: PCI device {addr} unbind timeout", inst.name());
            if bus.bound_driver(addr).is_some()
                && let Err(e) = bus.unbind(addr)
            {
                warn!("{}: fallback unbind failed: {e}", inst.name());
            }
        }
    }
    waiter.disarm();
    Ok(())
}

fn ring_load(
    inst: &ConfigInstance,
    fields: &DescriptorFields,
    op: Operation,
) -> Result<(), FpgaCfgError> {
    inst.set_state(SequencerState::FppSpiLoad);
    let manager = manager_for(inst, op)?;
    let bus = &inst.backends().bus;
    let waiter = inst.waiter();
    let addr = fields.pci;

    match find_pci_dev(inst, fields) {
        Some(dev) if bus.bound_driver(dev).is_some() => unbind_old_driver(inst, dev)?,
        Some(_) => {}
        None => {
            if inst.debug_enabled() {
                debug!("{}: no FPGA yet, loading periphery image", inst.name());
            }
        }
    }

    // Nothing uses the FPGA anymore, so the periphery image can go in.
    waiter.clear_bound_device();
    let driver_to_bind = if fields.secondary == Some(Operation::Cvp) {
        CVP_DRIVER
    } else {
        fields.mfd_driver.as_str()
    };
    waiter.set_driver_to_bind(Some(driver_to_bind));
    waiter.set_mfd_driver(&fields.mfd_driver, &fields.mfd_driver_args);
    waiter.arm(addr, false);

    let flags = if op == Operation::SpiRing && fields.bs_lsb_first {
        ImageInfo::BITSTREAM_LSB_FIRST
    } else {
        0
    };
    let sub = fields.sub(group_of(op));
    if inst.debug_enabled() {
        debug!("{}: {op} cfg step start", inst.name());
    }
    if let Err(e) = load_image(manager.as_ref(), sub, flags) {
        waiter.disarm();
        return Err(e);
    }
    record_load(inst, sub);
    if inst.debug_enabled() {
        debug!("{}: {op} cfg step done, waiting for PCIe hotplug", inst.name());
    }

    inst.set_state(SequencerState::AwaitRebind);
    match waiter.wait_bound(inst.config().timeouts.bind) {
        WaitOutcome::Signalled => {
            if inst.debug_enabled() {
                debug!(
                    "{}: PCIe FPGA {:?} driver bound",
                    inst.name(),
                    waiter.bound_device()
                );
            }
            Ok(())
        }
        WaitOutcome::Cancelled => Err(FpgaCfgError::Cancelled(format!(
            "{}: instance removed while waiting for {addr} to bind",
            inst.name()
        ))),
        WaitOutcome::TimedOut => {
            waiter.disarm();
            let timeout = FpgaCfgError::BindTimeout {
                device: addr.to_string(),
                timeout_ms: inst.config().timeouts.bind.as_millis() as u64,
            };
            warn!("{}: {timeout}", inst.name());
            fallback_bind(inst, addr, driver_to_bind, timeout)
        }
    }
}

/// Bind `driver` to `addr` once, synchronously, after a missed bind event.
///
/// A device that never showed up can't be bound, so `timeout` is returned as is.
fn fallback_bind(
    inst: &ConfigInstance,
    addr: PciAddress,
    driver: &str,
    timeout: FpgaCfgError,
) -> Result<(), FpgaCfgError> {
    let bus = &inst.backends().bus;
    if !bus.device_present(addr) {
        return Err(timeout);
    }
    bus.bind(addr, driver)
        .map_err(|e| FpgaCfgError::BindFailed {
            driver: driver.to_string(),
            device: addr.to_string(),
            reason: e.to_string(),
        })?;
    info!("{}: bound '{driver}' to {addr} after timeout", inst.name());
    Ok(())
}

fn single_spi_load(inst: &ConfigInstance, fields: &DescriptorFields) -> Result<(), FpgaCfgError> {
    inst.set_state(SequencerState::SpiSingleLoad);
    let manager = manager_for(inst, Operation::SpiSingle)?;
    if inst.debug_enabled() {
        debug!("{}: SPI cfg step start", inst.name());
    }
    load_image(manager.as_ref(), &fields.spi, 0)?;
    record_load(inst, &fields.spi);
    if inst.debug_enabled() {
        debug!("{}: SPI cfg step done", inst.name());
    }
    Ok(())
}

fn acquire(
    inst: &ConfigInstance,
    addr: PciAddress,
    what: &str,
) -> Result<Arc<dyn FpgaManager>, FpgaCfgError> {
    let manager = inst
        .backends()
        .bus
        .acquire_manager(addr)
        .map_err(|e| FpgaCfgError::BackendAcquireFailed {
            device: addr.to_string(),
            reason: e.to_string(),
        })?;
    if inst.debug_enabled() {
        debug!("{}: using {what} manager '{}'", inst.name(), manager.name());
    }
    Ok(manager)
}

fn pr_load(inst: &ConfigInstance, fields: &DescriptorFields) -> Result<(), FpgaCfgError> {
    inst.set_state(SequencerState::PrLoad);
    let addr = find_pci_dev(inst, fields).ok_or_else(|| {
        FpgaCfgError::NoSuitableBackend(format!("PR PCIe device '{}' not found", fields.bdf))
    })?;
    let manager = acquire(inst, addr, "PR")?;
    load_image(manager.as_ref(), &fields.pr, ImageInfo::PARTIAL_RECONFIG)?;
    record_load(inst, &fields.pr);
    drop(manager);
    let pr_seq = inst.next_pr_seq();
    if inst.debug_enabled() {
        debug!("{}: PR cfg step {pr_seq} done", inst.name());
    }

    let notifier = &inst.backends().notifier;
    if let Some((image, meta)) = inst.pr_attribute_names() {
        notifier.pr_attributes_changed(inst.name(), &image, &meta);
    }
    notifier.notify(inst.name(), "ready");
    Ok(())
}

fn cvp_load(inst: &ConfigInstance, fields: &DescriptorFields) -> Result<(), FpgaCfgError> {
    inst.set_state(SequencerState::CvpLoad);
    inst.set_done(false);
    let waiter = inst.waiter();
    waiter.set_driver_to_bind(None);

    let addr = waiter
        .bound_device()
        .or_else(|| find_pci_dev(inst, fields))
        .ok_or_else(|| {
            FpgaCfgError::NoSuitableBackend(format!(
                "PCIe FPGA device '{}' for CvP not found",
                fields.bdf
            ))
        })?;
    let manager = acquire(inst, addr, "CvP")?;
    load_image(manager.as_ref(), &fields.cvp, 0)?;
    record_load(inst, &fields.cvp);
    drop(manager);
    if inst.debug_enabled() {
        debug!("{}: CvP cfg step done", inst.name());
    }

    // Hand the device from the CvP driver to the follow-on driver.
    let backends = inst.backends();
    if let Err(e) = backends.bus.unbind(addr) {
        warn!("{}: {e}", inst.name());
    }
    if let Err(e) = backends
        .modules
        .load_module(&fields.mfd_driver, &fields.mfd_driver_args)
    {
        warn!(
            "{}: failed to load module '{} {}': {e}",
            inst.name(),
            fields.mfd_driver,
            fields.mfd_driver_args
        );
    }
    waiter.set_driver_to_bind(Some(&fields.mfd_driver));
    waiter.arm(addr, false);
    if let Err(e) = backends.bus.bind(addr, &fields.mfd_driver) {
        error!("{}: PCIe dev bind error: {e}", inst.name());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backends, ModuleLoader, PciBus, StatusNotifier};
    use crate::config::SystemConfig;
    use crate::events::BusEventHub;
    use crate::instance::{InstanceIdentity, InstanceKind};
    use googletest::prelude::*;
    use rstest::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct SpiManager {
        loads: Mutex<Vec<String>>,
    }

    impl FpgaManager for SpiManager {
        fn identity(&self) -> &str {
            "fpga2"
        }

        fn name(&self) -> &str {
            "xlnx-slave-spi spi2.0"
        }

        fn load(&self, info: &ImageInfo) -> Result<(), FpgaCfgError> {
            self.loads.lock().unwrap().push(info.firmware_name.clone());
            Ok(())
        }
    }

    struct EmptyBus;

    impl PciBus for EmptyBus {
        fn device_present(&self, _addr: PciAddress) -> bool {
            false
        }

        fn bound_driver(&self, _addr: PciAddress) -> Option<String> {
            None
        }

        fn unbind(&self, _addr: PciAddress) -> Result<(), FpgaCfgError> {
            Ok(())
        }

        fn bind(&self, _addr: PciAddress, _driver: &str) -> Result<(), FpgaCfgError> {
            Ok(())
        }

        fn set_driver_override(&self, _addr: PciAddress, _driver: &str) -> Result<(), FpgaCfgError> {
            Ok(())
        }

        fn pass_driver_args(
            &self,
            _addr: PciAddress,
            _driver: &str,
            _args: &str,
        ) -> Result<(), FpgaCfgError> {
            Ok(())
        }

        fn acquire_manager(&self, addr: PciAddress) -> Result<Arc<dyn FpgaManager>, FpgaCfgError> {
            Err(FpgaCfgError::NoSuitableBackend(format!("nothing behind {addr}")))
        }
    }

    struct NoModules;

    impl ModuleLoader for NoModules {
        fn load_module(&self, _name: &str, _args: &str) -> Result<(), FpgaCfgError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Attributes(Mutex<Vec<String>>);

    impl StatusNotifier for Attributes {
        fn notify(&self, _instance: &str, attribute: &str) {
            self.0.lock().unwrap().push(attribute.to_string());
        }
    }

    #[gtest]
    fn exhausted_history_does_not_fail_the_load() {
        let manager = Arc::new(SpiManager::default());
        let attributes = Arc::new(Attributes::default());
        let identity = InstanceIdentity::from_manager(
            InstanceKind::SpiSingle,
            manager.name(),
            manager.identity(),
            0,
        )
        .unwrap();
        let inst = ConfigInstance::attach(
            identity,
            manager.clone(),
            Arc::new(SystemConfig::default()),
            Backends {
                bus: Arc::new(EmptyBus),
                modules: Arc::new(NoModules),
                notifier: attributes.clone(),
            },
            Arc::new(BusEventHub::new()),
        );
        inst.history().refuse_records();

        let result = inst.load(b"{\nspi-image = \"/lib/firmware/s.rbf\";\n}\n");

        assert_that!(result, ok(anything()));
        expect_that!(manager.loads.lock().unwrap().clone(), elements_are![eq("s.rbf")]);
        expect_that!(inst.sequence_numbers(), eq((1, 0)));
        expect_that!(inst.status(), eq(true));
        expect_that!(inst.state(), eq(SequencerState::Done));
        expect_that!(inst.history().has_header(), eq(true));
        expect_that!(inst.history().records(), eq(0));
        expect_that!(
            attributes.0.lock().unwrap().clone(),
            elements_are![eq("history"), eq("status")]
        );
    }

    #[gtest]
    #[rstest]
    #[case::fpp(Operation::FppRing, Group::Fpp)]
    #[case::spi_ring(Operation::SpiRing, Group::Spi)]
    #[case::spi_single(Operation::SpiSingle, Group::Spi)]
    #[case::cvp(Operation::Cvp, Group::Cvp)]
    #[case::pr(Operation::PartialReconfig, Group::Pr)]
    fn operations_map_to_groups(#[case] op: Operation, #[case] group: Group) {
        assert_that!(group_of(op), eq(group));
    }

    #[gtest]
    fn states_display() {
        expect_that!(SequencerState::AwaitRebind.to_string(), eq("await-rebind"));
        expect_that!(SequencerState::Failed.to_string(), eq("failed"));
    }
}
