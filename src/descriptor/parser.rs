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

//! Descriptor parser.
//!
//! Parsing is done in three steps:
//! 1. [`check_framing`] validates size, UTF-8 and the `{\n` ... `\n}\n` frame without touching
//!    any field.
//! 2. Each line between the braces is split by [`parse_line`] into a key and the raw value text.
//! 3. Recognized keys are applied to [`DescriptorFields`] in order. The first failure stops the
//!    parse, and the lines applied before it stay applied.

use crate::backend::PciAddress;
use crate::config::DESCRIPTOR_MAX_LEN;
use crate::descriptor::keys::{ConsumedKeys, Group, KEY_MAX_LEN, KeyKind};
use crate::descriptor::{DescriptorFields, Operation};
use crate::error::FpgaCfgError;
use log::{debug, warn};

const FRAME_START: &str = "{\n";
const FRAME_END: &str = "\n}\n";
const DRIVER_ARGS_MAX_LEN: usize = 2047;

/// Instance properties the parser needs to interpret keys.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Root every image path must start with, e.g. `/lib/firmware/`.
    pub firmware_prefix: &'a str,
    /// What `spi-image` selects on this instance.
    pub spi_operation: Operation,
    /// USB id reported by the FPP manager, if the instance has one.
    pub usb_dev_id: Option<&'a str>,
    /// Instance name used in log messages.
    pub instance: &'a str,
    pub debug: bool,
}

/// Check the descriptor frame and return its text.
pub fn check_framing(buf: &[u8]) -> Result<&str, FpgaCfgError> {
    if buf.is_empty() || buf.len() > DESCRIPTOR_MAX_LEN {
        return Err(FpgaCfgError::MalformedDescriptor(format!(
            "descriptor size {} is outside 1..={DESCRIPTOR_MAX_LEN}",
            buf.len()
        )));
    }
    let text = std::str::from_utf8(buf).map_err(|e| {
        FpgaCfgError::MalformedDescriptor(format!("descriptor is not valid UTF-8: {e}"))
    })?;
    if !text.starts_with(FRAME_START) || !text.ends_with(FRAME_END) {
        return Err(FpgaCfgError::MalformedDescriptor(
            "descriptor must start with \"{\\n\" and end with \"\\n}\\n\"".to_string(),
        ));
    }
    Ok(text)
}

/// The lines between the braces. `{\n}\n` has none.
fn body_lines(text: &str) -> impl Iterator<Item = &str> {
    let body = if text.len() > FRAME_START.len() + FRAME_END.len() - 1 {
        Some(&text[FRAME_START.len()..text.len() - FRAME_END.len()])
    } else {
        None
    };
    body.into_iter().flat_map(|b| b.split('\n'))
}

/// Split a `key = "value";` line into the key and everything after the opening quote.
pub fn parse_line(line: &str) -> Result<(&str, &str), FpgaCfgError> {
    let malformed = || FpgaCfgError::MalformedDescriptor(format!("parse error: '{line}'"));

    let trimmed = line.trim_start();
    let key_end = trimmed
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(trimmed.len());
    let key = &trimmed[..key_end];
    if key.is_empty() || key.len() > KEY_MAX_LEN {
        return Err(malformed());
    }

    let rest = trimmed[key_end..].trim_start();
    let rest = rest.strip_prefix('=').ok_or_else(malformed)?.trim_start();
    let raw_value = rest.strip_prefix('"').ok_or_else(malformed)?;
    if raw_value.is_empty() {
        return Err(malformed());
    }
    Ok((key, raw_value))
}

/// Strip the mandatory `";` terminator from a raw value.
pub fn terminate_value(raw_value: &str) -> Result<&str, FpgaCfgError> {
    let invalid = || FpgaCfgError::MalformedValue(format!("Invalid line end: '{raw_value}'"));
    let quote = raw_value.rfind('"').ok_or_else(invalid)?;
    let tail = raw_value[quote + 1..].strip_prefix(';').ok_or_else(invalid)?;
    if !tail.trim().is_empty() {
        return Err(invalid());
    }
    Ok(&raw_value[..quote])
}

fn first_word(value: &str) -> Option<&str> {
    value.split_whitespace().next()
}

/// Parse a leading decimal integer the way `sscanf("%d")` does: leading whitespace is skipped and
/// anything after the digits is ignored.
pub fn leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits = trimmed[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len() - sign_len);
    if digits == 0 {
        return None;
    }
    trimmed[..sign_len + digits].parse().ok()
}

/// Parse `bus:dev.func` in hexadecimal.
pub fn parse_bus_nr(value: &str) -> Result<PciAddress, FpgaCfgError> {
    let invalid = || FpgaCfgError::MalformedValue(format!("Invalid bus-nr: '{value}'"));
    let word = first_word(value).ok_or_else(invalid)?;
    let (bus, dev_func) = word.split_once(':').ok_or_else(invalid)?;
    let (dev, func) = dev_func.split_once('.').ok_or_else(invalid)?;
    let bus = u8::from_str_radix(bus, 16).map_err(|_| invalid())?;
    let dev = u8::from_str_radix(dev, 16).map_err(|_| invalid())?;
    let func = u8::from_str_radix(func, 16).map_err(|_| invalid())?;
    PciAddress::new(bus, dev, func).ok_or_else(invalid)
}

fn apply_image(
    fields: &mut DescriptorFields,
    ctx: &ParseContext<'_>,
    group: Group,
    value: &str,
) -> Result<(), FpgaCfgError> {
    match group {
        Group::Cvp => {
            fields.secondary = Some(Operation::Cvp);
        }
        _ => {
            let operation = match group {
                Group::Fpp => Operation::FppRing,
                Group::Spi => ctx.spi_operation,
                _ => Operation::PartialReconfig,
            };
            if fields.primary.is_none() {
                fields.primary = Some(operation);
            } else {
                warn!(
                    "{}: ignoring {operation} image selection, {:?} already selected",
                    ctx.instance, fields.primary
                );
            }
        }
    }

    let sub = fields.sub_mut(group);
    sub.firmware_abs = value.to_string();
    if ctx.debug {
        debug!("{}: abs. name '{}'", ctx.instance, sub.firmware_abs);
    }
    let basename = value
        .strip_prefix(ctx.firmware_prefix)
        .and_then(first_word)
        .ok_or_else(|| FpgaCfgError::InvalidFirmwarePath {
            path: value.to_string(),
            prefix: ctx.firmware_prefix.to_string(),
        })?;
    sub.firmware = basename.to_string();
    if ctx.debug {
        debug!("{}: base name '{}'", ctx.instance, sub.firmware);
    }
    Ok(())
}

fn apply_value(
    fields: &mut DescriptorFields,
    ctx: &ParseContext<'_>,
    kind: KeyKind,
    value: &str,
) -> Result<(), FpgaCfgError> {
    match kind {
        KeyKind::Image(group) => apply_image(fields, ctx, group, value)?,
        KeyKind::Meta(group) => {
            fields.sub_mut(group).metadata_abs = value.to_string();
        }
        KeyKind::BusNr => {
            fields.pci = parse_bus_nr(value)?;
            fields.bdf = first_word(value).unwrap_or_default().to_string();
            if ctx.debug {
                debug!("{}: BDF '{}'", ctx.instance, fields.bdf);
            }
        }
        KeyKind::UsbId => {
            if let Some(expected) = ctx.usb_dev_id
                && expected != value
            {
                warn!(
                    "{}: FPP usb id '{value}', expected '{expected}'",
                    ctx.instance
                );
            }
            if ctx.debug {
                debug!("{}: Using FPP dev '{value}'", ctx.instance);
            }
        }
        KeyKind::FpgaType => {
            let word = first_word(value)
                .ok_or_else(|| FpgaCfgError::MalformedValue(format!("Invalid type '{value}'")))?;
            fields.fpga_type = word.to_string();
        }
        KeyKind::BitstreamLsbFirst => {
            let flag = leading_int(value).ok_or_else(|| {
                FpgaCfgError::MalformedValue(format!("Invalid bitorder flag '{value}'"))
            })?;
            fields.bs_lsb_first = flag != 0;
        }
        KeyKind::MfdDriver => {
            let word = first_word(value).ok_or_else(|| {
                FpgaCfgError::MalformedValue(format!("Invalid 'mfd-driver': '{value}'"))
            })?;
            fields.mfd_driver = word.to_string();
            if ctx.debug {
                debug!("{}: Using mfd-driver: '{word}'", ctx.instance);
            }
        }
        KeyKind::MfdDriverArgs => {
            let mut end = value.len().min(DRIVER_ARGS_MAX_LEN);
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            fields.mfd_driver_args = value[..end].to_string();
            if ctx.debug {
                debug!(
                    "{}: Using mfd-driver-param: '{}'",
                    ctx.instance, fields.mfd_driver_args
                );
            }
        }
    }
    Ok(())
}

/// Apply the lines of an already framed descriptor to `fields`.
pub fn parse_body(
    text: &str,
    fields: &mut DescriptorFields,
    ctx: &ParseContext<'_>,
) -> Result<(), FpgaCfgError> {
    let mut consumed = ConsumedKeys::new();
    for line in body_lines(text) {
        let (key, raw_value) = parse_line(line)?;
        let Some(kind) = consumed.take(key) else {
            continue;
        };
        let value = terminate_value(raw_value)?;
        apply_value(fields, ctx, kind, value)?;
    }
    Ok(())
}

/// Check framing and apply a whole descriptor.
pub fn parse_descriptor(
    buf: &[u8],
    fields: &mut DescriptorFields,
    ctx: &ParseContext<'_>,
) -> Result<(), FpgaCfgError> {
    let text = check_framing(buf)?;
    parse_body(text, fields, ctx)
}
