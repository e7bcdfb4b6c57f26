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

//! Key dispatch table for configuration descriptors.
//!
//! The table is a fixed catalog shared by every instance. Whether a key was already consumed
//! during a parse is tracked separately in [`ConsumedKeys`], which lives on the stack of a
//! single parse call.

/// Backend group a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Fpp,
    Spi,
    Cvp,
    Pr,
}

impl Group {
    pub const ALL: [Group; 4] = [Group::Fpp, Group::Spi, Group::Cvp, Group::Pr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Fpp => "fpp",
            Group::Spi => "spi",
            Group::Cvp => "cvp",
            Group::Pr => "pr",
        }
    }

    pub fn from_name(name: &str) -> Option<Group> {
        Group::ALL.into_iter().find(|g| g.as_str() == name)
    }
}

/// Semantic field a recognized key writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Image path for a backend group.
    Image(Group),
    /// Metadata path for a backend group.
    Meta(Group),
    BusNr,
    UsbId,
    FpgaType,
    BitstreamLsbFirst,
    MfdDriver,
    MfdDriverArgs,
}

#[derive(Debug)]
pub struct KeyRecord {
    pub key: &'static str,
    pub kind: KeyKind,
}

const KEY_COUNT: usize = 14;

pub static KEY_TABLE: [KeyRecord; KEY_COUNT] = [
    KeyRecord { key: "fpp-usb-dev-id", kind: KeyKind::UsbId },
    KeyRecord { key: "fpga-pcie-bus-nr", kind: KeyKind::BusNr },
    KeyRecord { key: "fpga-type", kind: KeyKind::FpgaType },
    KeyRecord { key: "spi-lsb-first", kind: KeyKind::BitstreamLsbFirst },
    KeyRecord { key: "fpp-image", kind: KeyKind::Image(Group::Fpp) },
    KeyRecord { key: "spi-image", kind: KeyKind::Image(Group::Spi) },
    KeyRecord { key: "cvp-image", kind: KeyKind::Image(Group::Cvp) },
    KeyRecord { key: "part-reconf-image", kind: KeyKind::Image(Group::Pr) },
    KeyRecord { key: "fpp-image-meta", kind: KeyKind::Meta(Group::Fpp) },
    KeyRecord { key: "spi-image-meta", kind: KeyKind::Meta(Group::Spi) },
    KeyRecord { key: "cvp-image-meta", kind: KeyKind::Meta(Group::Cvp) },
    KeyRecord { key: "part-reconf-image-meta", kind: KeyKind::Meta(Group::Pr) },
    KeyRecord { key: "mfd-driver", kind: KeyKind::MfdDriver },
    KeyRecord { key: "mfd-driver-param", kind: KeyKind::MfdDriverArgs },
];

/// Longest key the line grammar accepts.
pub const KEY_MAX_LEN: usize = 23;

/// Per-parse record of which table entries have been consumed.
#[derive(Debug, Default)]
pub struct ConsumedKeys {
    done: [bool; KEY_COUNT],
}

impl ConsumedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key` and mark it consumed.
    ///
    /// Returns `None` for unknown keys and for keys already consumed in this parse, so the
    /// first occurrence of a key is the one that sticks.
    pub fn take(&mut self, key: &str) -> Option<KeyKind> {
        let idx = KEY_TABLE.iter().position(|record| record.key == key)?;
        if self.done[idx] {
            return None;
        }
        self.done[idx] = true;
        Some(KEY_TABLE[idx].kind)
    }
}
