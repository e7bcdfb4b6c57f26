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

use log::error;
use std::path::PathBuf;
use zbus::fdo;

#[derive(Debug, thiserror::Error)]
pub enum FpgaCfgError {
    #[error("FpgaCfgError::MalformedDescriptor: {0}")]
    MalformedDescriptor(String),
    #[error("FpgaCfgError::MalformedValue: {0}")]
    MalformedValue(String),
    #[error("FpgaCfgError::InvalidFirmwarePath: {path:?} does not begin with {prefix:?}")]
    InvalidFirmwarePath { path: String, prefix: String },
    #[error("FpgaCfgError::NoSuitableBackend: {0}")]
    NoSuitableBackend(String),
    #[error("FpgaCfgError::BackendAcquireFailed: failed getting manager for {device}: {reason}")]
    BackendAcquireFailed { device: String, reason: String },
    #[error("FpgaCfgError::LoadFailed: {manager} failed to load {firmware:?}: {reason}")]
    LoadFailed {
        manager: String,
        firmware: String,
        reason: String,
    },
    #[error("FpgaCfgError::BindTimeout: no driver bound to {device} within {timeout_ms} ms")]
    BindTimeout { device: String, timeout_ms: u64 },
    #[error("FpgaCfgError::BindFailed: failed to bind {driver:?} to {device}: {reason}")]
    BindFailed {
        driver: String,
        device: String,
        reason: String,
    },
    #[error("FpgaCfgError::ResourceExhausted: {0}")]
    ResourceExhausted(String),
    #[error("FpgaCfgError::Cancelled: {0}")]
    Cancelled(String),
    #[error("FpgaCfgError::Argument: {0}")]
    Argument(String),
    #[error("FpgaCfgError::IORead: An IO error occurred when reading from {file:?}: {e}")]
    IORead { file: PathBuf, e: std::io::Error },
    #[error("FpgaCfgError::IOWrite: An IO error occurred when writing {data:?} to {file:?}: {e}")]
    IOWrite {
        data: String,
        file: PathBuf,
        e: std::io::Error,
    },
    #[error("FpgaCfgError::IOReadDir: An IO error occurred when reading directory {dir:?}: {e}")]
    IOReadDir { dir: PathBuf, e: std::io::Error },
    #[error("FpgaCfgError::IOReadLink: An IO error occurred when resolving link {file:?}: {e}")]
    IOReadLink { file: PathBuf, e: std::io::Error },
    #[error("FpgaCfgError::Spawn: Failed to run {program:?}: {e}")]
    Spawn { program: PathBuf, e: std::io::Error },
    #[error("FpgaCfgError::TomlDe: Failed to parse {file:?}: {e}")]
    TomlDe { file: PathBuf, e: toml::de::Error },
    #[error("FpgaCfgError::Internal: An Internal error occurred: {0}")]
    Internal(String),
}

impl From<FpgaCfgError> for fdo::Error {
    fn from(err: FpgaCfgError) -> Self {
        error!("{err}");
        match err {
            FpgaCfgError::Argument(..)
            | FpgaCfgError::MalformedDescriptor(..)
            | FpgaCfgError::MalformedValue(..)
            | FpgaCfgError::InvalidFirmwarePath { .. } => fdo::Error::InvalidArgs(err.to_string()),
            FpgaCfgError::IORead { .. } => fdo::Error::IOError(err.to_string()),
            FpgaCfgError::IOWrite { .. } => fdo::Error::IOError(err.to_string()),
            FpgaCfgError::IOReadDir { .. } => fdo::Error::IOError(err.to_string()),
            FpgaCfgError::IOReadLink { .. } => fdo::Error::IOError(err.to_string()),
            _ => fdo::Error::Failed(err.to_string()),
        }
    }
}
