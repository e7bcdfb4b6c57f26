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

//! Error Wrapping File System I/O Helpers
//!
//! Thin wrappers around standard file system operations used by the sysfs adapters, with
//! conversion to `FpgaCfgError` and trace logging of every access.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use fpga_cfg::system_io::{fs_read, fs_write};
//! # use std::path::Path;
//! # fn example() -> Result<(), fpga_cfg::error::FpgaCfgError> {
//! let name = fs_read(Path::new("/sys/class/fpga_manager/fpga0/name"))?;
//! fs_write(Path::new("/sys/class/fpga_manager/fpga0/flags"), false, "0")?;
//! # Ok(())
//! # }
//! ```

use crate::error::FpgaCfgError;
use log::trace;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Read the contents of a file to a String.
///
/// # Returns: `Result<String, FpgaCfgError>`
/// * `Ok(String)` - The complete contents of the file
/// * `Err(FpgaCfgError::IORead)` - If the file cannot be read
pub fn fs_read(file_path: &Path) -> Result<String, FpgaCfgError> {
    trace!("Attempting to read from {file_path:?}");
    let mut buf: String = String::new();
    let result = OpenOptions::new()
        .read(true)
        .open(file_path)
        .and_then(|mut f| f.read_to_string(&mut buf));

    match result {
        Ok(_) => {
            trace!("Reading done");
            Ok(buf)
        }
        Err(e) => Err(FpgaCfgError::IORead {
            file: file_path.into(),
            e,
        }),
    }
}

/// Write a string value to a file.
///
/// Sysfs attributes must already exist, so callers pass `create = false` for them.
///
/// # Returns: `Result<(), FpgaCfgError>`
/// * `Ok(())` - Write succeeded
/// * `Err(FpgaCfgError::IOWrite)` - If the write fails
pub fn fs_write(file_path: &Path, create: bool, value: impl AsRef<str>) -> Result<(), FpgaCfgError> {
    trace!(
        "Attempting to write {:?} to {:?}",
        value.as_ref(),
        file_path
    );
    let result = OpenOptions::new()
        .create(create)
        .read(false)
        .write(true)
        .open(file_path)
        .and_then(|mut f| write!(f, "{}", value.as_ref()));
    match result {
        Ok(_) => {
            trace!("Write done.");
            Ok(())
        }
        Err(e) => Err(FpgaCfgError::IOWrite {
            data: value.as_ref().to_string(),
            file: file_path.into(),
            e,
        }),
    }
}

/// Read the contents of a directory and return entry names (not full paths).
///
/// Entries that cannot be read are silently skipped.
pub fn fs_read_dir(dir: &Path) -> Result<Vec<String>, FpgaCfgError> {
    trace!("Attempting to read directory '{dir:?}'");
    std::fs::read_dir(dir).map_or_else(
        |e| {
            Err(FpgaCfgError::IOReadDir {
                dir: dir.to_owned(),
                e,
            })
        },
        |iter| {
            let ret = iter
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            trace!("Dir reading done.");
            Ok(ret)
        },
    )
}

/// Resolve a symbolic link one level, as used for sysfs `device` and `driver` links.
pub fn fs_read_link(link: &Path) -> Result<PathBuf, FpgaCfgError> {
    trace!("Attempting to resolve link '{link:?}'");
    std::fs::read_link(link).map_err(|e| FpgaCfgError::IOReadLink {
        file: link.to_owned(),
        e,
    })
}
