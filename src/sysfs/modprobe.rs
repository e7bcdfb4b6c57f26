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

//! Kernel module loading through `modprobe`.

use crate::backend::ModuleLoader;
use crate::error::FpgaCfgError;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// At most this many module arguments are passed on.
pub const MAX_MOD_ARGS: usize = 32;

const HELPER_ENV: [(&str, &str); 3] = [
    ("HOME", "/"),
    ("PATH", "/sbin:/usr/sbin:/bin:/usr/bin"),
    ("TERM", "linux"),
];

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct Modprobe {
    program: PathBuf,
    in_flight: Mutex<Option<Child>>,
}

impl Modprobe {
    pub fn new(program: &Path) -> Self {
        Modprobe {
            program: program.to_path_buf(),
            in_flight: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `-q -- <module> <args...>`
    pub fn arguments<'a>(name: &'a str, args: &'a str) -> Vec<&'a str> {
        let mut argv = vec!["-q", "--", name];
        argv.extend(args.split_whitespace().take(MAX_MOD_ARGS));
        argv
    }
}

impl ModuleLoader for Modprobe {
    /// Run the helper and wait for it. The wait can be cut short by
    /// [`ModuleLoader::kill_in_flight`].
    fn load_module(&self, name: &str, args: &str) -> Result<(), FpgaCfgError> {
        let argv = Self::arguments(name, args);
        debug!("running {:?} {argv:?}", self.program);
        let child = Command::new(&self.program)
            .args(&argv)
            .env_clear()
            .envs(HELPER_ENV)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| FpgaCfgError::Spawn {
                program: self.program.clone(),
                e,
            })?;
        *self.lock() = Some(child);

        let status = loop {
            {
                let mut in_flight = self.lock();
                let Some(child) = in_flight.as_mut() else {
                    return Err(FpgaCfgError::Internal(format!(
                        "{:?} helper disappeared",
                        self.program
                    )));
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        in_flight.take();
                        break status;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        in_flight.take();
                        return Err(FpgaCfgError::Spawn {
                            program: self.program.clone(),
                            e,
                        });
                    }
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        if status.success() {
            Ok(())
        } else {
            Err(FpgaCfgError::Internal(format!(
                "'{} {name} {args}' exited with {status}",
                self.program.display()
            )))
        }
    }

    fn kill_in_flight(&self) {
        if let Some(child) = self.lock().as_mut() {
            warn!("killing module helper {}", child.id());
            if let Err(e) = child.kill() {
                warn!("could not kill module helper: {e}");
            }
        }
    }
}
