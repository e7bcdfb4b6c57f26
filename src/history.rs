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

//! Bounded configuration history.
//!
//! The history is a list of text entries read as one byte stream. Entry zero is the header
//! banner naming the device; the remaining entries are load records in arrival order. Once more
//! than `max_entries` records are held, the oldest record is evicted. The header stays.

use crate::error::FpgaCfgError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

static START: OnceLock<Instant> = OnceLock::new();

/// Monotonic time since the history clock was first used.
///
/// The daemon touches the clock at startup so timestamps count from daemon start.
pub fn uptime() -> Duration {
    START.get_or_init(Instant::now).elapsed()
}

pub fn header_line(fpga_type: &str, bdf: &str) -> String {
    format!("=== Config Log for {fpga_type} device @ {bdf} ===\n")
}

pub fn load_record(
    timestamp: Duration,
    cfg_seq: u64,
    firmware_abs: &str,
    metadata_abs: &str,
) -> String {
    format!(
        "[{:5}.{:06}] load {cfg_seq}: {firmware_abs}\tmeta: {metadata_abs}\n",
        timestamp.as_secs(),
        timestamp.subsec_micros()
    )
}

#[derive(Debug, Default)]
struct Entries {
    list: VecDeque<String>,
    has_header: bool,
    size: usize,
}

impl Entries {
    fn records(&self) -> usize {
        self.list.len() - usize::from(self.has_header)
    }

    fn push(&mut self, entry: String) -> Result<(), FpgaCfgError> {
        self.list.try_reserve(1).map_err(|e| {
            FpgaCfgError::ResourceExhausted(format!("No memory for log entry: {e}"))
        })?;
        self.size += entry.len();
        self.list.push_back(entry);
        Ok(())
    }

    fn push_header(&mut self, banner: String) -> Result<(), FpgaCfgError> {
        self.list.try_reserve(1).map_err(|e| {
            FpgaCfgError::ResourceExhausted(format!("No memory for log header: {e}"))
        })?;
        self.size += banner.len();
        self.list.push_front(banner);
        self.has_header = true;
        Ok(())
    }
}

#[derive(Debug)]
pub struct HistoryLog {
    max_entries: usize,
    entries: Mutex<Entries>,
    #[cfg(test)]
    refuse_records: std::sync::atomic::AtomicBool,
}

impl HistoryLog {
    /// `max_entries` is taken as is; clamping happens when the configuration is loaded.
    pub fn new(max_entries: usize) -> Self {
        HistoryLog {
            max_entries,
            entries: Mutex::new(Entries::default()),
            #[cfg(test)]
            refuse_records: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn has_header(&self) -> bool {
        self.lock().has_header
    }

    /// Put `banner` in front of the log. A log that already has a header keeps it.
    pub fn insert_header(&self, banner: String) -> Result<(), FpgaCfgError> {
        let mut entries = self.lock();
        if entries.has_header {
            return Ok(());
        }
        entries.push_header(banner)
    }

    /// Make every following `append` fail as if memory ran out.
    #[cfg(test)]
    pub(crate) fn refuse_records(&self) {
        self.refuse_records
            .store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// Append a record, evicting the oldest record when over capacity.
    pub fn append(&self, record: String) -> Result<(), FpgaCfgError> {
        #[cfg(test)]
        if self.refuse_records.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(FpgaCfgError::ResourceExhausted(
                "No memory for log entry".to_string(),
            ));
        }
        let mut entries = self.lock();
        entries.push(record)?;
        if entries.records() > self.max_entries {
            let oldest = usize::from(entries.has_header);
            if let Some(evicted) = entries.list.remove(oldest) {
                entries.size -= evicted.len();
            }
        }
        Ok(())
    }

    /// Read up to `len` bytes of the log starting at byte `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let entries = self.lock();
        let mut out = Vec::new();
        if len == 0 || offset >= entries.size {
            return out;
        }
        let mut start = 0;
        for entry in &entries.list {
            let end = start + entry.len();
            if offset < end {
                let from = offset.saturating_sub(start);
                let take = (entry.len() - from).min(len - out.len());
                out.extend_from_slice(&entry.as_bytes()[from..from + take]);
                if out.len() == len {
                    break;
                }
            }
            start = end;
        }
        out
    }

    /// Drop every entry and start over with `banner`.
    pub fn reset(&self, banner: String) -> Result<(), FpgaCfgError> {
        let mut entries = self.lock();
        *entries = Entries::default();
        entries.push_header(banner)
    }

    /// Total byte length of all entries.
    pub fn size(&self) -> usize {
        self.lock().size
    }

    /// Number of load records, header excluded.
    pub fn records(&self) -> usize {
        self.lock().records()
    }
}
