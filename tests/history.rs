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

mod common;

use common::*;
use fpga_cfg::config::SystemConfig;
use fpga_cfg::history::header_line;
use googletest::prelude::*;

fn spi_load(image: &str) -> Vec<u8> {
    let line = format!("spi-image = \"/lib/firmware/{image}\";");
    descriptor(&["fpga-type = \"arria10\";", line.as_str()])
}

fn history_text(inst: &fpga_cfg::instance::ConfigInstance) -> String {
    let history = inst.history();
    String::from_utf8(history.read(0, history.size())).unwrap()
}

#[gtest]
fn oldest_records_are_evicted_first() {
    let h = Harness::with_config(SystemConfig {
        history_max_entries: 3,
        ..test_config()
    });
    let (_manager, inst) = h.attach("fpga2", SPI_SINGLE_MANAGER);

    for n in 1..=5 {
        inst.load(&spi_load(&format!("s{n}.rbf"))).unwrap();
    }

    let text = history_text(&inst);
    expect_that!(inst.history().records(), eq(3));
    expect_that!(text, starts_with(header_line("arria10", "")));
    expect_that!(
        text,
        all![
            not(contains_substring("s1.rbf")),
            not(contains_substring("s2.rbf")),
            contains_substring("load 3: /lib/firmware/s3.rbf"),
            contains_substring("load 5: /lib/firmware/s5.rbf")
        ]
    );
}

#[gtest]
fn reset_leaves_only_the_header() {
    let h = Harness::new();
    let (_manager, inst) = h.attach("fpga2", SPI_SINGLE_MANAGER);
    inst.load(&spi_load("s.rbf")).unwrap();

    inst.write_history("0").unwrap();

    let header = header_line("arria10", "");
    expect_that!(inst.history().size(), eq(header.len()));
    expect_that!(inst.history().read(0, 4096), eq(&header.into_bytes()));
    expect_that!(inst.history().records(), eq(0));
    expect_that!(
        h.notifier.attributes("spi_spi2.0"),
        elements_are![eq("history"), eq("status"), eq("history")]
    );
}

#[gtest]
fn size_after_reset_and_load_counts_header_and_one_record() {
    let h = Harness::new();
    let (_manager, inst) = h.attach("fpga2", SPI_SINGLE_MANAGER);
    inst.load(&spi_load("old.rbf")).unwrap();
    inst.load(&spi_load("old.rbf")).unwrap();

    inst.write_history("0").unwrap();
    inst.load(&spi_load("new.rbf")).unwrap();

    let header = header_line("arria10", "");
    let text = history_text(&inst);
    let record = text.strip_prefix(header.as_str()).unwrap_or_default();
    expect_that!(inst.history().records(), eq(1));
    expect_that!(text, starts_with(header.as_str()));
    expect_that!(record, ends_with("] load 3: /lib/firmware/new.rbf\tmeta: \n"));
    expect_that!(record.matches('\n').count(), eq(1));
    expect_that!(inst.history().size(), eq(header.len() + record.len()));
}

#[gtest]
fn other_history_writes_are_ignored() {
    let h = Harness::new();
    let (_manager, inst) = h.attach("fpga2", SPI_SINGLE_MANAGER);
    inst.load(&spi_load("s.rbf")).unwrap();
    let size = inst.history().size();

    expect_that!(inst.write_history("5"), ok(anything()));
    expect_that!(inst.history().size(), eq(size));
    expect_that!(
        inst.write_history("reset"),
        err(displays_as(starts_with("FpgaCfgError::Argument")))
    );
}

#[gtest]
fn reads_follow_offsets() {
    let h = Harness::new();
    let (_manager, inst) = h.attach("fpga2", SPI_SINGLE_MANAGER);
    inst.load(&spi_load("s.rbf")).unwrap();
    let text = history_text(&inst);
    let history = inst.history();

    expect_that!(history.read(4, 6), eq(&text.as_bytes()[4..10].to_vec()));
    expect_that!(history.read(text.len(), 10), is_empty());
    expect_that!(history.read(text.len() - 3, 10), eq(&text.as_bytes()[text.len() - 3..].to_vec()));
}
