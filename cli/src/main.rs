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

//! Command-line client for the fpga-cfgd daemon.
//!
//! ```bash
//! fpga-cfg list
//! fpga-cfg status --instance fpp_1.0
//! fpga-cfg load --instance fpp_1.0 descriptor.txt
//! fpga-cfg history --instance fpp_1.0 --reset
//! fpga-cfg debug --instance fpp_1.0 1
//! ```

mod debug;
mod history;
mod load;
mod proxies;
mod status;

use clap::{Parser, Subcommand, arg, command};
use log::{debug, error};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fpga-cfg")]
#[command(bin_name = "fpga-cfg")]
struct Cli {
    #[arg(
        long = "instance",
        global = true,
        help = r#"configuration instance to be used for operations, e.g. fpp_1.0.
Default value for this option is calculated in runtime and application
picks the first instance reported by fpga-cfgd.
        "#
    )]
    instance: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the configuration instances
    List,
    /// Show the status of one or all instances
    Status,
    /// Run the configuration sequence of a descriptor file
    Load {
        /// descriptor file, `{` ... `}` with one `key = "value";` per line
        file: PathBuf,
    },
    /// Print or reset the load history
    History {
        #[arg(long)]
        reset: bool,
    },
    /// Set the debug level, 0 turns per-instance debug output off
    Debug { level: i32 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("parsed cli command with {cli:?}");
    let result = match &cli.command {
        Commands::List => status::list_handler().await,
        Commands::Status => status::status_handler(&cli.instance).await,
        Commands::Load { file } => load::load_handler(&cli.instance, file).await,
        Commands::History { reset } => history::history_handler(&cli.instance, *reset).await,
        Commands::Debug { level } => debug::debug_handler(&cli.instance, *level).await,
    };
    match result {
        Ok(msg) => {
            println!("{msg}");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}
