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

use crate::proxies::status_proxy::StatusProxy;
use zbus::Connection;

const GROUPS: [&str; 4] = ["fpp", "spi", "cvp", "pr"];

async fn status_proxy() -> Result<StatusProxy<'static>, zbus::Error> {
    let connection = Connection::system().await?;
    StatusProxy::new(&connection).await
}

/// Names of all instances known to the daemon.
pub async fn call_list_instances() -> Result<Vec<String>, zbus::Error> {
    let listing = status_proxy().await?.list_instances().await?;
    Ok(parse_listing(&listing))
}

pub(crate) fn parse_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// gets the first instance from `call_list_instances`
pub async fn get_first_instance() -> Result<String, zbus::Error> {
    call_list_instances()
        .await?
        .into_iter()
        .next()
        .ok_or(zbus::Error::Failure(
            "fpga-cfgd has no configuration instances".to_string(),
        ))
}

/// Use the given instance or fall back to the first one.
pub async fn resolve_instance(instance: &Option<String>) -> Result<String, zbus::Error> {
    match instance {
        Some(name) => Ok(name.clone()),
        None => get_first_instance().await,
    }
}

/// one instance as an ascii table
async fn get_instance_message(proxy: &StatusProxy<'_>, instance: &str) -> Result<String, zbus::Error> {
    let status = proxy.get_status(instance).await?;
    let state = proxy.get_state(instance).await?;
    let (cfg_seq, pr_seq) = proxy.get_sequence_numbers(instance).await?;
    let debug = proxy.get_debug(instance).await?;
    let history_size = proxy.get_history_size(instance).await?;
    let mut ret_string = format!(
        "---- INSTANCE ----\n\
        | instance | status | state | loads | pr loads | debug | history bytes |\n\
        | {instance} | {status} | {state} | {cfg_seq} | {pr_seq} | {debug} | {history_size} |\n"
    );
    ret_string += "\n---- IMAGES ----\n\
                   | group | image | meta |\n";
    for group in GROUPS {
        // groups the instance does not expose are rejected by the daemon
        let (Ok(image), Ok(meta)) = (
            proxy.get_image(instance, group).await,
            proxy.get_meta(instance, group).await,
        ) else {
            continue;
        };
        ret_string += format!("| {group} | {image} | {meta} |\n").as_str();
    }
    if let Ok((image_attr, meta_attr)) = proxy.get_pr_attributes(instance).await {
        ret_string += format!("\nPR attributes: {image_attr} {meta_attr}\n").as_str();
    }
    Ok(ret_string)
}

/// all instances with their status as an ascii table
async fn get_full_status_message(proxy: &StatusProxy<'_>) -> Result<String, zbus::Error> {
    let mut ret_string = String::from(
        "---- INSTANCES ----\n\
        | instance | status | state |\n",
    );
    for instance in parse_listing(&proxy.list_instances().await?) {
        let status = proxy.get_status(&instance).await?;
        let state = proxy.get_state(&instance).await?;
        ret_string += format!("| {instance} | {status} | {state} |\n").as_str();
    }
    Ok(ret_string)
}

/// Argument parser for the status command
pub async fn status_handler(instance: &Option<String>) -> Result<String, zbus::Error> {
    let proxy = status_proxy().await?;
    match instance {
        Some(name) => get_instance_message(&proxy, name).await,
        None => get_full_status_message(&proxy).await,
    }
}

pub async fn list_handler() -> Result<String, zbus::Error> {
    Ok(call_list_instances().await?.join("\n"))
}

/// Read the whole history of `instance` in chunks of `chunk` bytes.
pub async fn call_read_history(instance: &str, chunk: u64) -> Result<Vec<u8>, zbus::Error> {
    let proxy = status_proxy().await?;
    let mut history = Vec::new();
    loop {
        let bytes = proxy
            .read_history(instance, history.len() as u64, chunk)
            .await?;
        if bytes.is_empty() {
            break;
        }
        history.extend_from_slice(&bytes);
    }
    Ok(history)
}
