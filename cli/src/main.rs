// Copyright 2025 The micmgmt Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod cli;
mod logger;
mod query;

use std::process::ExitCode;
use std::sync::Arc;
use anyhow::Context;
use clap::Parser;
use log::{error, info};
use micmgmt_core::retry::RetryPolicy;
use micmgmt_core::{DeviceHandle, Dispatcher, HandleRegistry};
use micmgmt_sim_port::SimulatedDeviceProvider;
use crate::cli::{Cli, Commands, DeviceSelection};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logger::init_logger(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logger: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs the command; `Ok(false)` when any device or setting failed.
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = cli.dispatch_config()?;
    let provider = Arc::new(SimulatedDeviceProvider::new(cli.sim_devices).with_retry(RetryPolicy::default()));
    let registry = HandleRegistry::new(provider);
    let handles = open_devices(&registry, &cli.device)?;
    info!("Opened {} device(s)", handles.len());
    let sessions = handles.iter().map(|h| registry.lookup(*h)).collect::<Result<Vec<_>, _>>()?;

    let successful = match &cli.command {
        Commands::Query { settings } => {
            let report = query::query_settings(sessions, settings).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            } else {
                print!("{}", report);
            }
            report.all_successful()
        }
        command => {
            let requests = command.requests().unwrap_or_default();
            let report = Dispatcher::new(config).run(sessions, &requests).await?;
            let summary = report.summary(&requests);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary);
            }
            summary.all_successful()
        }
    };

    registry.close_all();
    Ok(successful)
}

fn open_devices(registry: &HandleRegistry, selection: &DeviceSelection) -> anyhow::Result<Vec<DeviceHandle>> {
    match selection {
        DeviceSelection::All => (0..registry.device_count() as u32)
            .map(|device| {
                registry
                    .open(device)
                    .with_context(|| format!("Failed to open {}", registry.device_name(device)))
            })
            .collect(),
        DeviceSelection::Named(names) => names
            .iter()
            .map(|name| registry.open_by_name(name).with_context(|| format!("Failed to open {}", name)))
            .collect(),
    }
}
