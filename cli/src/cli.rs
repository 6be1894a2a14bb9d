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

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use micmgmt_core::{DispatchConfig, SettingRequest};

/// Log verbosity, one value per `log` level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

/// Devices a command applies to: `all`, or a comma separated list of device names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelection {
    All,
    Named(Vec<String>),
}

impl FromStr for DeviceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(DeviceSelection::All);
        }
        let names: Vec<String> = s.split(',').map(|n| n.trim().to_string()).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(format!("Invalid device list: {}", s));
        }
        Ok(DeviceSelection::Named(names))
    }
}

#[derive(Parser)]
#[command(name = "micsmc", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    pub log_level: LogLevel,

    /// Write the log to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Devices to act on: `all` or a list such as `mic0,mic2`
    #[arg(short, long, default_value = "all", global = true)]
    pub device: DeviceSelection,

    /// Give up on devices that have not answered after this many seconds, 0 waits forever
    #[arg(short, long, global = true)]
    pub timeout: Option<u64>,

    /// Upper bound of parallel device workers
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Dispatch configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of simulated coprocessors
    #[arg(long, default_value_t = 4, global = true)]
    pub sim_devices: usize,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enable settings
    Enable {
        #[arg(required = true)]
        settings: Vec<String>,
    },

    /// Disable settings
    Disable {
        #[arg(required = true)]
        settings: Vec<String>,
    },

    /// Show the current state of settings
    Query {
        #[arg(required = true)]
        settings: Vec<String>,
    },
}

impl Cli {
    /// Configuration file, if any, with the command line options applied on top.
    pub fn dispatch_config(&self) -> anyhow::Result<DispatchConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Cannot read {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))?
            }
            None => DispatchConfig::default(),
        };
        // Zero waits without a deadline.
        if let Some(seconds) = self.timeout {
            config.deadline = (seconds > 0).then(|| Duration::from_secs(seconds));
        }
        if let Some(workers) = self.workers {
            config.max_workers = Some(workers);
        }
        Ok(config)
    }
}

impl Commands {
    /// Setting changes of `enable`/`disable`; `None` for read only commands.
    pub fn requests(&self) -> Option<Vec<SettingRequest>> {
        match self {
            Commands::Enable { settings } => Some(settings.iter().map(SettingRequest::enable).collect()),
            Commands::Disable { settings } => Some(settings.iter().map(SettingRequest::disable).collect()),
            Commands::Query { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_enable_with_options() {
        let cli = Cli::try_parse_from(["micsmc", "enable", "led", "turbo", "--device", "mic0,mic2", "-t", "30"]).unwrap();
        assert_eq!(cli.device, DeviceSelection::Named(vec!["mic0".into(), "mic2".into()]));
        assert_eq!(cli.timeout, Some(30));
        let requests = cli.command.requests().unwrap();
        assert_eq!(requests, vec![SettingRequest::enable("led"), SettingRequest::enable("turbo")]);
    }

    #[test]
    fn log_level_maps_onto_level_filter() {
        let cli = Cli::try_parse_from(["micsmc", "query", "led", "--log-level", "debug"]).unwrap();
        assert_eq!(LevelFilter::from(cli.log_level), LevelFilter::Debug);
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::Warn);
    }

    #[test]
    fn settings_are_required() {
        assert!(Cli::try_parse_from(["micsmc", "disable"]).is_err());
    }

    #[test]
    fn device_selection() {
        assert_eq!("ALL".parse::<DeviceSelection>(), Ok(DeviceSelection::All));
        assert_eq!("mic1, mic3".parse::<DeviceSelection>(), Ok(DeviceSelection::Named(vec!["mic1".into(), "mic3".into()])));
        assert!("mic1,".parse::<DeviceSelection>().is_err());
    }

    #[test]
    fn options_override_config_file() {
        let path = std::env::temp_dir().join(format!("micsmc-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "max_workers": 8, "deadline_ms": 500 }"#).unwrap();
        let config_arg = path.to_string_lossy().to_string();

        let cli = Cli::try_parse_from(["micsmc", "query", "led", "--config", &config_arg, "--workers", "2"]).unwrap();
        let config = cli.dispatch_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.max_workers, Some(2));
        assert_eq!(config.deadline, Some(Duration::from_millis(500)));
        assert!(cli.command.requests().is_none());
    }

    #[test]
    fn zero_timeout_means_no_deadline() {
        let cli = Cli::try_parse_from(["micsmc", "enable", "led", "--timeout", "0"]).unwrap();
        assert_eq!(cli.dispatch_config().unwrap().deadline, None);

        let cli = Cli::try_parse_from(["micsmc", "enable", "led", "--timeout", "5"]).unwrap();
        assert_eq!(cli.dispatch_config().unwrap().deadline, Some(Duration::from_secs(5)));
    }
}
