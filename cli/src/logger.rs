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

use std::path::Path;
use log::{debug, LevelFilter};
use log4rs::{
    append::file::FileAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use crate::cli::LogLevel;

pub fn get_logger_pattern() -> PatternEncoder {
    PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} - {l} - {t} - {m}\n")
}

pub fn build_logger_config(log_file: &Path, log_level: LogLevel) -> anyhow::Result<Config> {
    let file_appender = FileAppender::builder()
        .encoder(Box::new(get_logger_pattern()))
        .build(log_file)?;

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .build(Root::builder().appender("file").build(LevelFilter::from(log_level)))?;
    Ok(config)
}

/// Logs to `log_file` when given, otherwise to stderr through `env_logger` (`RUST_LOG` wins).
pub fn init_logger(log_level: LogLevel, log_file: Option<&Path>) -> anyhow::Result<()> {
    match log_file {
        Some(log_file) => {
            log4rs::init_config(build_logger_config(log_file, log_level)?)?;
        }
        None => {
            env_logger::Builder::new()
                .filter_level(LevelFilter::from(log_level))
                .parse_default_env()
                .try_init()?;
        }
    }
    debug!("Logger initialized with level: {}", LevelFilter::from(log_level));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_targets_the_given_file() {
        let log_file = std::env::temp_dir().join(format!("micsmc-log-{}.log", std::process::id()));
        let config = build_logger_config(&log_file, LogLevel::Debug).unwrap();

        assert_eq!(config.root().level(), LevelFilter::Debug);
        assert_eq!(config.appenders().len(), 1);
        assert!(log_file.exists());
        std::fs::remove_file(&log_file).unwrap();
    }
}
