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

use std::fmt;
use futures::future::join_all;
use serde_json::{json, Value};
use micmgmt_core::errors::SettingError;
use micmgmt_core::SessionRef;

pub struct DeviceQuery {
    pub device_name: String,
    pub settings: Vec<(String, Result<bool, SettingError>)>,
}

/// Current state of the queried settings, per device in input order.
pub struct QueryReport {
    pub devices: Vec<DeviceQuery>,
}

impl QueryReport {
    pub fn all_successful(&self) -> bool {
        self.devices.iter().all(|d| d.settings.iter().all(|(_, value)| value.is_ok()))
    }

    pub fn to_json(&self) -> Value {
        let devices: Vec<Value> = self
            .devices
            .iter()
            .map(|device| {
                let settings: Vec<Value> = device
                    .settings
                    .iter()
                    .map(|(setting, value)| match value {
                        Ok(enabled) => json!({ "setting": setting, "enabled": enabled }),
                        Err(e) => json!({ "setting": setting, "code": e.code(), "error": e.to_string() }),
                    })
                    .collect();
                json!({ "device_name": device.device_name, "settings": settings })
            })
            .collect();
        json!({ "title": "Query Setting Results", "devices": devices })
    }
}

impl fmt::Display for QueryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Query Setting Results:")?;
        for device in &self.devices {
            writeln!(f, "    {}:", device.device_name)?;
            let width = device.settings.iter().map(|(s, _)| s.len()).max().unwrap_or(0);
            for (setting, value) in &device.settings {
                let status = match value {
                    Ok(true) => "Enabled".to_string(),
                    Ok(false) => "Disabled".to_string(),
                    Err(e) => format!("Failed: {}", e),
                };
                writeln!(f, "        {:<width$} : {}", setting, status, width = width)?;
            }
        }
        Ok(())
    }
}

/// Reads the settings of every session, one blocking task per device.
pub async fn query_settings(sessions: Vec<SessionRef>, settings: &[String]) -> anyhow::Result<QueryReport> {
    let tasks = sessions.into_iter().map(|session| {
        let settings = settings.to_vec();
        tokio::task::spawn_blocking(move || {
            let settings = settings
                .into_iter()
                .map(|setting| {
                    let value = session.get_setting(&setting);
                    (setting, value)
                })
                .collect();
            DeviceQuery { device_name: session.device_name(), settings }
        })
    });
    let devices = join_all(tasks).await.into_iter().collect::<Result<Vec<_>, _>>()?;
    Ok(QueryReport { devices })
}
