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
use log::warn;
use serde::Serialize;
use crate::definitions::{DeviceNumber, SettingRequest};
use crate::results::{DispatchResults, ResultTable, SettingResult};

pub const SUCCESS_TEXT: &str = "Successful";
pub const TIMEOUT_TEXT: &str = "Operation timed out";

/// One reported line: a setting and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingLine {
    pub setting: String,
    pub success: bool,
    pub code: u32,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub device: DeviceNumber,
    pub device_name: String,
    pub settings: Vec<SettingLine>,
}

/// Reportable summary of a finished dispatch, ready for a console or XML/JSON formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub title: String,
    pub devices: Vec<DeviceSummary>,
}

impl DispatchSummary {
    pub fn all_successful(&self) -> bool {
        self.lines().all(|line| line.success)
    }

    pub fn failure_count(&self) -> usize {
        self.lines().filter(|line| !line.success).count()
    }

    fn lines(&self) -> impl Iterator<Item = &SettingLine> {
        self.devices.iter().flat_map(|d| d.settings.iter())
    }
}

impl fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.title)?;
        for device in &self.devices {
            writeln!(f, "    {}:", device.device_name)?;
            let width = device.settings.iter().map(|s| s.setting.len()).max().unwrap_or(0);
            for line in &device.settings {
                writeln!(f, "        {:<width$} : {}", line.setting, line.status, width = width)?;
            }
        }
        Ok(())
    }
}

/// Turns result tables into reports. Holds no state of its own.
pub struct ResultAggregator;

impl ResultAggregator {
    /// Claims every cell still `Pending` as `TimedOut`. Returns the number of cells claimed.
    ///
    /// Cells already claimed by a worker keep their outcome, and a worker finishing after the
    /// sweep cannot overwrite a timed out cell.
    pub fn sweep_timeouts(table: &ResultTable) -> usize {
        let swept = table.claim_all_pending(&SettingResult::TimedOut);
        if swept > 0 {
            warn!("{} setting change(s) timed out", swept);
        }
        swept
    }

    pub fn status_text(result: &SettingResult) -> String {
        match result {
            SettingResult::Success => SUCCESS_TEXT.to_string(),
            SettingResult::Failed(failure) => format!("Failed: {}", failure),
            // A pending cell in a finished table can only mean the time budget ran out.
            SettingResult::Pending | SettingResult::TimedOut => format!("Failed: {}", TIMEOUT_TEXT),
        }
    }

    pub fn title(requests: &[SettingRequest]) -> &'static str {
        if requests.iter().all(|r| r.enabled) {
            "Enable Setting Results"
        } else if requests.iter().all(|r| !r.enabled) {
            "Disable Setting Results"
        } else {
            "Change Setting Results"
        }
    }

    pub fn summarize(results: &DispatchResults, requests: &[SettingRequest]) -> DispatchSummary {
        let devices = results
            .iter()
            .map(|(device, device_results)| DeviceSummary {
                device,
                device_name: device_results.device_name.clone(),
                settings: device_results
                    .settings
                    .iter()
                    .map(|(setting, result)| SettingLine {
                        setting: setting.clone(),
                        success: result.is_success(),
                        code: result.code(),
                        status: Self::status_text(result),
                    })
                    .collect(),
            })
            .collect();
        DispatchSummary {
            title: Self::title(requests).to_string(),
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingError;
    use crate::results::SettingFailure;

    fn requests() -> Vec<SettingRequest> {
        vec![SettingRequest::enable("led"), SettingRequest::enable("turbo")]
    }

    fn finished_table() -> ResultTable {
        let table = ResultTable::new(vec![(0, "mic0".into()), (1, "mic1".into())], &requests());
        table.claim(0, 0, SettingResult::Success);
        table.claim(0, 1, SettingResult::Success);
        table.claim(1, 0, SettingResult::Failed(SettingFailure::Setting(SettingError::DeviceNotOnline)));
        table
    }

    #[test]
    fn sweep_claims_only_pending_cells() {
        let table = finished_table();
        assert_eq!(ResultAggregator::sweep_timeouts(&table), 1);
        assert_eq!(ResultAggregator::sweep_timeouts(&table), 0);
        let results = table.snapshot();
        assert_eq!(results.get(1, "turbo"), Some(&SettingResult::TimedOut));
        assert_eq!(results.get(0, "turbo"), Some(&SettingResult::Success));
    }

    #[test]
    fn summary_reports_success_error_text_and_timeout() {
        let table = finished_table();
        ResultAggregator::sweep_timeouts(&table);
        let summary = ResultAggregator::summarize(&table.snapshot(), &requests());

        assert_eq!(summary.title, "Enable Setting Results");
        assert_eq!(summary.devices.len(), 2);
        assert_eq!(summary.devices[0].settings[0].status, "Successful");
        assert_eq!(summary.devices[1].settings[0].status, "Failed: Device not online");
        assert_eq!(summary.devices[1].settings[1].status, "Failed: Operation timed out");
        assert!(!summary.all_successful());
        assert_eq!(summary.failure_count(), 2);
    }

    #[test]
    fn summary_renders_one_line_per_setting() {
        let table = finished_table();
        ResultAggregator::sweep_timeouts(&table);
        let rendered = ResultAggregator::summarize(&table.snapshot(), &requests()).to_string();
        let expected = "\
Enable Setting Results:
    mic0:
        led   : Successful
        turbo : Successful
    mic1:
        led   : Failed: Device not online
        turbo : Failed: Operation timed out
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn title_follows_requested_direction() {
        assert_eq!(ResultAggregator::title(&[SettingRequest::disable("led")]), "Disable Setting Results");
        assert_eq!(
            ResultAggregator::title(&[SettingRequest::disable("led"), SettingRequest::enable("turbo")]),
            "Change Setting Results"
        );
    }

    #[test]
    fn summary_serializes_for_structured_formatters() {
        let table = finished_table();
        ResultAggregator::sweep_timeouts(&table);
        let summary = ResultAggregator::summarize(&table.snapshot(), &requests());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["devices"][1]["settings"][0]["code"], 0x0b);
        assert_eq!(json["devices"][0]["device_name"], "mic0");
    }
}
