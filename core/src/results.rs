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

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use crate::definitions::{DeviceNumber, SettingRequest};
use crate::errors::{status_code, SettingError};

/// Why a setting change did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingFailure {
    /// The device rejected or failed the call.
    Setting(SettingError),
    /// Not attempted, an earlier setting on the same device failed unrecoverably.
    Aborted,
}

impl SettingFailure {
    pub fn code(&self) -> u32 {
        match self {
            SettingFailure::Setting(e) => e.code(),
            SettingFailure::Aborted => status_code::DEVICE_IO_ERROR,
        }
    }
}

impl fmt::Display for SettingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingFailure::Setting(e) => write!(f, "{}", e),
            SettingFailure::Aborted => write!(f, "Aborted after an earlier device I/O error"),
        }
    }
}

/// Final (or, while dispatch runs, current) state of one (device, setting) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingResult {
    Pending,
    Success,
    Failed(SettingFailure),
    TimedOut,
}

impl SettingResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, SettingResult::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SettingResult::Success)
    }

    pub fn code(&self) -> u32 {
        match self {
            SettingResult::Pending | SettingResult::TimedOut => status_code::TIMEOUT,
            SettingResult::Success => status_code::SUCCESS,
            SettingResult::Failed(failure) => failure.code(),
        }
    }
}

impl From<Result<(), SettingError>> for SettingResult {
    fn from(result: Result<(), SettingError>) -> Self {
        match result {
            Ok(()) => SettingResult::Success,
            Err(e) => SettingResult::Failed(SettingFailure::Setting(e)),
        }
    }
}

/// A result cell that can leave `Pending` exactly once.
pub struct ResultCell {
    setting: String,
    outcome: OnceLock<SettingResult>,
}

impl ResultCell {
    fn new(setting: String) -> Self {
        Self { setting, outcome: OnceLock::new() }
    }

    pub fn setting(&self) -> &str {
        &self.setting
    }

    /// Moves the cell out of `Pending`. Returns `false` if someone else already did.
    pub fn claim(&self, outcome: SettingResult) -> bool {
        debug_assert!(!outcome.is_pending(), "a cell cannot be claimed back to Pending");
        self.outcome.set(outcome).is_ok()
    }

    pub fn get(&self) -> SettingResult {
        self.outcome.get().cloned().unwrap_or(SettingResult::Pending)
    }
}

/// Result cells of one device, in request order.
pub struct DeviceRow {
    device: DeviceNumber,
    device_name: String,
    cells: Vec<ResultCell>,
}

impl DeviceRow {
    pub fn device(&self) -> DeviceNumber {
        self.device
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn cells(&self) -> &[ResultCell] {
        &self.cells
    }
}

/// Shared result table written concurrently by dispatch workers and the timeout sweep.
///
/// Shape is fixed at construction: one row per device, one cell per requested setting,
/// every cell `Pending`.
pub struct ResultTable {
    rows: Vec<DeviceRow>,
}

impl ResultTable {
    pub fn new<I>(devices: I, requests: &[SettingRequest]) -> Self
    where
        I: IntoIterator<Item = (DeviceNumber, String)>,
    {
        let rows = devices
            .into_iter()
            .map(|(device, device_name)| DeviceRow {
                device,
                device_name,
                cells: requests.iter().map(|r| ResultCell::new(r.name.clone())).collect(),
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[DeviceRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> &DeviceRow {
        &self.rows[index]
    }

    pub fn claim(&self, row: usize, cell: usize, outcome: SettingResult) -> bool {
        self.rows[row].cells[cell].claim(outcome)
    }

    pub fn cells(&self) -> impl Iterator<Item = &ResultCell> {
        self.rows.iter().flat_map(|row| row.cells.iter())
    }

    pub fn pending_count(&self) -> usize {
        self.cells().filter(|cell| cell.get().is_pending()).count()
    }

    /// Claims every still pending cell with `outcome`. Returns how many cells it claimed.
    pub fn claim_all_pending(&self, outcome: &SettingResult) -> usize {
        self.cells().filter(|cell| cell.claim(outcome.clone())).count()
    }

    pub fn snapshot(&self) -> DispatchResults {
        let devices = self
            .rows
            .iter()
            .map(|row| {
                let settings = row
                    .cells
                    .iter()
                    .map(|cell| (cell.setting.clone(), cell.get()))
                    .collect();
                (row.device, DeviceResults { device_name: row.device_name.clone(), settings })
            })
            .collect();
        DispatchResults { devices }
    }
}

/// Results of one device, settings in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResults {
    pub device_name: String,
    pub settings: Vec<(String, SettingResult)>,
}

impl DeviceResults {
    pub fn get(&self, setting: &str) -> Option<&SettingResult> {
        self.settings
            .iter()
            .find(|(name, _)| name == setting)
            .map(|(_, result)| result)
    }
}

/// Number of cells per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub pending: usize,
}

/// Immutable snapshot of a result table, keyed by device number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchResults {
    devices: BTreeMap<DeviceNumber, DeviceResults>,
}

impl DispatchResults {
    pub fn device(&self, device: DeviceNumber) -> Option<&DeviceResults> {
        self.devices.get(&device)
    }

    pub fn get(&self, device: DeviceNumber, setting: &str) -> Option<&SettingResult> {
        self.devices.get(&device)?.get(setting)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceNumber, &DeviceResults)> {
        self.devices.iter().map(|(device, results)| (*device, results))
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Total number of (device, setting) entries.
    pub fn len(&self) -> usize {
        self.devices.values().map(|d| d.settings.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for (_, result) in self.devices.values().flat_map(|d| d.settings.iter()) {
            match result {
                SettingResult::Pending => counts.pending += 1,
                SettingResult::Success => counts.succeeded += 1,
                SettingResult::Failed(_) => counts.failed += 1,
                SettingResult::TimedOut => counts.timed_out += 1,
            }
        }
        counts
    }
}
