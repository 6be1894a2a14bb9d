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

use std::sync::Arc;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;
use crate::definitions::{DeviceNumber, SettingRequest};
use crate::results::{ResultTable, SettingFailure, SettingResult};
use crate::session::SessionRef;

/// Lifecycle of one device's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItemState {
    Queued,
    Running,
    Completed,
    Cancelled,
}

/// One device's ordered batch of setting changes, run start to end by a single worker.
pub struct WorkItem {
    row: usize,
    session: SessionRef,
    requests: Arc<[SettingRequest]>,
    state: WorkItemState,
}

impl WorkItem {
    /// `row` is the device's row in the result table the item reports into.
    pub fn new(row: usize, session: SessionRef, requests: Arc<[SettingRequest]>) -> Self {
        Self { row, session, requests, state: WorkItemState::Queued }
    }

    pub fn device(&self) -> DeviceNumber {
        self.session.device_number()
    }

    pub fn state(&self) -> WorkItemState {
        self.state
    }

    /// Applies the settings in order, recording each outcome as the call returns.
    ///
    /// The cancellation token is only consulted between settings; a call already in flight
    /// always runs to its end and its outcome is offered to the table like any other.
    pub fn run(&mut self, table: &ResultTable, cancel: &CancellationToken) {
        self.state = WorkItemState::Running;
        let name = self.session.device_name();
        let cells = table.row(self.row).cells();
        let requests = self.requests.clone();

        for (index, request) in requests.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!("{}: cancelled before {}", name, request);
                return self.finish(WorkItemState::Cancelled);
            }

            let outcome = self.session.set_setting(&request.name, request.enabled);
            let unrecoverable = matches!(&outcome, Err(e) if e.is_unrecoverable());
            let result = SettingResult::from(outcome);
            debug!("{}: {} -> {:?}", name, request, result);
            if !cells[index].claim(result) {
                warn!("{}: {} finished after its cell was claimed, result discarded", name, request);
            }

            if unrecoverable {
                // Leave the rest to the timeout sweep once the deadline has passed.
                if cancel.is_cancelled() {
                    return self.finish(WorkItemState::Cancelled);
                }
                let remaining = &cells[index + 1..];
                if !remaining.is_empty() {
                    warn!("{}: device I/O error, skipping {} remaining setting(s)", name, remaining.len());
                }
                for cell in remaining {
                    cell.claim(SettingResult::Failed(SettingFailure::Aborted));
                }
                break;
            }
        }
        self.finish(WorkItemState::Completed)
    }

    fn finish(&mut self, state: WorkItemState) {
        self.state = state;
    }
}
