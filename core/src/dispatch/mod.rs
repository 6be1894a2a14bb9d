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

//! Concurrent application of a settings batch to many devices under one deadline.
//!
//! Every device gets one [`WorkItem`] holding the full, ordered batch. Items wait in a FIFO
//! queue and a fixed pool of blocking workers takes them one at a time, so a single device
//! never sees two of its settings in flight at once. When the deadline passes, the pool is
//! cancelled, every still pending result is marked timed out, and the call then waits for
//! in-flight device calls to return before handing back the results.

mod pool;
mod work_item;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use crate::aggregator::{DispatchSummary, ResultAggregator};
use crate::config::DispatchConfig;
use crate::definitions::{DeviceNumber, SettingRequest};
use crate::errors::DispatchError;
use crate::registry::{DeviceHandle, HandleRegistry};
use crate::results::{DispatchResults, ResultTable, SettingFailure, SettingResult};
use crate::session::SessionRef;

pub use pool::{hardware_parallelism, worker_count};
pub use work_item::{WorkItem, WorkItemState};
use pool::{WorkQueue, WorkerPool};

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub dispatch_id: Uuid,
    pub results: DispatchResults,
    pub work_items: BTreeMap<DeviceNumber, WorkItemState>,
    pub workers: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl DispatchReport {
    pub fn summary(&self, requests: &[SettingRequest]) -> DispatchSummary {
        ResultAggregator::summarize(&self.results, requests)
    }
}

pub struct Dispatcher {
    config: DispatchConfig,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Dispatches with the deadline from the configuration.
    pub async fn run(&self, sessions: Vec<SessionRef>, requests: &[SettingRequest]) -> Result<DispatchReport, DispatchError> {
        self.dispatch(sessions, requests, self.config.deadline).await
    }

    /// Resolves the handles against `registry` and dispatches to their sessions.
    ///
    /// Nothing is sent to any device if one of the handles does not resolve.
    pub async fn dispatch_handles(
        &self,
        registry: &HandleRegistry,
        handles: &[DeviceHandle],
        requests: &[SettingRequest],
        deadline: Option<Duration>,
    ) -> Result<DispatchReport, DispatchError> {
        let sessions = handles
            .iter()
            .map(|handle| registry.lookup(*handle))
            .collect::<Result<Vec<_>, _>>()?;
        self.dispatch(sessions, requests, deadline).await
    }

    /// Applies every request, in order, to every session.
    ///
    /// Returns only after all workers have exited, with exactly one entry per
    /// (device, setting) pair and no entry left pending.
    pub async fn dispatch(
        &self,
        sessions: Vec<SessionRef>,
        requests: &[SettingRequest],
        deadline: Option<Duration>,
    ) -> Result<DispatchReport, DispatchError> {
        validate(&sessions, requests)?;

        let dispatch_id = Uuid::new_v4();
        let started = Instant::now();
        let table = Arc::new(ResultTable::new(
            sessions.iter().map(|s| (s.device_number(), s.device_name())),
            requests,
        ));
        let mut work_items: BTreeMap<DeviceNumber, WorkItemState> =
            sessions.iter().map(|s| (s.device_number(), WorkItemState::Queued)).collect();

        let workers = worker_count(self.config.max_workers, sessions.len());
        info!(
            "Dispatch {}: {} setting(s) to {} device(s) on {} worker(s), deadline {:?}",
            dispatch_id, requests.len(), sessions.len(), workers, deadline
        );

        let batch: Arc<[SettingRequest]> = Arc::from(requests);
        let queue = Arc::new(WorkQueue::new(
            sessions.into_iter().enumerate().map(|(row, session)| WorkItem::new(row, session, batch.clone())),
        ));
        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::start(workers, queue.clone(), table.clone(), cancel.clone());

        let timed_out = match deadline {
            None => {
                pool.join_all(&mut work_items).await;
                false
            }
            Some(deadline) => tokio::time::timeout(deadline, pool.join_all(&mut work_items)).await.is_err(),
        };

        if timed_out {
            warn!("Dispatch {}: deadline of {:?} passed, cancelling", dispatch_id, deadline.unwrap_or_default());
            cancel.cancel();
            ResultAggregator::sweep_timeouts(&table);
            pool.join_all(&mut work_items).await;
        }

        for item in queue.drain() {
            work_items.insert(item.device(), WorkItemState::Cancelled);
        }
        for state in work_items.values_mut() {
            if matches!(state, WorkItemState::Queued | WorkItemState::Running) {
                *state = WorkItemState::Cancelled;
            }
        }

        // Left pending only when a worker died mid item.
        let orphaned = table.claim_all_pending(&SettingResult::Failed(SettingFailure::Aborted));
        if orphaned > 0 {
            error!("Dispatch {}: {} setting change(s) lost with a failed worker", dispatch_id, orphaned);
        }

        let results = table.snapshot();
        let elapsed = started.elapsed();
        let counts = results.counts();
        info!(
            "Dispatch {} finished in {:?}: {} succeeded, {} failed, {} timed out",
            dispatch_id, elapsed, counts.succeeded, counts.failed, counts.timed_out
        );

        Ok(DispatchReport { dispatch_id, results, work_items, workers, timed_out, elapsed })
    }
}

fn validate(sessions: &[SessionRef], requests: &[SettingRequest]) -> Result<(), DispatchError> {
    let mut names = HashSet::new();
    if let Some(duplicate) = requests.iter().find(|r| !names.insert(r.name.as_str())) {
        return Err(DispatchError::DuplicateSetting(duplicate.name.clone()));
    }
    let mut devices = HashSet::new();
    if let Some(duplicate) = sessions.iter().map(|s| s.device_number()).find(|d| !devices.insert(*d)) {
        return Err(DispatchError::DuplicateDevice(duplicate));
    }
    Ok(())
}
