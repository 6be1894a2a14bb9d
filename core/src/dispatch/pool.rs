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

use std::collections::{BTreeMap, VecDeque};
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use log::{debug, error};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use crate::definitions::DeviceNumber;
use crate::results::ResultTable;
use super::work_item::{WorkItem, WorkItemState};

/// Number of hardware threads, or 1 when it cannot be determined.
pub fn hardware_parallelism() -> usize {
    std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

/// Workers for a dispatch: never more than there are devices or hardware threads, and never
/// more than the configured limit.
pub fn worker_count(max_workers: Option<usize>, devices: usize) -> usize {
    let hardware = hardware_parallelism();
    max_workers.unwrap_or(hardware).max(1).min(hardware).min(devices)
}

/// FIFO of work items not yet taken by a worker.
pub(crate) struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
}

impl WorkQueue {
    pub fn new(items: impl IntoIterator<Item = WorkItem>) -> Self {
        Self { items: Mutex::new(items.into_iter().collect()) }
    }

    pub fn pop(&self) -> Option<WorkItem> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    /// Removes every item no worker started.
    pub fn drain(&self) -> Vec<WorkItem> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).drain(..).collect()
    }
}

type Finished = Vec<(DeviceNumber, WorkItemState)>;

/// Fixed set of blocking workers pulling from one queue.
pub(crate) struct WorkerPool {
    workers: JoinSet<Finished>,
}

impl WorkerPool {
    pub fn start(size: usize, queue: Arc<WorkQueue>, table: Arc<ResultTable>, cancel: CancellationToken) -> Self {
        let mut workers = JoinSet::new();
        for worker in 0..size {
            let queue = queue.clone();
            let table = table.clone();
            let cancel = cancel.clone();
            workers.spawn_blocking(move || run_worker(worker, &queue, &table, &cancel));
        }
        Self { workers }
    }

    /// Waits for every worker to return, collecting the final state of each item they ran.
    ///
    /// Cancel safe: states of workers joined before the future is dropped stay in `finished`.
    pub async fn join_all(&mut self, finished: &mut BTreeMap<DeviceNumber, WorkItemState>) {
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(states) => finished.extend(states),
                Err(e) if e.is_panic() => error!("Dispatch worker panicked: {}", e),
                Err(e) => error!("Dispatch worker did not finish: {}", e),
            }
        }
    }
}

fn run_worker(worker: usize, queue: &WorkQueue, table: &ResultTable, cancel: &CancellationToken) -> Finished {
    let mut finished = Vec::new();
    while !cancel.is_cancelled() {
        let Some(mut item) = queue.pop() else { break };
        let state = match catch_unwind(AssertUnwindSafe(|| item.run(table, cancel))) {
            Ok(()) => item.state(),
            Err(_) => {
                error!("Worker {}: session of device {} panicked, moving on", worker, item.device());
                WorkItemState::Cancelled
            }
        };
        finished.push((item.device(), state));
    }
    debug!("Worker {} exiting after {} work item(s)", worker, finished.len());
    finished
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_bounded_by_devices() {
        let hardware = hardware_parallelism();
        assert_eq!(worker_count(Some(8), 3), hardware.min(3));
        assert_eq!(worker_count(Some(2), 3), hardware.min(2));
        assert_eq!(worker_count(None, 1), 1);
        assert_eq!(worker_count(None, 0), 0);
        assert_eq!(worker_count(None, 10_000), hardware_parallelism());
    }

    #[test]
    fn configured_limit_is_capped_by_hardware() {
        let hardware = hardware_parallelism();
        assert_eq!(worker_count(Some(hardware * 4), usize::MAX), hardware);
        assert_eq!(worker_count(Some(hardware * 4), 1), 1);
    }

    #[test]
    fn zero_limit_still_gets_one_worker() {
        assert_eq!(worker_count(Some(0), 4), 1);
    }
}
