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

pub mod definitions;
pub mod errors;
pub mod session;
pub mod retry;
pub mod registry;
pub mod results;
pub mod aggregator;
pub mod config;
pub mod dispatch;

pub use aggregator::{DispatchSummary, ResultAggregator};
pub use config::DispatchConfig;
pub use definitions::{DeviceNumber, SettingRequest};
pub use dispatch::{DispatchReport, Dispatcher, WorkItemState};
pub use errors::{DispatchError, HandleError, SettingError};
pub use registry::{DeviceHandle, HandleRegistry, RegistryEvent};
pub use results::{DispatchResults, SettingFailure, SettingResult};
pub use session::{DeviceProvider, DeviceSession, SessionRef};
