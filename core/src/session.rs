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

use crate::definitions::{device_name, DeviceNumber, DEFAULT_DEVICE_BASE_NAME};
use crate::errors::SettingError;

/// One open, stateful connection to a physical coprocessor.
///
/// Every call blocks until the device answers. Implementations may retry internally with
/// their own bounded policy (see [`crate::retry::RetryingSession`]); callers treat each call
/// as a single opaque step.
pub trait DeviceSession: Send + Sync {
    fn device_number(&self) -> DeviceNumber;

    fn device_name(&self) -> String {
        device_name(DEFAULT_DEVICE_BASE_NAME, self.device_number())
    }

    /// Enable or disable a named setting.
    fn set_setting(&self, name: &str, enabled: bool) -> Result<(), SettingError>;

    /// Read back the current state of a named setting.
    fn get_setting(&self, name: &str) -> Result<bool, SettingError>;

    /// Release the underlying device. Called exactly once, by the registry.
    fn close(&self) -> Result<(), SettingError> {
        Ok(())
    }
}

/// Device enumeration and session factory of the platform backend.
pub trait DeviceProvider: Send + Sync {
    fn device_count(&self) -> usize;

    fn base_name(&self) -> &str {
        DEFAULT_DEVICE_BASE_NAME
    }

    fn device_number_to_name(&self, device: DeviceNumber) -> String {
        device_name(self.base_name(), device)
    }

    fn is_device_available(&self, device: DeviceNumber) -> bool {
        (device as usize) < self.device_count()
    }

    /// Open a fresh session on a device. May block on device I/O.
    fn open_device(&self, device: DeviceNumber) -> Result<Box<dyn DeviceSession>, SettingError>;
}

/// Shared reference to an open session, as handed out by the registry.
pub type SessionRef = std::sync::Arc<dyn DeviceSession>;
