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

use thiserror::Error;
use crate::definitions::DeviceNumber;

/// Status codes of the coprocessor SDK the errors below map onto.
pub mod status_code {
    pub const SUCCESS: u32 = 0x00;
    pub const DEVICE_NOT_OPEN: u32 = 0x0a;
    pub const DEVICE_NOT_ONLINE: u32 = 0x0b;
    pub const DEVICE_IO_ERROR: u32 = 0x0c;
    pub const INTERNAL_ERROR: u32 = 0x0e;
    pub const NOT_SUPPORTED: u32 = 0x0f;
    pub const DEVICE_BUSY: u32 = 0x12;
    pub const NO_SUCH_DEVICE: u32 = 0x13;
    pub const DEVICE_NOT_READY: u32 = 0x14;
    pub const TIMEOUT: u32 = 0x1b;
    pub const NO_MEMORY: u32 = 0x1d;
    pub const DEVICE_ALREADY_OPEN: u32 = 0x1e;
}

/// Failure reported by a device session when reading or writing a setting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    #[error("Device I/O error")]
    CommunicationFailure,

    #[error("Operation not supported")]
    NotSupported,

    #[error("Device not online")]
    DeviceNotOnline,

    #[error("Device not ready")]
    DeviceNotReady,

    #[error("Device busy")]
    DeviceBusy,

    #[error("{0}")]
    Other(String),
}

impl SettingError {
    pub fn code(&self) -> u32 {
        match self {
            SettingError::CommunicationFailure => status_code::DEVICE_IO_ERROR,
            SettingError::NotSupported => status_code::NOT_SUPPORTED,
            SettingError::DeviceNotOnline => status_code::DEVICE_NOT_ONLINE,
            SettingError::DeviceNotReady => status_code::DEVICE_NOT_READY,
            SettingError::DeviceBusy => status_code::DEVICE_BUSY,
            SettingError::Other(_) => status_code::INTERNAL_ERROR,
        }
    }

    /// The device can no longer be talked to; nothing else should be attempted on it.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, SettingError::CommunicationFailure)
    }

    /// Worth another attempt after a short delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, SettingError::CommunicationFailure | SettingError::DeviceBusy)
    }
}

impl From<String> for SettingError {
    fn from(other: String) -> Self {
        SettingError::Other(other)
    }
}

/// Errors of the handle registry.
#[derive(Error, Debug)]
pub enum HandleError {
    #[error("Device {0} is already open")]
    AlreadyOpen(DeviceNumber),

    #[error("No such device: {0}")]
    NotFound(String),

    #[error("Invalid device handle")]
    InvalidHandle,

    #[error("Device not open")]
    NotOpen,

    #[error("No free session slot left (capacity {0})")]
    OutOfSlots(usize),

    #[error("Failed to open device {device}: {source}")]
    OpenFailed {
        device: DeviceNumber,
        #[source]
        source: SettingError,
    },
}

impl HandleError {
    pub fn code(&self) -> u32 {
        match self {
            HandleError::AlreadyOpen(_) => status_code::DEVICE_ALREADY_OPEN,
            HandleError::NotFound(_) => status_code::NO_SUCH_DEVICE,
            HandleError::InvalidHandle | HandleError::NotOpen => status_code::DEVICE_NOT_OPEN,
            HandleError::OutOfSlots(_) => status_code::NO_MEMORY,
            HandleError::OpenFailed { source, .. } => source.code(),
        }
    }
}

/// Errors rejecting a dispatch request before any work is scheduled.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Setting {0} requested more than once")]
    DuplicateSetting(String),

    #[error("Device {0} listed more than once")]
    DuplicateDevice(DeviceNumber),

    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_errors_render_sdk_error_text() {
        assert_eq!(SettingError::CommunicationFailure.to_string(), "Device I/O error");
        assert_eq!(SettingError::NotSupported.to_string(), "Operation not supported");
        assert_eq!(SettingError::DeviceNotOnline.to_string(), "Device not online");
        assert_eq!(SettingError::from("bus reset".to_string()).to_string(), "bus reset");
    }

    #[test]
    fn only_communication_failure_is_unrecoverable() {
        assert!(SettingError::CommunicationFailure.is_unrecoverable());
        assert!(!SettingError::DeviceBusy.is_unrecoverable());
        assert!(!SettingError::NotSupported.is_unrecoverable());
        assert!(SettingError::DeviceBusy.is_transient());
        assert!(!SettingError::DeviceNotOnline.is_transient());
    }

    #[test]
    fn handle_errors_map_to_sdk_codes() {
        assert_eq!(HandleError::AlreadyOpen(1).code(), status_code::DEVICE_ALREADY_OPEN);
        assert_eq!(HandleError::InvalidHandle.code(), status_code::DEVICE_NOT_OPEN);
        let open_failed = HandleError::OpenFailed { device: 2, source: SettingError::DeviceBusy };
        assert_eq!(open_failed.code(), status_code::DEVICE_BUSY);
        assert_eq!(open_failed.to_string(), "Failed to open device 2: Device busy");
    }
}
