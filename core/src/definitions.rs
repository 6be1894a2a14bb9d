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

/// Zero based number of a coprocessor as reported by device enumeration.
pub type DeviceNumber = u32;

/// Base name of coprocessor devices, a device name is the base name followed by its number.
pub const DEFAULT_DEVICE_BASE_NAME: &str = "mic";

pub const SETTING_LED: &str = "led";
pub const SETTING_TURBO: &str = "turbo";
pub const SETTING_ECC: &str = "ecc";
pub const SETTING_CPUFREQ: &str = "cpufreq";
pub const SETTING_COREC6: &str = "corec6";
pub const SETTING_PC3: &str = "pc3";
pub const SETTING_PC6: &str = "pc6";

/// Writable settings known to the coprocessor tools.
pub const KNOWN_SETTINGS: [&str; 7] = [
    SETTING_LED,
    SETTING_TURBO,
    SETTING_ECC,
    SETTING_CPUFREQ,
    SETTING_COREC6,
    SETTING_PC3,
    SETTING_PC6,
];

/// Builds the name of a device from a base name and a device number, e.g. `mic3`.
pub fn device_name(base_name: &str, device: DeviceNumber) -> String {
    format!("{}{}", base_name, device)
}

/// Parses a device name of the form `<base_name><number>`.
///
/// Returns `None` when the prefix does not match or the suffix is not a plain decimal number.
pub fn parse_device_name(base_name: &str, name: &str) -> Option<DeviceNumber> {
    let digits = name.strip_prefix(base_name)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// One requested change of a named boolean setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SettingRequest {
    pub name: String,
    pub enabled: bool,
}

impl SettingRequest {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self { name: name.into(), enabled }
    }

    pub fn enable(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    pub fn disable(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }
}

impl fmt::Display for SettingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = if self.enabled { "enable" } else { "disable" };
        write!(f, "{} {}", action, self.name)
    }
}
