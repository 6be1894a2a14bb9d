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

//! In-memory coprocessor fleet.
//!
//! Every simulated device keeps its settings in memory, so a value written through one session
//! is read back by the next. Per device, calls can be slowed down, the device can be taken
//! offline, and individual settings can be made unsupported or made to fail with a chosen error.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use log::{debug, info};
use micmgmt_core::definitions::{device_name, DeviceNumber, DEFAULT_DEVICE_BASE_NAME, KNOWN_SETTINGS};
use micmgmt_core::errors::SettingError;
use micmgmt_core::retry::{RetryPolicy, RetryingSession};
use micmgmt_core::session::{DeviceProvider, DeviceSession};

/// Behaviour of one simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    latency: Duration,
    online: bool,
    unsupported: HashSet<String>,
    failures: HashMap<String, SettingError>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self { latency: Duration::ZERO, online: true, unsupported: HashSet::new(), failures: HashMap::new() }
    }
}

impl SimulatedDevice {
    /// Time every setting call takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Device opens but every setting call reports it is not online.
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    pub fn unsupported(mut self, setting: &str) -> Self {
        self.unsupported.insert(setting.to_string());
        self
    }

    pub fn failing(mut self, setting: &str, error: SettingError) -> Self {
        self.failures.insert(setting.to_string(), error);
        self
    }
}

type SettingValues = Arc<Mutex<HashMap<String, bool>>>;

pub struct SimulatedDeviceProvider {
    base_name: String,
    devices: Vec<SimulatedDevice>,
    values: Vec<SettingValues>,
    retry: RetryPolicy,
}

impl SimulatedDeviceProvider {
    /// `count` well behaved devices.
    pub fn new(count: usize) -> Self {
        Self::with_devices(vec![SimulatedDevice::default(); count])
    }

    pub fn with_devices(devices: Vec<SimulatedDevice>) -> Self {
        let values = devices
            .iter()
            .map(|_| {
                let initial = KNOWN_SETTINGS.iter().map(|s| (s.to_string(), false)).collect();
                Arc::new(Mutex::new(initial))
            })
            .collect();
        Self { base_name: DEFAULT_DEVICE_BASE_NAME.to_string(), devices, values, retry: RetryPolicy::none() }
    }

    pub fn with_base_name(mut self, base_name: &str) -> Self {
        self.base_name = base_name.to_string();
        self
    }

    /// Sessions retry transient failures with `policy`. Off by default.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Current value of a setting, bypassing any session.
    pub fn setting(&self, device: DeviceNumber, setting: &str) -> Option<bool> {
        let values = self.values.get(device as usize)?;
        values.lock().unwrap_or_else(PoisonError::into_inner).get(setting).copied()
    }
}

impl DeviceProvider for SimulatedDeviceProvider {
    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn base_name(&self) -> &str {
        &self.base_name
    }

    fn open_device(&self, device: DeviceNumber) -> Result<Box<dyn DeviceSession>, SettingError> {
        let index = device as usize;
        let (Some(config), Some(values)) = (self.devices.get(index), self.values.get(index)) else {
            return Err(SettingError::Other(format!("No such device: {}", device)));
        };
        let name = device_name(&self.base_name, device);
        info!("Opened simulated device {}", name);
        let session = SimulatedSession { device, name, config: config.clone(), values: values.clone() };
        Ok(Box::new(RetryingSession::new(session, self.retry)))
    }
}

pub struct SimulatedSession {
    device: DeviceNumber,
    name: String,
    config: SimulatedDevice,
    values: SettingValues,
}

impl SimulatedSession {
    fn check(&self, setting: &str) -> Result<(), SettingError> {
        std::thread::sleep(self.config.latency);
        if !self.config.online {
            return Err(SettingError::DeviceNotOnline);
        }
        if let Some(error) = self.config.failures.get(setting) {
            return Err(error.clone());
        }
        if self.config.unsupported.contains(setting) {
            return Err(SettingError::NotSupported);
        }
        Ok(())
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, bool>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceSession for SimulatedSession {
    fn device_number(&self) -> DeviceNumber {
        self.device
    }

    fn device_name(&self) -> String {
        self.name.clone()
    }

    fn set_setting(&self, name: &str, enabled: bool) -> Result<(), SettingError> {
        self.check(name)?;
        match self.values().get_mut(name) {
            Some(value) => {
                *value = enabled;
                debug!("{}: {} {}", self.name, name, if enabled { "enabled" } else { "disabled" });
                Ok(())
            }
            None => Err(SettingError::NotSupported),
        }
    }

    fn get_setting(&self, name: &str) -> Result<bool, SettingError> {
        self.check(name)?;
        self.values().get(name).copied().ok_or(SettingError::NotSupported)
    }

    fn close(&self) -> Result<(), SettingError> {
        debug!("Closed simulated device {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micmgmt_core::registry::HandleRegistry;
    use micmgmt_core::results::{SettingFailure, SettingResult};
    use micmgmt_core::{DispatchConfig, Dispatcher, SettingRequest};

    #[test]
    fn values_survive_reopening() {
        let provider = SimulatedDeviceProvider::new(2);
        let session = provider.open_device(1).unwrap();
        session.set_setting("led", true).unwrap();
        drop(session);

        let session = provider.open_device(1).unwrap();
        assert_eq!(session.get_setting("led"), Ok(true));
        assert_eq!(provider.setting(1, "led"), Some(true));
        assert_eq!(provider.setting(0, "led"), Some(false));
    }

    #[test]
    fn unknown_device_does_not_open() {
        let provider = SimulatedDeviceProvider::new(1);
        assert!(provider.open_device(1).is_err());
        assert!(!provider.is_device_available(1));
    }

    #[test]
    fn configured_faults_are_reported() {
        let provider = SimulatedDeviceProvider::with_devices(vec![
            SimulatedDevice::default().offline(),
            SimulatedDevice::default().unsupported("ecc").failing("turbo", SettingError::DeviceBusy),
        ]);
        let offline = provider.open_device(0).unwrap();
        assert_eq!(offline.set_setting("led", true), Err(SettingError::DeviceNotOnline));

        let faulty = provider.open_device(1).unwrap();
        assert_eq!(faulty.set_setting("ecc", true), Err(SettingError::NotSupported));
        assert_eq!(faulty.set_setting("turbo", true), Err(SettingError::DeviceBusy));
        assert_eq!(faulty.set_setting("nonsense", true), Err(SettingError::NotSupported));
        assert_eq!(faulty.set_setting("led", true), Ok(()));
    }

    #[test]
    fn transient_failures_are_retried() {
        let provider = SimulatedDeviceProvider::with_devices(vec![
            SimulatedDevice::default().failing("turbo", SettingError::DeviceBusy),
        ])
        .with_retry(RetryPolicy::new(3, Duration::from_millis(10)));
        let session = provider.open_device(0).unwrap();

        let started = std::time::Instant::now();
        assert_eq!(session.set_setting("turbo", true), Err(SettingError::DeviceBusy));
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(session.set_setting("led", true), Ok(()));
    }

    #[test]
    fn names_follow_base_name() {
        let provider = SimulatedDeviceProvider::new(3).with_base_name("acc");
        assert_eq!(provider.device_number_to_name(2), "acc2");
        assert_eq!(provider.open_device(2).unwrap().device_name(), "acc2");
    }

    #[tokio::test]
    async fn fleet_dispatch_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let provider = Arc::new(SimulatedDeviceProvider::with_devices(vec![
            SimulatedDevice::default(),
            SimulatedDevice::default().with_latency(Duration::from_millis(5)),
            SimulatedDevice::default().failing("turbo", SettingError::CommunicationFailure),
        ]));
        let registry = HandleRegistry::new(provider.clone());
        let handles = (0..3).map(|d| registry.open(d)).collect::<Result<Vec<_>, _>>().unwrap();
        let requests = vec![SettingRequest::enable("turbo"), SettingRequest::enable("led")];

        let report = Dispatcher::new(DispatchConfig::default().with_max_workers(2))
            .dispatch_handles(&registry, &handles, &requests, Some(Duration::from_secs(5)))
            .await
            .unwrap();

        assert!(!report.timed_out);
        assert_eq!(report.results.counts().succeeded, 4);
        assert_eq!(report.results.get(2, "led"), Some(&SettingResult::Failed(SettingFailure::Aborted)));
        assert_eq!(provider.setting(0, "turbo"), Some(true));
        assert_eq!(provider.setting(2, "led"), Some(false));

        registry.close_all();
        assert!(registry.open_handles().is_empty());
    }
}
