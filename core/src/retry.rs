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

use std::time::Duration;
use log::debug;
use crate::definitions::DeviceNumber;
use crate::errors::SettingError;
use crate::session::DeviceSession;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// A policy doing exactly one attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `operation` until it succeeds, fails with a non transient error or the attempts
    /// are used up. The last error is returned.
    pub fn run<T, F>(&self, mut operation: F) -> Result<T, SettingError>
    where
        F: FnMut() -> Result<T, SettingError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!("Attempt {}/{} failed: {}; retrying in {:?}", attempt, attempts, e, self.delay);
                    attempt += 1;
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Session decorator retrying transient failures of reads and writes.
pub struct RetryingSession<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: DeviceSession> RetryingSession<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: DeviceSession> DeviceSession for RetryingSession<S> {
    fn device_number(&self) -> DeviceNumber {
        self.inner.device_number()
    }

    fn device_name(&self) -> String {
        self.inner.device_name()
    }

    fn set_setting(&self, name: &str, enabled: bool) -> Result<(), SettingError> {
        self.policy.run(|| self.inner.set_setting(name, enabled))
    }

    fn get_setting(&self, name: &str) -> Result<bool, SettingError> {
        self.policy.run(|| self.inner.get_setting(name))
    }

    fn close(&self) -> Result<(), SettingError> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakySession {
        failures: Mutex<Vec<SettingError>>,
        calls: Mutex<u32>,
    }

    impl FlakySession {
        fn failing_with(failures: Vec<SettingError>) -> Self {
            Self { failures: Mutex::new(failures), calls: Mutex::new(0) }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl DeviceSession for FlakySession {
        fn device_number(&self) -> DeviceNumber {
            0
        }

        fn set_setting(&self, _name: &str, _enabled: bool) -> Result<(), SettingError> {
            *self.calls.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures.remove(0))
            }
        }

        fn get_setting(&self, _name: &str) -> Result<bool, SettingError> {
            self.set_setting("", true).map(|_| true)
        }
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let session = RetryingSession::new(
            FlakySession::failing_with(vec![SettingError::DeviceBusy, SettingError::CommunicationFailure]),
            quick_policy(3),
        );
        assert_eq!(session.set_setting("led", true), Ok(()));
        assert_eq!(session.inner().calls(), 3);
    }

    #[test]
    fn retries_stop_after_max_attempts_with_last_error() {
        let session = RetryingSession::new(
            FlakySession::failing_with(vec![
                SettingError::DeviceBusy,
                SettingError::DeviceBusy,
                SettingError::CommunicationFailure,
            ]),
            quick_policy(3),
        );
        assert_eq!(session.set_setting("led", true), Err(SettingError::CommunicationFailure));
        assert_eq!(session.inner().calls(), 3);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let session = RetryingSession::new(
            FlakySession::failing_with(vec![SettingError::NotSupported]),
            quick_policy(5),
        );
        assert_eq!(session.get_setting("pc6"), Err(SettingError::NotSupported));
        assert_eq!(session.inner().calls(), 1);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), SettingError> = policy.run(|| {
            calls += 1;
            Err(SettingError::DeviceBusy)
        });
        assert_eq!(result, Err(SettingError::DeviceBusy));
        assert_eq!(calls, 1);
    }
}
