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
use serde::{Deserialize, Serialize};

/// Tunables of a settings dispatch.
///
/// On the wire the deadline is given in milliseconds:
/// `{ "max_workers": 4, "deadline_ms": 120000 }`. Both fields are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound of worker threads. Never raises the pool above hardware parallelism.
    pub max_workers: Option<usize>,

    /// Overall time budget of one dispatch; unlimited when unset.
    #[serde(rename = "deadline_ms", with = "millis")]
    pub deadline: Option<Duration>,
}

impl DispatchConfig {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }
}

mod millis {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_reads_deadline_in_milliseconds() {
        let config: DispatchConfig = serde_json::from_str(r#"{ "max_workers": 4, "deadline_ms": 1500 }"#).unwrap();
        assert_eq!(config, DispatchConfig::default().with_max_workers(4).with_deadline(Duration::from_millis(1500)));
    }

    #[test]
    fn missing_fields_mean_unbounded() {
        let config: DispatchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_workers, None);
        assert_eq!(config.deadline, None);
    }

    #[test]
    fn config_writes_back_what_it_reads() {
        let config = DispatchConfig::default().with_deadline(Duration::from_secs(2));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"max_workers":null,"deadline_ms":2000}"#);
    }
}
