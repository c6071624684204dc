// Copyright 2025 JiangLong.
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

use crate::domain::config::EngineConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Applies `key=value` overrides (CLI `-D` properties or mapped environment
/// variables) on top of an existing configuration. Unknown keys and values
/// that fail to parse are reported and leave the current value in place.
pub fn apply_overrides(configs: &HashMap<String, String>, config: &mut EngineConfig) {
    for (key, value) in configs {
        let value = value.trim();
        match key.as_str() {
            "prober-workers" => set_parsed(key, value, &mut config.prober_workers),
            "workers-limit" => set_parsed(key, value, &mut config.workers_limit),
            "spawn-limit" => set_parsed(key, value, &mut config.spawn_limit),
            "command-timeout" => set_parsed(key, value, &mut config.command_timeout_secs),
            "cluster-timeout" => set_parsed(key, value, &mut config.cluster_timeout_secs),
            "kubectl-retries" => set_parsed(key, value, &mut config.kubectl_retries),
            "ping-count" => set_parsed(key, value, &mut config.ping_count),
            "work-dir" => config.work_dir = PathBuf::from(value),
            "kubectl" => config.kubectl_binary = value.to_string(),
            _ => warn!(key = %key, "ignoring unknown configuration property"),
        }
    }
}

fn set_parsed<T: FromStr>(key: &str, value: &str, target: &mut T) {
    match value.parse::<T>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(key = %key, value = %value, "ignoring unparseable configuration value"),
    }
}

/// Parse dynamic configuration properties from -D key=value format
pub fn parse_properties(properties: &[String]) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();

    for property in properties {
        let Some((key, value)) = property.split_once('=') else {
            return Err(format!(
                "Invalid config format: '{}'. Expected 'key=value'",
                property
            ));
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Empty key in config: '{}'", property));
        }

        map.insert(key.to_string(), value.trim().to_string());
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overrides() {
        let mut config = EngineConfig::default();
        let mut overrides = HashMap::new();
        overrides.insert("workers-limit".to_string(), " 4 ".to_string());
        overrides.insert("ping-count".to_string(), "x".to_string());
        overrides.insert("kubectl".to_string(), "/usr/local/bin/kubectl".to_string());
        overrides.insert("bogus".to_string(), "1".to_string());

        apply_overrides(&overrides, &mut config);
        assert_eq!(config.workers_limit, 4);
        assert_eq!(config.ping_count, EngineConfig::default().ping_count);
        assert_eq!(config.kubectl_binary, "/usr/local/bin/kubectl");
    }

    #[test]
    fn test_parse_properties() {
        let parsed =
            parse_properties(&["spawn-limit=2".to_string(), "work-dir=/a=b".to_string()]).unwrap();
        assert_eq!(parsed.get("spawn-limit").unwrap(), "2");
        assert_eq!(parsed.get("work-dir").unwrap(), "/a=b");

        assert!(parse_properties(&["novalue".to_string()]).is_err());
        assert!(parse_properties(&["=1".to_string()]).is_err());
    }
}
