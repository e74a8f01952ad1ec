// Copyright (C) 2022 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::time::Duration;

use anyhow::Context;
use humantime::parse_duration;
use serde::{Deserialize, Serialize};

/// One action declared inside a policy state.
///
/// The action type is a typed envelope so that new parameter sets can be
/// added without touching the documents already stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub retry: ActionRetryConfig,
    #[serde(flatten)]
    pub action_type: ActionType,
}

impl ActionConfig {
    pub fn kind(&self) -> &'static str {
        self.action_type.kind()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", content = "params")]
pub enum ActionType {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "close")]
    Close,
    #[serde(rename = "read_only")]
    ReadOnly,
    #[serde(rename = "read_write")]
    ReadWrite,
    #[serde(rename = "rollover")]
    Rollover(RolloverParams),
    #[serde(rename = "delete")]
    Delete,
}

impl ActionType {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionType::Open => "open",
            ActionType::Close => "close",
            ActionType::ReadOnly => "read_only",
            ActionType::ReadWrite => "read_write",
            ActionType::Rollover(_) => "rollover",
            ActionType::Delete => "delete",
        }
    }
}

/// Rollover fires as soon as one of the declared conditions holds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloverParams {
    /// Minimum age of the index, expressed in a human-friendly way
    /// (`7 days`, `1 hour`, ...).
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_index_age: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<u64>,
}

impl RolloverParams {
    pub fn min_index_age(&self) -> anyhow::Result<Option<Duration>> {
        self.min_index_age
            .as_deref()
            .map(|min_index_age| {
                parse_duration(min_index_age).with_context(|| {
                    format!("Failed to parse rollover min index age `{min_index_age}`.")
                })
            })
            .transpose()
    }
}

/// Bounded retry settings shared by every action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRetryConfig {
    #[serde(default = "ActionRetryConfig::default_count")]
    pub count: u32,
    /// Base delay between attempts, doubled on each consumed retry,
    /// expressed in a human-friendly way (`250ms`, `1 minute`, ...).
    #[serde(default = "ActionRetryConfig::default_delay")]
    pub delay: String,
}

impl ActionRetryConfig {
    fn default_count() -> u32 {
        3
    }

    fn default_delay() -> String {
        "250ms".to_string()
    }

    pub fn delay(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.delay)
            .with_context(|| format!("Failed to parse action retry delay `{}`.", self.delay))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.delay()?;
        Ok(())
    }
}

impl Default for ActionRetryConfig {
    fn default() -> Self {
        Self {
            count: Self::default_count(),
            delay: Self::default_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_config_roundtrip() {
        let action_config = ActionConfig {
            retry: ActionRetryConfig::default(),
            action_type: ActionType::Rollover(RolloverParams {
                min_index_age: Some("7 days".to_string()),
                min_doc_count: Some(5_000_000),
            }),
        };
        let action_json = serde_json::to_string(&action_config).unwrap();
        let deserialized: ActionConfig = serde_json::from_str(&action_json).unwrap();
        assert_eq!(deserialized, action_config);
        assert_eq!(deserialized.kind(), "rollover");
    }

    #[test]
    fn test_action_config_deserializes_with_default_retry() {
        let action_json = r#"{"action_type": "read_only"}"#;
        let action_config: ActionConfig = serde_json::from_str(action_json).unwrap();
        assert_eq!(action_config.action_type, ActionType::ReadOnly);
        assert_eq!(action_config.retry.count, 3);
        assert_eq!(
            action_config.retry.delay().unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_rollover_params_age_parsing() {
        let rollover_params = RolloverParams {
            min_index_age: Some("1 hour".to_string()),
            min_doc_count: None,
        };
        assert_eq!(
            rollover_params.min_index_age().unwrap(),
            Some(Duration::from_secs(3600))
        );

        let malformed_params = RolloverParams {
            min_index_age: Some("one eon".to_string()),
            min_doc_count: None,
        };
        assert!(malformed_params.min_index_age().is_err());
    }

    #[test]
    fn test_action_retry_config_rejects_malformed_delay() {
        let retry_config = ActionRetryConfig {
            count: 1,
            delay: "later".to_string(),
        };
        assert!(retry_config.validate().is_err());
    }
}
