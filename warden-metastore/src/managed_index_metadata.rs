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

use serde::{Deserialize, Serialize};

/// The job-metadata document of a managed index: the source of truth for
/// *where we are* in the policy state machine.
///
/// The document is rewritten twice per advancing tick: once with the step
/// marked [`StepStatus::Starting`] before the side effect runs, and once
/// with the executed outcome. Observing `Starting` at the beginning of a
/// tick therefore means the previous tick died between the two writes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedIndexMetadata {
    pub index_name: String,
    pub index_uuid: String,
    pub policy_id: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_seq_no: Option<u64>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_primary_term: Option<u64>,
    #[serde(default)]
    pub policy_completed: bool,
    #[serde(default)]
    pub rolled_over: bool,
    #[serde(default)]
    pub was_read_only: bool,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_to: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StateMetadata>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionMetadata>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepMetadata>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_retry_info: Option<PolicyRetryInfo>,
    /// Operator-facing details, at minimum a `message` entry.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<serde_json::Value>,
}

impl ManagedIndexMetadata {
    pub fn new(
        index_name: impl Into<String>,
        index_uuid: impl Into<String>,
        policy_id: impl Into<String>,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            index_uuid: index_uuid.into(),
            policy_id: policy_id.into(),
            ..Default::default()
        }
    }

    pub fn info_message(message: impl Into<String>) -> serde_json::Value {
        serde_json::json!({ "message": message.into() })
    }

    /// The job is failed when its policy retry budget is blown or the
    /// current action has exhausted its own retries.
    pub fn is_failed(&self) -> bool {
        if let Some(policy_retry_info) = &self.policy_retry_info {
            if policy_retry_info.failed {
                return true;
            }
        }
        self.action
            .as_ref()
            .map(|action_metadata| action_metadata.failed)
            .unwrap_or(false)
    }

    /// True when the tick just completed a delete action: the index is
    /// gone and no further metadata write must be issued against it.
    pub fn is_successful_delete(&self) -> bool {
        let deleting = self
            .action
            .as_ref()
            .map(|action_metadata| action_metadata.name == "delete")
            .unwrap_or(false);
        let step_completed = self
            .step
            .as_ref()
            .map(|step_metadata| step_metadata.status == StepStatus::Completed)
            .unwrap_or(false);
        deleting && step_completed
    }

    /// True when the previous tick failed to persist its step completion.
    pub fn is_step_starting(&self) -> bool {
        self.step
            .as_ref()
            .map(|step_metadata| step_metadata.status == StepStatus::Starting)
            .unwrap_or(false)
    }

    /// An action boundary is a safe point to swap policies: nothing has
    /// started yet, or the last step of the current action completed.
    pub fn is_at_action_boundary(&self) -> bool {
        match &self.step {
            None => true,
            Some(step_metadata) => step_metadata.status == StepStatus::Completed,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub name: String,
    pub start_time_ms: i64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActionMetadata {
    pub name: String,
    pub start_time_ms: i64,
    /// Position of the action in the state's declared order.
    pub index: usize,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub consumed_retries: u32,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_retry_time_ms: Option<i64>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StepMetadata {
    pub name: String,
    pub start_time_ms: i64,
    pub status: StepStatus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Starting,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PolicyRetryInfo {
    pub failed: bool,
    pub consumed_retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_metadata() -> ManagedIndexMetadata {
        ManagedIndexMetadata {
            index_name: "nginx-logs-000003".to_string(),
            index_uuid: "aCzpX0QvTEGmD9HAfIKu1A".to_string(),
            policy_id: "hot-warm-delete".to_string(),
            policy_seq_no: Some(7),
            policy_primary_term: Some(2),
            policy_completed: false,
            rolled_over: true,
            was_read_only: false,
            transition_to: Some("warm".to_string()),
            state: Some(StateMetadata {
                name: "hot".to_string(),
                start_time_ms: 1_650_000_000_000,
            }),
            action: Some(ActionMetadata {
                name: "rollover".to_string(),
                start_time_ms: 1_650_000_060_000,
                index: 0,
                failed: false,
                consumed_retries: 1,
                last_retry_time_ms: Some(1_650_000_120_000),
            }),
            step: Some(StepMetadata {
                name: "attempt_rollover".to_string(),
                start_time_ms: 1_650_000_060_000,
                status: StepStatus::Completed,
            }),
            policy_retry_info: Some(PolicyRetryInfo {
                failed: false,
                consumed_retries: 0,
            }),
            info: Some(ManagedIndexMetadata::info_message(
                "Successfully rolled over index",
            )),
        }
    }

    #[test]
    fn test_managed_index_metadata_roundtrip_preserves_all_fields() {
        let metadata = populated_metadata();
        let metadata_json = serde_json::to_string(&metadata).unwrap();
        let deserialized: ManagedIndexMetadata = serde_json::from_str(&metadata_json).unwrap();
        assert_eq!(deserialized, metadata);
    }

    #[test]
    fn test_managed_index_metadata_roundtrip_of_sparse_document() {
        let metadata =
            ManagedIndexMetadata::new("nginx-logs", "aCzpX0QvTEGmD9HAfIKu1A", "hot-warm-delete");
        let metadata_json = serde_json::to_string(&metadata).unwrap();
        // Optional fields are entirely absent from the serialized form.
        assert!(!metadata_json.contains("transition_to"));
        assert!(!metadata_json.contains("policy_seq_no"));
        let deserialized: ManagedIndexMetadata = serde_json::from_str(&metadata_json).unwrap();
        assert_eq!(deserialized, metadata);
    }

    #[test]
    fn test_step_status_serialization_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&StepStatus::Starting).unwrap(),
            r#""starting""#
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::Completed).unwrap(),
            r#""completed""#
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::Failed).unwrap(),
            r#""failed""#
        );
    }

    #[test]
    fn test_is_failed() {
        let mut metadata = populated_metadata();
        assert!(!metadata.is_failed());
        metadata.policy_retry_info = Some(PolicyRetryInfo {
            failed: true,
            consumed_retries: 0,
        });
        assert!(metadata.is_failed());

        let mut metadata = populated_metadata();
        metadata.action.as_mut().unwrap().failed = true;
        assert!(metadata.is_failed());
    }

    #[test]
    fn test_is_successful_delete() {
        let mut metadata = populated_metadata();
        assert!(!metadata.is_successful_delete());
        metadata.action.as_mut().unwrap().name = "delete".to_string();
        assert!(metadata.is_successful_delete());
        metadata.step.as_mut().unwrap().status = StepStatus::Failed;
        assert!(!metadata.is_successful_delete());
    }

    #[test]
    fn test_is_step_starting() {
        let mut metadata = populated_metadata();
        assert!(!metadata.is_step_starting());
        metadata.step.as_mut().unwrap().status = StepStatus::Starting;
        assert!(metadata.is_step_starting());
        metadata.step = None;
        assert!(!metadata.is_step_starting());
    }
}
