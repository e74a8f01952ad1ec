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
use warden_config::{JobSchedule, Policy};

use crate::metastore::DocStamp;

/// The job-config document of a managed index: the source of truth for
/// *what* to do. Where we are is tracked separately in
/// [`ManagedIndexMetadata`](crate::ManagedIndexMetadata).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManagedIndexConfig {
    pub job_id: String,
    pub index_name: String,
    pub index_uuid: String,
    pub policy_id: String,
    pub schedule: JobSchedule,
    pub enabled: bool,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_enabled_time_ms: Option<i64>,
    /// Snapshot of the policy taken when the job was initialized, together
    /// with the store identifiers it was read at. A divergence between
    /// these identifiers and the ones recorded in the job metadata means
    /// the policy was mutated underneath the job.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_seq_no: Option<u64>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_primary_term: Option<u64>,
    /// Pending request to swap the job onto another policy at the next
    /// safe boundary.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_policy: Option<ChangePolicy>,
    /// Store identifiers of this document, used for compare-and-set
    /// writes. Absent on a document that has never been persisted.
    #[serde(skip)]
    pub stamp: Option<DocStamp>,
}

impl ManagedIndexConfig {
    pub fn new(
        index_name: impl Into<String>,
        index_uuid: impl Into<String>,
        policy_id: impl Into<String>,
        schedule: JobSchedule,
    ) -> Self {
        let index_uuid = index_uuid.into();
        Self {
            job_id: index_uuid.clone(),
            index_name: index_name.into(),
            index_uuid,
            policy_id: policy_id.into(),
            schedule,
            enabled: true,
            job_enabled_time_ms: Some(warden_common::utc_now_millis()),
            policy: None,
            policy_seq_no: None,
            policy_primary_term: None,
            change_policy: None,
            stamp: None,
        }
    }

    pub fn with_disabled(mut self) -> Self {
        self.enabled = false;
        self.job_enabled_time_ms = None;
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChangePolicy {
    pub policy_id: String,
    /// State to resume from under the new policy. Defaults to the new
    /// policy's default state when unset.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_index_config_roundtrip() {
        let mut config = ManagedIndexConfig::new(
            "nginx-logs",
            "aCzpX0QvTEGmD9HAfIKu1A",
            "hot-warm-delete",
            JobSchedule::hourly(),
        );
        config.change_policy = Some(ChangePolicy {
            policy_id: "archive-only".to_string(),
            state: Some("warm".to_string()),
        });
        config.stamp = Some(DocStamp {
            seq_no: 12,
            primary_term: 3,
        });

        let config_json = serde_json::to_string(&config).unwrap();
        let deserialized: ManagedIndexConfig = serde_json::from_str(&config_json).unwrap();
        // The stamp is owned by the store, not by the document body.
        assert_eq!(deserialized.stamp, None);
        assert_eq!(deserialized.job_id, config.job_id);
        assert_eq!(deserialized.change_policy, config.change_policy);
        assert_eq!(deserialized.policy_id, "hot-warm-delete");
        assert!(deserialized.enabled);
    }

    #[test]
    fn test_managed_index_config_disable() {
        let config = ManagedIndexConfig::new(
            "nginx-logs",
            "aCzpX0QvTEGmD9HAfIKu1A",
            "hot-warm-delete",
            JobSchedule::hourly(),
        )
        .with_disabled();
        assert!(!config.enabled);
        assert_eq!(config.job_enabled_time_ms, None);
    }
}
