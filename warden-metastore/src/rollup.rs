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
use warden_config::{JobSchedule, RollupSpec};

use crate::metastore::DocStamp;

/// The job-config document of a rollup job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollupJob {
    pub job_id: String,
    pub enabled: bool,
    pub schedule: JobSchedule,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_enabled_time_ms: Option<i64>,
    /// Pointer to the [`RollupMetadata`] document, set on first run.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_id: Option<String>,
    pub spec: RollupSpec,
    #[serde(skip)]
    pub stamp: Option<DocStamp>,
}

impl RollupJob {
    pub fn new(job_id: impl Into<String>, schedule: JobSchedule, spec: RollupSpec) -> Self {
        Self {
            job_id: job_id.into(),
            enabled: true,
            schedule,
            job_enabled_time_ms: Some(warden_common::utc_now_millis()),
            metadata_id: None,
            spec,
            stamp: None,
        }
    }

    pub fn with_disabled(mut self) -> Self {
        self.enabled = false;
        self.job_enabled_time_ms = None;
        self
    }
}

/// The job-metadata document of a rollup job: status, paging cursor, and
/// cumulative stats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollupMetadata {
    pub metadata_id: String,
    pub rollup_id: String,
    pub status: RollupStatus,
    /// Composite paging cursor: where the next search page starts. `None`
    /// together with a non-continuous job means the source is exhausted.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_key: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub stats: RollupStats,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub last_updated_time_ms: i64,
    #[serde(skip)]
    pub stamp: Option<DocStamp>,
}

impl RollupMetadata {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RollupStatus::Stopped | RollupStatus::Finished | RollupStatus::Failed
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupStatus {
    Init,
    Started,
    Stopped,
    Finished,
    Failed,
    Retry,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RollupStats {
    pub pages_processed: u64,
    pub documents_processed: u64,
    pub rollups_indexed: u64,
    pub search_time_in_millis: u64,
    pub index_time_in_millis: u64,
}

impl RollupStats {
    pub fn merge(&mut self, other: &RollupStats) {
        self.pages_processed += other.pages_processed;
        self.documents_processed += other.documents_processed;
        self.rollups_indexed += other.rollups_indexed;
        self.search_time_in_millis += other.search_time_in_millis;
        self.index_time_in_millis += other.index_time_in_millis;
    }
}

#[cfg(test)]
mod tests {
    use warden_config::{DateHistogramParams, Dimension};

    use super::*;

    fn rollup_spec() -> RollupSpec {
        RollupSpec {
            source_index: "nginx-logs".to_string(),
            target_index: "nginx-logs-rollup".to_string(),
            page_size: 500,
            continuous: true,
            dimensions: vec![Dimension::DateHistogram(DateHistogramParams {
                source_field: "timestamp".to_string(),
                fixed_interval: "1 hour".to_string(),
            })],
            metrics: Vec::new(),
        }
    }

    #[test]
    fn test_rollup_job_roundtrip() {
        let mut job = RollupJob::new("rollup-nginx", JobSchedule::hourly(), rollup_spec());
        job.metadata_id = Some("rollup-nginx-metadata".to_string());
        let job_json = serde_json::to_string(&job).unwrap();
        let deserialized: RollupJob = serde_json::from_str(&job_json).unwrap();
        assert_eq!(deserialized.job_id, job.job_id);
        assert_eq!(deserialized.metadata_id, job.metadata_id);
        assert_eq!(deserialized.spec, job.spec);
        assert!(deserialized.enabled);
    }

    #[test]
    fn test_rollup_metadata_roundtrip_preserves_after_key() {
        let mut after_key = serde_json::Map::new();
        after_key.insert(
            "timestamp".to_string(),
            serde_json::json!(1_650_000_000_000i64),
        );
        after_key.insert("status".to_string(), serde_json::json!("200"));
        let metadata = RollupMetadata {
            metadata_id: "rollup-nginx-metadata".to_string(),
            rollup_id: "rollup-nginx".to_string(),
            status: RollupStatus::Started,
            after_key: Some(after_key),
            stats: RollupStats {
                pages_processed: 4,
                documents_processed: 1_800,
                rollups_indexed: 120,
                search_time_in_millis: 310,
                index_time_in_millis: 95,
            },
            failure_reason: None,
            last_updated_time_ms: 1_650_000_000_000,
            stamp: Some(DocStamp {
                seq_no: 9,
                primary_term: 1,
            }),
        };
        let metadata_json = serde_json::to_string(&metadata).unwrap();
        let deserialized: RollupMetadata = serde_json::from_str(&metadata_json).unwrap();
        assert_eq!(deserialized.after_key, metadata.after_key);
        assert_eq!(deserialized.stats, metadata.stats);
        assert_eq!(deserialized.status, RollupStatus::Started);
        // The stamp is owned by the store, not by the document body.
        assert_eq!(deserialized.stamp, None);
    }

    #[test]
    fn test_rollup_status_terminal_states() {
        let mut metadata = RollupMetadata {
            metadata_id: "m".to_string(),
            rollup_id: "r".to_string(),
            status: RollupStatus::Init,
            after_key: None,
            stats: RollupStats::default(),
            failure_reason: None,
            last_updated_time_ms: 0,
            stamp: None,
        };
        for (status, terminal) in [
            (RollupStatus::Init, false),
            (RollupStatus::Started, false),
            (RollupStatus::Retry, false),
            (RollupStatus::Stopped, true),
            (RollupStatus::Finished, true),
            (RollupStatus::Failed, true),
        ] {
            metadata.status = status;
            assert_eq!(metadata.is_terminal(), terminal);
        }
    }

    #[test]
    fn test_rollup_stats_merge() {
        let mut stats = RollupStats {
            pages_processed: 1,
            documents_processed: 100,
            rollups_indexed: 10,
            search_time_in_millis: 50,
            index_time_in_millis: 20,
        };
        stats.merge(&RollupStats {
            pages_processed: 2,
            documents_processed: 300,
            rollups_indexed: 30,
            search_time_in_millis: 150,
            index_time_in_millis: 60,
        });
        assert_eq!(stats.pages_processed, 3);
        assert_eq!(stats.documents_processed, 400);
        assert_eq!(stats.rollups_indexed, 40);
        assert_eq!(stats.search_time_in_millis, 200);
        assert_eq!(stats.index_time_in_millis, 80);
    }
}
