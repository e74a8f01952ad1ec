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

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_config::Policy;

use crate::{
    DocStamp, ManagedIndexConfig, ManagedIndexMetadata, Metastore, MetastoreError,
    MetastoreResult, RollupJob, RollupMetadata, StampedPolicy,
};

/// In-memory [`Metastore`] implementation enforcing the same
/// compare-and-set discipline as the document store.
///
/// Backs single-process deployments and the runner integration tests.
#[derive(Default)]
pub struct RamMetastore {
    state: RwLock<RamState>,
}

#[derive(Default)]
struct RamState {
    next_seq_no: u64,
    policies: HashMap<String, StampedPolicy>,
    managed_index_configs: HashMap<String, (ManagedIndexConfig, DocStamp)>,
    managed_index_metadata: HashMap<String, ManagedIndexMetadata>,
    rollup_jobs: HashMap<String, (RollupJob, DocStamp)>,
    rollup_metadata: HashMap<String, (RollupMetadata, DocStamp)>,
}

impl RamState {
    fn next_stamp(&mut self) -> DocStamp {
        self.next_seq_no += 1;
        DocStamp {
            seq_no: self.next_seq_no,
            primary_term: 1,
        }
    }

    /// CAS check: a stamped write must match the stored revision, an
    /// unstamped write must be a creation.
    fn check_stamp(
        doc_id: &str,
        stored_stamp: Option<DocStamp>,
        written_stamp: Option<DocStamp>,
    ) -> MetastoreResult<()> {
        if stored_stamp == written_stamp {
            return Ok(());
        }
        Err(MetastoreError::VersionConflict {
            doc_id: doc_id.to_string(),
        })
    }
}

impl RamMetastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces a policy document. The policy store is written by
    /// the administrative API, outside the controller core.
    pub async fn put_policy(&self, policy: Policy) -> DocStamp {
        let mut state = self.state.write().await;
        let stamp = state.next_stamp();
        state.policies.insert(
            policy.policy_id.clone(),
            StampedPolicy { policy, stamp },
        );
        stamp
    }

    pub async fn managed_index_config(
        &self,
        job_id: &str,
    ) -> Option<ManagedIndexConfig> {
        let state = self.state.read().await;
        state
            .managed_index_configs
            .get(job_id)
            .map(|(config, stamp)| {
                let mut config = config.clone();
                config.stamp = Some(*stamp);
                config
            })
    }

    pub async fn rollup_job(&self, job_id: &str) -> Option<RollupJob> {
        let state = self.state.read().await;
        state.rollup_jobs.get(job_id).map(|(job, stamp)| {
            let mut job = job.clone();
            job.stamp = Some(*stamp);
            job
        })
    }
}

#[async_trait]
impl Metastore for RamMetastore {
    async fn policy(&self, policy_id: &str) -> MetastoreResult<Option<StampedPolicy>> {
        let state = self.state.read().await;
        Ok(state.policies.get(policy_id).cloned())
    }

    async fn managed_index_metadata(
        &self,
        index_uuid: &str,
    ) -> MetastoreResult<Option<ManagedIndexMetadata>> {
        let state = self.state.read().await;
        Ok(state.managed_index_metadata.get(index_uuid).cloned())
    }

    async fn put_managed_index_config(
        &self,
        config: &ManagedIndexConfig,
    ) -> MetastoreResult<DocStamp> {
        let mut state = self.state.write().await;
        let stored_stamp = state
            .managed_index_configs
            .get(&config.job_id)
            .map(|(_, stamp)| *stamp);
        RamState::check_stamp(&config.job_id, stored_stamp, config.stamp)?;
        let stamp = state.next_stamp();
        state
            .managed_index_configs
            .insert(config.job_id.clone(), (config.clone(), stamp));
        Ok(stamp)
    }

    async fn put_managed_index_metadata(
        &self,
        metadata: &ManagedIndexMetadata,
    ) -> MetastoreResult<()> {
        let mut state = self.state.write().await;
        state
            .managed_index_metadata
            .insert(metadata.index_uuid.clone(), metadata.clone());
        Ok(())
    }

    async fn rollup_metadata(
        &self,
        metadata_id: &str,
    ) -> MetastoreResult<Option<RollupMetadata>> {
        let state = self.state.read().await;
        Ok(state
            .rollup_metadata
            .get(metadata_id)
            .map(|(metadata, stamp)| {
                let mut metadata = metadata.clone();
                metadata.stamp = Some(*stamp);
                metadata
            }))
    }

    async fn put_rollup_metadata(
        &self,
        metadata: &RollupMetadata,
    ) -> MetastoreResult<RollupMetadata> {
        let mut state = self.state.write().await;
        let stored_stamp = state
            .rollup_metadata
            .get(&metadata.metadata_id)
            .map(|(_, stamp)| *stamp);
        RamState::check_stamp(&metadata.metadata_id, stored_stamp, metadata.stamp)?;
        let stamp = state.next_stamp();
        state
            .rollup_metadata
            .insert(metadata.metadata_id.clone(), (metadata.clone(), stamp));
        let mut stored_metadata = metadata.clone();
        stored_metadata.stamp = Some(stamp);
        Ok(stored_metadata)
    }

    async fn put_rollup_job(&self, job: &RollupJob) -> MetastoreResult<RollupJob> {
        let mut state = self.state.write().await;
        let stored_stamp = state.rollup_jobs.get(&job.job_id).map(|(_, stamp)| *stamp);
        RamState::check_stamp(&job.job_id, stored_stamp, job.stamp)?;
        let stamp = state.next_stamp();
        state
            .rollup_jobs
            .insert(job.job_id.clone(), (job.clone(), stamp));
        let mut stored_job = job.clone();
        stored_job.stamp = Some(stamp);
        Ok(stored_job)
    }
}

#[cfg(test)]
mod tests {
    use warden_config::{JobSchedule, State};

    use super::*;

    fn one_state_policy(policy_id: &str) -> Policy {
        Policy {
            policy_id: policy_id.to_string(),
            description: None,
            default_state: "hot".to_string(),
            states: vec![State {
                name: "hot".to_string(),
                actions: Vec::new(),
                transitions: Vec::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_ram_metastore_policy_revisions_increase() {
        let metastore = RamMetastore::new();
        let first_stamp = metastore.put_policy(one_state_policy("p1")).await;
        let second_stamp = metastore.put_policy(one_state_policy("p1")).await;
        assert!(second_stamp.seq_no > first_stamp.seq_no);
        let stamped_policy = metastore.policy("p1").await.unwrap().unwrap();
        assert_eq!(stamped_policy.stamp, second_stamp);
        assert!(metastore.policy("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ram_metastore_managed_index_config_cas() {
        let metastore = RamMetastore::new();
        let config = ManagedIndexConfig::new(
            "nginx-logs",
            "aCzpX0QvTEGmD9HAfIKu1A",
            "p1",
            JobSchedule::hourly(),
        );
        let stamp = metastore.put_managed_index_config(&config).await.unwrap();

        // A second unstamped write is a conflicting creation.
        let conflict = metastore.put_managed_index_config(&config).await;
        assert!(matches!(
            conflict,
            Err(MetastoreError::VersionConflict { .. })
        ));

        // A stamped write at the stored revision succeeds.
        let mut updated_config = metastore
            .managed_index_config(&config.job_id)
            .await
            .unwrap();
        assert_eq!(updated_config.stamp, Some(stamp));
        updated_config.enabled = false;
        metastore
            .put_managed_index_config(&updated_config)
            .await
            .unwrap();

        // The stale stamp now loses the race.
        let stale_write = metastore.put_managed_index_config(&updated_config).await;
        assert!(matches!(
            stale_write,
            Err(MetastoreError::VersionConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_ram_metastore_managed_index_metadata_upsert() {
        let metastore = RamMetastore::new();
        let mut metadata =
            ManagedIndexMetadata::new("nginx-logs", "aCzpX0QvTEGmD9HAfIKu1A", "p1");
        metastore
            .put_managed_index_metadata(&metadata)
            .await
            .unwrap();
        metadata.policy_completed = true;
        metastore
            .put_managed_index_metadata(&metadata)
            .await
            .unwrap();
        let stored_metadata = metastore
            .managed_index_metadata("aCzpX0QvTEGmD9HAfIKu1A")
            .await
            .unwrap()
            .unwrap();
        assert!(stored_metadata.policy_completed);
    }

    #[tokio::test]
    async fn test_ram_metastore_rollup_metadata_cas_roundtrip() {
        let metastore = RamMetastore::new();
        let metadata = RollupMetadata {
            metadata_id: "rollup-nginx-metadata".to_string(),
            rollup_id: "rollup-nginx".to_string(),
            status: crate::RollupStatus::Init,
            after_key: None,
            stats: Default::default(),
            failure_reason: None,
            last_updated_time_ms: 0,
            stamp: None,
        };
        let stored_metadata = metastore.put_rollup_metadata(&metadata).await.unwrap();
        assert!(stored_metadata.stamp.is_some());
        let reloaded_metadata = metastore
            .rollup_metadata("rollup-nginx-metadata")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded_metadata.stamp, stored_metadata.stamp);
        // Replaying the unstamped creation conflicts.
        assert!(matches!(
            metastore.put_rollup_metadata(&metadata).await,
            Err(MetastoreError::VersionConflict { .. })
        ));
    }
}
