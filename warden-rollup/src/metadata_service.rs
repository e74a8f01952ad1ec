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

use std::sync::Arc;

use warden_common::retry::{with_backoff, BackoffPolicy};
use warden_common::utc_now_millis;
use warden_metastore::{
    Metastore, MetastoreError, RollupJob, RollupMetadata, RollupStats, RollupStatus,
};

/// Result of a rollup metadata mutation.
///
/// The three values are load-bearing: `NoMetadata` tells the runner to
/// skip the tick, `Failure` tells it the system cannot even record
/// progress and the tick must abort.
#[derive(Debug)]
pub enum MetadataUpdate {
    Success(RollupMetadata),
    NoMetadata,
    Failure {
        reason: String,
        cause: anyhow::Error,
    },
}

/// Initializes and updates the rollup metadata documents.
///
/// `set_failed` is the only path to [`RollupStatus::Failed`]; it must
/// succeed for the runner to consider a job safely terminated.
pub struct RollupMetadataService {
    metastore: Arc<dyn Metastore>,
    backoff_policy: BackoffPolicy,
}

impl RollupMetadataService {
    pub fn new(metastore: Arc<dyn Metastore>) -> Self {
        Self::with_backoff_policy(metastore, BackoffPolicy::default())
    }

    pub fn with_backoff_policy(
        metastore: Arc<dyn Metastore>,
        backoff_policy: BackoffPolicy,
    ) -> Self {
        Self {
            metastore,
            backoff_policy,
        }
    }

    /// The metadata document id is derived from the job id so that a tick
    /// replayed after a crash recreates the same document instead of
    /// leaking a new one.
    pub fn metadata_id_for(job: &RollupJob) -> String {
        format!("{}-metadata", job.job_id)
    }

    /// Loads the job's metadata, or creates a fresh `Init` document when
    /// the job has never run.
    pub async fn init(&self, job: &RollupJob) -> MetadataUpdate {
        if let Some(metadata_id) = &job.metadata_id {
            let load_result = with_backoff(&self.backoff_policy, || {
                self.metastore.rollup_metadata(metadata_id)
            })
            .await;
            return match load_result {
                Ok(Some(metadata)) => MetadataUpdate::Success(metadata),
                // The pointer is dangling: skip the tick rather than
                // fabricating progress over an unknown past.
                Ok(None) => MetadataUpdate::NoMetadata,
                Err(load_error) => MetadataUpdate::Failure {
                    reason: format!("Failed to load rollup metadata `{metadata_id}`."),
                    cause: anyhow::Error::from(load_error),
                },
            };
        }
        let fresh_metadata = RollupMetadata {
            metadata_id: Self::metadata_id_for(job),
            rollup_id: job.job_id.clone(),
            status: RollupStatus::Init,
            after_key: None,
            stats: RollupStats::default(),
            failure_reason: None,
            last_updated_time_ms: utc_now_millis(),
            stamp: None,
        };
        self.create(fresh_metadata).await
    }

    async fn create(&self, metadata: RollupMetadata) -> MetadataUpdate {
        let put_result = with_backoff(&self.backoff_policy, || {
            self.metastore.put_rollup_metadata(&metadata)
        })
        .await;
        match put_result {
            Ok(stored_metadata) => MetadataUpdate::Success(stored_metadata),
            // A replayed creation finds the document from the crashed
            // tick: adopt it.
            Err(MetastoreError::VersionConflict { .. }) => {
                match self.metastore.rollup_metadata(&metadata.metadata_id).await {
                    Ok(Some(existing_metadata)) => MetadataUpdate::Success(existing_metadata),
                    Ok(None) => MetadataUpdate::NoMetadata,
                    Err(load_error) => MetadataUpdate::Failure {
                        reason: format!(
                            "Failed to reload rollup metadata `{}` after a conflicting creation.",
                            metadata.metadata_id
                        ),
                        cause: anyhow::Error::from(load_error),
                    },
                }
            }
            Err(put_error) => MetadataUpdate::Failure {
                reason: format!(
                    "Failed to create rollup metadata `{}`.",
                    metadata.metadata_id
                ),
                cause: anyhow::Error::from(put_error),
            },
        }
    }

    /// CAS update of the metadata document.
    pub async fn update(&self, metadata: &RollupMetadata) -> MetadataUpdate {
        let put_result = with_backoff(&self.backoff_policy, || {
            self.metastore.put_rollup_metadata(metadata)
        })
        .await;
        match put_result {
            Ok(stored_metadata) => MetadataUpdate::Success(stored_metadata),
            Err(put_error) => MetadataUpdate::Failure {
                reason: format!(
                    "Failed to update rollup metadata `{}`.",
                    metadata.metadata_id
                ),
                cause: anyhow::Error::from(put_error),
            },
        }
    }

    /// Records a failure on the job. Jobs already stopped or finished keep
    /// their status and only gain the failure reason.
    pub async fn set_failed(
        &self,
        metadata: &RollupMetadata,
        failure_reason: impl Into<String>,
    ) -> MetadataUpdate {
        let mut failed_metadata = metadata.clone();
        if failed_metadata.stamp.is_none() {
            // The job failed before its metadata was loaded this tick: the
            // failure must land on the stored document when one exists.
            match self
                .metastore
                .rollup_metadata(&failed_metadata.metadata_id)
                .await
            {
                Ok(Some(existing_metadata)) => failed_metadata = existing_metadata,
                Ok(None) => {}
                Err(load_error) => {
                    return MetadataUpdate::Failure {
                        reason: format!(
                            "Failed to load rollup metadata `{}` while recording a failure.",
                            failed_metadata.metadata_id
                        ),
                        cause: anyhow::Error::from(load_error),
                    };
                }
            }
        }
        if !matches!(
            failed_metadata.status,
            RollupStatus::Stopped | RollupStatus::Finished
        ) {
            failed_metadata.status = RollupStatus::Failed;
        }
        failed_metadata.failure_reason = Some(failure_reason.into());
        failed_metadata.last_updated_time_ms = utc_now_millis();
        if failed_metadata.stamp.is_none() {
            return self.create(failed_metadata).await;
        }
        self.update(&failed_metadata).await
    }
}
