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

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, error, info, warn};
use warden_common::lock::Lease;
use warden_common::retry::{with_backoff, BackoffPolicy, IsRetryable};
use warden_common::scheduler::JobExecutionContext;
use warden_common::utc_now_millis;
use warden_metastore::{Metastore, RollupJob, RollupMetadata, RollupStats, RollupStatus};

use crate::metadata_service::{MetadataUpdate, RollupMetadataService};
use crate::services::{RollupIndexer, RollupMapper, RollupSearchService};

/// Implicit tick budget: the runner is expected to complete well within it.
const LEASE_TTL: Duration = Duration::from_secs(300);

/// Consecutive page failures tolerated before the job is marked failed.
const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

struct LeaseContended;

impl fmt::Display for LeaseContended {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("job lease is held elsewhere")
    }
}

impl IsRetryable for LeaseContended {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Per-tick orchestrator for rollup jobs.
///
/// One value is constructed at process start with its collaborators and
/// handed to the scheduler registration. Failures inside the page loop are
/// isolated and bounded; failures of the metadata subsystem abort the tick
/// because the system cannot even record them.
pub struct RollupRunner {
    metastore: Arc<dyn Metastore>,
    search: Arc<dyn RollupSearchService>,
    mapper: Arc<dyn RollupMapper>,
    indexer: Arc<dyn RollupIndexer>,
    metadata_service: RollupMetadataService,
    backoff_policy: BackoffPolicy,
}

impl RollupRunner {
    pub fn new(
        metastore: Arc<dyn Metastore>,
        search: Arc<dyn RollupSearchService>,
        mapper: Arc<dyn RollupMapper>,
        indexer: Arc<dyn RollupIndexer>,
    ) -> Self {
        Self::with_backoff_policy(metastore, search, mapper, indexer, BackoffPolicy::default())
    }

    pub fn with_backoff_policy(
        metastore: Arc<dyn Metastore>,
        search: Arc<dyn RollupSearchService>,
        mapper: Arc<dyn RollupMapper>,
        indexer: Arc<dyn RollupIndexer>,
        backoff_policy: BackoffPolicy,
    ) -> Self {
        let metadata_service =
            RollupMetadataService::with_backoff_policy(metastore.clone(), backoff_policy);
        Self {
            metastore,
            search,
            mapper,
            indexer,
            metadata_service,
            backoff_policy,
        }
    }

    /// Entry point invoked by the external scheduler, once per tick.
    pub async fn run_job(&self, job: &RollupJob, ctx: &JobExecutionContext) {
        let metadata = if let Some(metadata_id) = &job.metadata_id {
            match self.metastore.rollup_metadata(metadata_id).await {
                Ok(metadata) => metadata,
                Err(load_error) => {
                    // Never disable a job over a load failure.
                    error!(
                        rollup_id = %job.job_id,
                        error = %load_error,
                        "Failed to load rollup metadata, skipping tick."
                    );
                    return;
                }
            }
        } else {
            None
        };

        if !self.search.should_process(job, metadata.as_ref()) {
            debug!(rollup_id = %job.job_id, "Rollup job has no work to do, skipping tick.");
            return;
        }

        let Some(lease) = self.acquire_lease_with_retry(&job.job_id, ctx).await else {
            debug!(rollup_id = %job.job_id, "Job lease is held elsewhere, skipping tick.");
            return;
        };
        if let Err(tick_error) = self.run_rollup_job(job).await {
            error!(
                rollup_id = %job.job_id,
                error = %tick_error,
                "Rollup tick aborted on a metadata failure."
            );
        }
        if !ctx.lock_service.release(lease).await {
            warn!(rollup_id = %job.job_id, "Job lease expired before release.");
        }
    }

    async fn acquire_lease_with_retry(
        &self,
        job_id: &str,
        ctx: &JobExecutionContext,
    ) -> Option<Lease> {
        with_backoff(&self.backoff_policy, || async {
            ctx.lock_service
                .acquire(job_id, LEASE_TTL)
                .await
                .ok_or(LeaseContended)
        })
        .await
        .ok()
    }

    /// The whole guarded tick. An `Err` means the metadata subsystem
    /// failed and the tick stops without further writes.
    async fn run_rollup_job(&self, job: &RollupJob) -> anyhow::Result<()> {
        let mut job = job.clone();

        if let Err(validation_error) = self.mapper.validate_source_index(&job).await {
            return self
                .set_failed_and_disable(
                    &mut job,
                    None,
                    format!("Invalid source index: {validation_error}"),
                )
                .await;
        }
        if job.metadata_id.is_some() {
            if let Err(validation_error) = self.mapper.validate_target_index(&job).await {
                return self
                    .set_failed_and_disable(
                        &mut job,
                        None,
                        format!("Invalid target index: {validation_error}"),
                    )
                    .await;
            }
        }

        let mut metadata = match self.metadata_service.init(&job).await {
            MetadataUpdate::Success(metadata) => metadata,
            MetadataUpdate::NoMetadata => {
                debug!(rollup_id = %job.job_id, "No rollup metadata available, deferring.");
                return Ok(());
            }
            MetadataUpdate::Failure { reason, cause } => {
                return Err(cause.context(reason));
            }
        };

        if metadata.status == RollupStatus::Failed {
            self.disable_job(&mut job).await;
            return Ok(());
        }

        if job.metadata_id.is_none() {
            job.metadata_id = Some(metadata.metadata_id.clone());
            if !self.put_job_with_retry(&mut job).await {
                // The pointer is not durable: defer all processing, the
                // deterministic metadata id makes the next init idempotent.
                return Ok(());
            }
        }

        if let Err(mapping_error) = self.mapper.init_target_index(&job).await {
            return self
                .set_failed_and_disable(
                    &mut job,
                    Some(metadata),
                    format!("Failed to initialize the target index mapping: {mapping_error}"),
                )
                .await;
        }

        if matches!(metadata.status, RollupStatus::Init | RollupStatus::Retry) {
            metadata.status = RollupStatus::Started;
        }

        let mut num_consecutive_page_failures = 0u32;
        while self.search.should_process(&job, Some(&metadata)) {
            match self.execute_page(&job, &metadata).await {
                Ok((page_stats, after_key)) => {
                    num_consecutive_page_failures = 0;
                    metadata.after_key = after_key;
                    metadata.stats.merge(&page_stats);
                    metadata.status = if metadata.after_key.is_none() && !job.spec.continuous {
                        RollupStatus::Finished
                    } else {
                        RollupStatus::Started
                    };
                    metadata.last_updated_time_ms = utc_now_millis();
                    metadata = match self.metadata_service.update(&metadata).await {
                        MetadataUpdate::Success(metadata) => metadata,
                        MetadataUpdate::NoMetadata => return Ok(()),
                        MetadataUpdate::Failure { reason, cause } => {
                            return Err(cause.context(reason));
                        }
                    };
                    if metadata.after_key.is_none() {
                        break;
                    }
                }
                Err(page_error) => {
                    // At-least-once: the cursor did not move, the page is
                    // retried. Repeated failures are bounded.
                    num_consecutive_page_failures += 1;
                    warn!(
                        rollup_id = %job.job_id,
                        error = %page_error,
                        num_consecutive_page_failures = num_consecutive_page_failures,
                        "Rollup page failed, continuing."
                    );
                    if num_consecutive_page_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                        return self
                            .set_failed_and_disable(
                                &mut job,
                                Some(metadata),
                                format!(
                                    "{MAX_CONSECUTIVE_PAGE_FAILURES} consecutive page failures, \
                                     last: {page_error}"
                                ),
                            )
                            .await;
                    }
                }
            }
        }

        if !job.spec.continuous && metadata.is_terminal() {
            self.disable_job(&mut job).await;
        }
        Ok(())
    }

    async fn execute_page(
        &self,
        job: &RollupJob,
        metadata: &RollupMetadata,
    ) -> anyhow::Result<(RollupStats, Option<serde_json::Map<String, serde_json::Value>>)> {
        let page = self
            .search
            .composite_search(job, metadata.after_key.as_ref())
            .await
            .context("Composite search failed.")?;
        let indexed_page = self
            .indexer
            .index_summary_docs(job, page.summary_docs)
            .await
            .context("Indexing the summary documents failed.")?;
        let page_stats = RollupStats {
            pages_processed: 1,
            documents_processed: page.documents_processed,
            rollups_indexed: indexed_page.documents_indexed,
            search_time_in_millis: page.search_time_ms,
            index_time_in_millis: indexed_page.index_time_ms,
        };
        Ok((page_stats, page.after_key))
    }

    /// Records the failure on the metadata document, then disables the
    /// job. Only a failure of the recording itself escapes as an error.
    async fn set_failed_and_disable(
        &self,
        job: &mut RollupJob,
        metadata: Option<RollupMetadata>,
        failure_reason: String,
    ) -> anyhow::Result<()> {
        warn!(rollup_id = %job.job_id, reason = %failure_reason, "Failing rollup job.");
        let base_metadata = metadata.unwrap_or_else(|| RollupMetadata {
            metadata_id: RollupMetadataService::metadata_id_for(job),
            rollup_id: job.job_id.clone(),
            status: RollupStatus::Init,
            after_key: None,
            stats: RollupStats::default(),
            failure_reason: None,
            last_updated_time_ms: utc_now_millis(),
            stamp: None,
        });
        match self
            .metadata_service
            .set_failed(&base_metadata, failure_reason)
            .await
        {
            MetadataUpdate::Success(stored_metadata) => {
                job.metadata_id = Some(stored_metadata.metadata_id);
                self.disable_job(job).await;
                Ok(())
            }
            MetadataUpdate::NoMetadata => {
                warn!(rollup_id = %job.job_id, "No metadata to fail, leaving the job as is.");
                Ok(())
            }
            MetadataUpdate::Failure { reason, cause } => Err(cause.context(reason)),
        }
    }

    async fn disable_job(&self, job: &mut RollupJob) {
        if !job.enabled {
            debug!(rollup_id = %job.job_id, "Job is already disabled.");
            return;
        }
        job.enabled = false;
        job.job_enabled_time_ms = None;
        if self.put_job_with_retry(job).await {
            info!(rollup_id = %job.job_id, "Disabled the rollup job.");
        }
    }

    async fn put_job_with_retry(&self, job: &mut RollupJob) -> bool {
        let job_snapshot = job.clone();
        let put_result = with_backoff(&self.backoff_policy, || {
            self.metastore.put_rollup_job(&job_snapshot)
        })
        .await;
        match put_result {
            Ok(stored_job) => {
                *job = stored_job;
                true
            }
            Err(put_error) => {
                error!(
                    rollup_id = %job.job_id,
                    error = %put_error,
                    "Failed to persist the rollup job config."
                );
                false
            }
        }
    }
}
