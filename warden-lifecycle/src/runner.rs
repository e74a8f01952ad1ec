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
use std::time::Duration;

use tracing::{debug, error, info, warn};
use warden_common::retry::{with_backoff, BackoffPolicy};
use warden_common::scheduler::JobExecutionContext;
use warden_common::utc_now_millis;
use warden_metastore::{
    ClusterService, IndexInfo, ManagedIndexConfig, ManagedIndexMetadata, Metastore,
    PolicyRetryInfo, StampedPolicy, StateMetadata, POLICY_ID_SETTING,
};

use crate::executor::{completed_metadata, resolve_execution, should_backoff, starting_metadata};
use crate::policy_registry::PolicyRegistry;
use crate::step::StepContext;

/// Implicit tick budget: the runner is expected to complete well within it.
const LEASE_TTL: Duration = Duration::from_secs(300);

/// Per-tick orchestrator for managed-index jobs.
///
/// One value is constructed at process start with its collaborators and
/// handed to the scheduler registration; collaborators are immutable after
/// construction. The runner never panics the host: failures are logged or
/// recorded on the job metadata for the read API to surface.
pub struct ManagedIndexRunner {
    metastore: Arc<dyn Metastore>,
    cluster: Arc<dyn ClusterService>,
    policy_registry: PolicyRegistry,
    backoff_policy: BackoffPolicy,
}

impl ManagedIndexRunner {
    pub fn new(metastore: Arc<dyn Metastore>, cluster: Arc<dyn ClusterService>) -> Self {
        Self::with_backoff_policy(metastore, cluster, BackoffPolicy::default())
    }

    pub fn with_backoff_policy(
        metastore: Arc<dyn Metastore>,
        cluster: Arc<dyn ClusterService>,
        backoff_policy: BackoffPolicy,
    ) -> Self {
        let policy_registry =
            PolicyRegistry::with_backoff_policy(metastore.clone(), backoff_policy);
        Self {
            metastore,
            cluster,
            policy_registry,
            backoff_policy,
        }
    }

    /// Entry point invoked by the external scheduler, once per tick.
    pub async fn run_job(&self, job: &ManagedIndexConfig, ctx: &JobExecutionContext) {
        let Some(index_info) = self.cluster.index(&job.index_name) else {
            info!(index = %job.index_name, "Index not found in cluster state, nothing to do.");
            return;
        };
        if index_info.index_uuid != job.index_uuid {
            info!(
                index = %job.index_name,
                "Index was recreated under the same name, skipping tick."
            );
            return;
        }
        let Some(lease) = ctx.lock_service.acquire(&job.job_id, LEASE_TTL).await else {
            debug!(job_id = %job.job_id, "Job lease is held elsewhere, skipping tick.");
            return;
        };
        self.run_tick(job, &index_info).await;
        if !ctx.lock_service.release(lease).await {
            warn!(job_id = %job.job_id, "Job lease expired before release.");
        }
    }

    async fn run_tick(&self, job: &ManagedIndexConfig, index_info: &IndexInfo) {
        let mut job = job.clone();
        let metadata = match self
            .metastore
            .managed_index_metadata(&job.index_uuid)
            .await
        {
            Ok(metadata) => metadata,
            Err(error) => {
                error!(index = %job.index_name, error = %error, "Failed to read job metadata.");
                return;
            }
        };

        if job.policy.is_none() || metadata.is_none() {
            self.init_managed_index(&mut job, metadata).await;
            return;
        }
        let Some(metadata) = metadata else {
            return;
        };
        let Some(policy) = job.policy.clone() else {
            return;
        };

        // Self-heal the policy id setting; its outcome does not block
        // progress.
        if index_info.policy_id.as_deref() != Some(job.policy_id.as_str()) {
            if let Err(error) = self
                .cluster
                .update_index_setting(&job.index_name, POLICY_ID_SETTING, &job.policy_id)
                .await
            {
                warn!(
                    index = %job.index_name,
                    error = %error,
                    "Failed to self-heal the policy id setting."
                );
            }
        }

        if Self::should_change_policy(&job, &metadata) {
            self.init_change_policy(&mut job, &metadata).await;
            return;
        }

        if metadata.policy_completed || metadata.is_failed() {
            self.disable_managed_index_config(&mut job).await;
            return;
        }

        // The embedded policy must be the one the metadata was bound to:
        // a divergence means the policy was mutated underneath the job.
        if metadata.policy_seq_no != job.policy_seq_no
            || metadata.policy_primary_term != job.policy_primary_term
        {
            let mut failed_metadata = metadata.clone();
            failed_metadata.policy_retry_info = Some(PolicyRetryInfo {
                failed: true,
                consumed_retries: 0,
            });
            failed_metadata.info = Some(ManagedIndexMetadata::info_message(format!(
                "Fail to load policy: `{}`. The policy identifiers diverged from the job metadata.",
                job.policy_id
            )));
            self.put_metadata_with_retry(&failed_metadata).await;
            return;
        }

        self.advance(&job, &policy, metadata, index_info).await;
    }

    async fn advance(
        &self,
        job: &ManagedIndexConfig,
        policy: &warden_config::Policy,
        metadata: ManagedIndexMetadata,
        index_info: &IndexInfo,
    ) {
        let now_ms = utc_now_millis();
        let execution = match resolve_execution(policy, &metadata) {
            Ok(execution) => execution,
            Err(resolution_error) => {
                // No action resolved: the backoff gate is skipped on this
                // path and the job moves to its error state.
                let mut failed_metadata = metadata.clone();
                failed_metadata.policy_retry_info = Some(PolicyRetryInfo {
                    failed: true,
                    consumed_retries: 0,
                });
                failed_metadata.info =
                    Some(ManagedIndexMetadata::info_message(resolution_error));
                self.put_metadata_with_retry(&failed_metadata).await;
                return;
            }
        };

        if let Some(remaining_ms) = should_backoff(execution.action.as_ref(), &metadata, now_ms) {
            debug!(
                index = %job.index_name,
                remaining_ms = remaining_ms,
                "Backing off before the next action retry."
            );
            return;
        }

        if metadata.is_step_starting() {
            // The previous tick died between its starting and executed
            // writes: mark the job retryable instead of re-running the
            // side effect.
            let step_name = metadata
                .step
                .as_ref()
                .map(|step_metadata| step_metadata.name.clone())
                .unwrap_or_default();
            let mut recovery_metadata = metadata.clone();
            recovery_metadata.policy_retry_info = Some(PolicyRetryInfo {
                failed: true,
                consumed_retries: 0,
            });
            recovery_metadata.info = Some(ManagedIndexMetadata::info_message(format!(
                "Previous tick failed to persist the outcome of step `{step_name}`."
            )));
            self.put_metadata_with_retry(&recovery_metadata).await;
            return;
        }

        let starting = starting_metadata(&metadata, &execution, now_ms);
        if !self.put_metadata_with_retry(&starting).await {
            // The side effect must not run when its starting marker is not
            // durable.
            return;
        }

        let mut step = execution.step;
        let step_ctx = StepContext {
            cluster: self.cluster.clone(),
            index: index_info.clone(),
            metadata: starting.clone(),
        };
        step.execute(&step_ctx).await;

        let executed = completed_metadata(
            &starting,
            step.as_ref(),
            execution.action.retry_config(),
            utc_now_millis(),
        );
        if executed.is_successful_delete() {
            info!(
                index = %job.index_name,
                "Index deleted by its policy, terminating the metadata lineage."
            );
            return;
        }
        self.put_metadata_with_retry(&executed).await;
    }

    /// Initializes the job: embeds the resolved policy in the job config,
    /// then computes and writes the initial metadata.
    async fn init_managed_index(
        &self,
        job: &mut ManagedIndexConfig,
        existing_metadata: Option<ManagedIndexMetadata>,
    ) {
        let policy_id = job
            .change_policy
            .as_ref()
            .map(|change_policy| change_policy.policy_id.clone())
            .unwrap_or_else(|| job.policy_id.clone());
        let resolved_policy = match self.policy_registry.resolve(&policy_id).await {
            Ok(resolved_policy) => resolved_policy,
            Err(error) => {
                error!(
                    index = %job.index_name,
                    policy_id = %policy_id,
                    error = %error,
                    "Failed to resolve policy, aborting tick."
                );
                return;
            }
        };

        if let Some(stamped_policy) = &resolved_policy {
            job.policy_id = policy_id.clone();
            job.policy = Some(stamped_policy.policy.clone());
            job.policy_seq_no = Some(stamped_policy.stamp.seq_no);
            job.policy_primary_term = Some(stamped_policy.stamp.primary_term);
            job.change_policy = None;
            if !self.put_config_with_retry(job).await {
                // No metadata write without a durable config.
                return;
            }
        }

        let initial_metadata = Self::initial_metadata(
            job,
            existing_metadata,
            resolved_policy.as_ref(),
            &policy_id,
            utc_now_millis(),
        );
        self.put_metadata_with_retry(&initial_metadata).await;
    }

    /// Initial metadata, computed from the loaded policy and the metadata
    /// already stored, if any.
    fn initial_metadata(
        job: &ManagedIndexConfig,
        existing_metadata: Option<ManagedIndexMetadata>,
        resolved_policy: Option<&StampedPolicy>,
        policy_id: &str,
        now_ms: i64,
    ) -> ManagedIndexMetadata {
        match (existing_metadata, resolved_policy) {
            (None, Some(stamped_policy)) => {
                let mut metadata =
                    ManagedIndexMetadata::new(&job.index_name, &job.index_uuid, policy_id);
                metadata.policy_seq_no = Some(stamped_policy.stamp.seq_no);
                metadata.policy_primary_term = Some(stamped_policy.stamp.primary_term);
                metadata.state = Some(StateMetadata {
                    name: stamped_policy.policy.default_state.clone(),
                    start_time_ms: now_ms,
                });
                metadata.policy_retry_info = Some(PolicyRetryInfo {
                    failed: false,
                    consumed_retries: 0,
                });
                metadata.info = Some(ManagedIndexMetadata::info_message(format!(
                    "Successfully initialized policy: {policy_id}"
                )));
                metadata
            }
            (None, None) => {
                let mut metadata =
                    ManagedIndexMetadata::new(&job.index_name, &job.index_uuid, policy_id);
                metadata.policy_retry_info = Some(PolicyRetryInfo {
                    failed: true,
                    consumed_retries: 0,
                });
                metadata.info = Some(ManagedIndexMetadata::info_message(format!(
                    "Fail to load policy: {policy_id}"
                )));
                metadata
            }
            (Some(existing), None) => {
                let mut metadata = existing;
                metadata.policy_retry_info = Some(PolicyRetryInfo {
                    failed: true,
                    consumed_retries: 0,
                });
                metadata.info = Some(ManagedIndexMetadata::info_message(format!(
                    "Fail to load policy: {policy_id}"
                )));
                metadata
            }
            (Some(existing), Some(stamped_policy)) => {
                let first_bind =
                    existing.policy_seq_no.is_none() && existing.policy_primary_term.is_none();
                if first_bind {
                    let mut metadata = existing;
                    metadata.policy_id = policy_id.to_string();
                    metadata.policy_seq_no = Some(stamped_policy.stamp.seq_no);
                    metadata.policy_primary_term = Some(stamped_policy.stamp.primary_term);
                    if metadata.state.is_none() {
                        metadata.state = Some(StateMetadata {
                            name: stamped_policy.policy.default_state.clone(),
                            start_time_ms: now_ms,
                        });
                    }
                    metadata.policy_retry_info = Some(PolicyRetryInfo {
                        failed: false,
                        consumed_retries: 0,
                    });
                    metadata.info = Some(ManagedIndexMetadata::info_message(format!(
                        "Successfully initialized policy: {policy_id}"
                    )));
                    return metadata;
                }
                let bound_to_same_revision = existing.policy_seq_no
                    == Some(stamped_policy.stamp.seq_no)
                    && existing.policy_primary_term == Some(stamped_policy.stamp.primary_term);
                if bound_to_same_revision {
                    // Nothing to rebind, the state machine resumes as is.
                    return existing;
                }
                let mut metadata = existing;
                metadata.policy_retry_info = Some(PolicyRetryInfo {
                    failed: true,
                    consumed_retries: 0,
                });
                metadata.info = Some(ManagedIndexMetadata::info_message(format!(
                    "Fail to load policy: {policy_id} with seqNo {} primaryTerm {}",
                    stamped_policy.stamp.seq_no, stamped_policy.stamp.primary_term
                )));
                metadata
            }
        }
    }

    fn should_change_policy(job: &ManagedIndexConfig, metadata: &ManagedIndexMetadata) -> bool {
        job.change_policy.is_some() && metadata.is_at_action_boundary()
    }

    /// Swaps the job onto the pending change policy. Ordering is critical:
    /// the metadata document moves first, the config document only moves
    /// once the metadata write is acknowledged. A failure of the first
    /// write leaves the original config for a full retry on the next tick;
    /// a failure of the second is converged by the setting self-heal and
    /// the re-entered gate.
    async fn init_change_policy(
        &self,
        job: &mut ManagedIndexConfig,
        metadata: &ManagedIndexMetadata,
    ) {
        let Some(change_policy) = job.change_policy.clone() else {
            return;
        };
        let stamped_policy = match self.policy_registry.resolve(&change_policy.policy_id).await {
            Ok(Some(stamped_policy)) => stamped_policy,
            Ok(None) => {
                let mut failed_metadata = metadata.clone();
                failed_metadata.policy_retry_info = Some(PolicyRetryInfo {
                    failed: true,
                    consumed_retries: 0,
                });
                failed_metadata.info = Some(ManagedIndexMetadata::info_message(format!(
                    "Fail to load change policy: {}",
                    change_policy.policy_id
                )));
                self.put_metadata_with_retry(&failed_metadata).await;
                return;
            }
            Err(error) => {
                error!(
                    index = %job.index_name,
                    policy_id = %change_policy.policy_id,
                    error = %error,
                    "Failed to resolve change policy, aborting tick."
                );
                return;
            }
        };

        let mut new_metadata = metadata.clone();
        new_metadata.policy_id = change_policy.policy_id.clone();
        new_metadata.policy_seq_no = Some(stamped_policy.stamp.seq_no);
        new_metadata.policy_primary_term = Some(stamped_policy.stamp.primary_term);
        new_metadata.transition_to = change_policy.state.clone();
        new_metadata.action = None;
        new_metadata.step = None;
        new_metadata.policy_completed = false;
        new_metadata.policy_retry_info = None;
        new_metadata.info = Some(ManagedIndexMetadata::info_message(format!(
            "Attempting to change policy to {}",
            change_policy.policy_id
        )));
        if !self.put_metadata_with_retry(&new_metadata).await {
            return;
        }

        job.policy_id = change_policy.policy_id.clone();
        job.policy = Some(stamped_policy.policy.clone());
        job.policy_seq_no = Some(stamped_policy.stamp.seq_no);
        job.policy_primary_term = Some(stamped_policy.stamp.primary_term);
        job.change_policy = None;
        if !self.put_config_with_retry(job).await {
            warn!(
                index = %job.index_name,
                "Failed to persist the new policy on the job config, converging on a later tick."
            );
            return;
        }

        if let Err(error) = self
            .cluster
            .update_index_setting(&job.index_name, POLICY_ID_SETTING, &job.policy_id)
            .await
        {
            warn!(
                index = %job.index_name,
                error = %error,
                "Failed to update the policy id setting after the policy change."
            );
        }
    }

    async fn disable_managed_index_config(&self, job: &mut ManagedIndexConfig) {
        if !job.enabled {
            debug!(index = %job.index_name, "Job is already disabled.");
            return;
        }
        job.enabled = false;
        job.job_enabled_time_ms = None;
        if self.put_config_with_retry(job).await {
            info!(index = %job.index_name, "Disabled the managed index job.");
        }
    }

    async fn put_metadata_with_retry(&self, metadata: &ManagedIndexMetadata) -> bool {
        let put_result = with_backoff(&self.backoff_policy, || {
            self.metastore.put_managed_index_metadata(metadata)
        })
        .await;
        match put_result {
            Ok(()) => true,
            Err(error) => {
                error!(
                    index = %metadata.index_name,
                    error = %error,
                    "Failed to persist job metadata."
                );
                false
            }
        }
    }

    async fn put_config_with_retry(&self, job: &mut ManagedIndexConfig) -> bool {
        let job_snapshot = job.clone();
        let put_result = with_backoff(&self.backoff_policy, || {
            self.metastore.put_managed_index_config(&job_snapshot)
        })
        .await;
        match put_result {
            Ok(stamp) => {
                job.stamp = Some(stamp);
                true
            }
            Err(error) => {
                error!(
                    index = %job.index_name,
                    error = %error,
                    "Failed to persist job config."
                );
                false
            }
        }
    }
}
