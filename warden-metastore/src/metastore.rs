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

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_config::Policy;

use crate::{
    ManagedIndexConfig, ManagedIndexMetadata, MetastoreResult, RollupJob, RollupMetadata,
};

/// Store identifiers of one document revision, used for compare-and-set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DocStamp {
    pub seq_no: u64,
    pub primary_term: u64,
}

/// A policy together with the revision it was read at. The revision is
/// threaded through the job documents so that a policy mutated underneath
/// a running job is detected instead of silently re-bound.
#[derive(Clone, Debug, PartialEq)]
pub struct StampedPolicy {
    pub policy: Policy,
    pub stamp: DocStamp,
}

/// Client for the dedicated management index holding the job documents.
///
/// All writes are idempotent when replayed with the same input, and all
/// updates are compare-and-set on the document [`DocStamp`]. Losing a CAS
/// race surfaces as [`MetastoreError::VersionConflict`] and is never
/// retried blindly: the caller re-reads on its next tick.
///
/// [`MetastoreError::VersionConflict`]: crate::MetastoreError::VersionConflict
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait Metastore: Send + Sync + 'static {
    /// Returns `None` on a missing policy or an empty policy source.
    async fn policy(&self, policy_id: &str) -> MetastoreResult<Option<StampedPolicy>>;

    async fn managed_index_metadata(
        &self,
        index_uuid: &str,
    ) -> MetastoreResult<Option<ManagedIndexMetadata>>;

    /// Creates or CAS-updates the job-config document and returns the new
    /// revision.
    async fn put_managed_index_config(
        &self,
        config: &ManagedIndexConfig,
    ) -> MetastoreResult<DocStamp>;

    /// Writes the job-metadata document through a cluster-state update,
    /// atomic on the cluster leader. May fail with
    /// [`MetastoreError::ClusterBlocked`], which callers treat as
    /// transient.
    ///
    /// [`MetastoreError::ClusterBlocked`]: crate::MetastoreError::ClusterBlocked
    async fn put_managed_index_metadata(
        &self,
        metadata: &ManagedIndexMetadata,
    ) -> MetastoreResult<()>;

    async fn rollup_metadata(
        &self,
        metadata_id: &str,
    ) -> MetastoreResult<Option<RollupMetadata>>;

    /// Creates or CAS-updates the rollup-metadata document and returns the
    /// stored revision of it.
    async fn put_rollup_metadata(
        &self,
        metadata: &RollupMetadata,
    ) -> MetastoreResult<RollupMetadata>;

    /// Creates or CAS-updates the rollup job-config document and returns
    /// the stored revision of it.
    async fn put_rollup_job(&self, job: &RollupJob) -> MetastoreResult<RollupJob>;
}
