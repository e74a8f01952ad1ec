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
use warden_metastore::{RollupJob, RollupMetadata};

/// One page of composite buckets, already folded into summary documents.
#[derive(Clone, Debug)]
pub struct RollupPage {
    pub summary_docs: Vec<serde_json::Value>,
    /// Cursor of the next page; `None` when the source is exhausted.
    pub after_key: Option<serde_json::Map<String, serde_json::Value>>,
    /// Number of source documents folded into this page.
    pub documents_processed: u64,
    pub search_time_ms: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IndexedPage {
    pub documents_indexed: u64,
    pub index_time_ms: u64,
}

/// The composite-aggregation side of a rollup job. The aggregation
/// execution itself lives outside the controller core.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait RollupSearchService: Send + Sync + 'static {
    /// Decides from schedule, continuity and status whether the job has
    /// work to do this tick.
    fn should_process<'a>(&self, job: &RollupJob, metadata: Option<&'a RollupMetadata>) -> bool;

    /// Executes one composite search page starting after the given cursor.
    async fn composite_search<'a>(
        &self,
        job: &RollupJob,
        after_key: Option<&'a serde_json::Map<String, serde_json::Value>>,
    ) -> anyhow::Result<RollupPage>;
}

/// Validation and mapping management of the source and target indexes.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait RollupMapper: Send + Sync + 'static {
    async fn validate_source_index(&self, job: &RollupJob) -> anyhow::Result<()>;

    /// The target index must exist, be flagged as a rollup index, and
    /// contain this job's mapping.
    async fn validate_target_index(&self, job: &RollupJob) -> anyhow::Result<()>;

    async fn init_target_index(&self, job: &RollupJob) -> anyhow::Result<()>;
}

/// Writes summary documents to the target index. Replaying a page after a
/// crash is absorbed by the deterministic summary document ids.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait RollupIndexer: Send + Sync + 'static {
    async fn index_summary_docs(
        &self,
        job: &RollupJob,
        summary_docs: Vec<serde_json::Value>,
    ) -> anyhow::Result<IndexedPage>;
}
