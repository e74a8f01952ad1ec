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

use crate::MetastoreResult;

/// Index setting binding a managed index to its policy. The runner
/// self-heals this setting whenever it diverges from the job config.
pub const POLICY_ID_SETTING: &str = "index.warden.policy_id";

/// Entry of an index in the cluster-state snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexInfo {
    pub index_name: String,
    pub index_uuid: String,
    /// Value of [`POLICY_ID_SETTING`], when set.
    pub policy_id: Option<String>,
    pub rollover_alias: Option<String>,
    pub creation_date_ms: i64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IndexStats {
    pub doc_count: u64,
    pub size_in_bytes: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RolloverOutcome {
    pub old_index: String,
    pub new_index: String,
}

/// Narrow view over the cluster consumed by the lifecycle steps and the
/// runners: a read-only state snapshot plus the index-level operations the
/// action catalog needs.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait ClusterService: Send + Sync + 'static {
    /// Reads the index entry from the current cluster-state snapshot.
    /// `None` means the index does not exist (anymore).
    fn index(&self, index_name: &str) -> Option<IndexInfo>;

    async fn update_index_setting(
        &self,
        index_name: &str,
        setting_key: &str,
        setting_value: &str,
    ) -> MetastoreResult<()>;

    async fn index_stats(&self, index_name: &str) -> MetastoreResult<IndexStats>;

    async fn open_index(&self, index_name: &str) -> MetastoreResult<()>;

    async fn close_index(&self, index_name: &str) -> MetastoreResult<()>;

    async fn set_index_read_only(
        &self,
        index_name: &str,
        read_only: bool,
    ) -> MetastoreResult<()>;

    async fn rollover(&self, rollover_alias: &str) -> MetastoreResult<RolloverOutcome>;

    async fn delete_index(&self, index_name: &str) -> MetastoreResult<()>;
}
