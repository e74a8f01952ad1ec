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

//! Typed access to the dedicated management index holding the job
//! documents, and to the cluster-state entries of the managed indexes.
//!
//! Every document carries `(seq_no, primary_term)` identifiers; all writes
//! are compare-and-set on those identifiers so that a tick interrupted at
//! any suspension point leaves the store in a state the next tick can
//! recover from.

mod cluster;
mod error;
mod managed_index_config;
mod managed_index_metadata;
mod metastore;
mod ram_metastore;
mod rollup;

pub use cluster::{ClusterService, IndexInfo, IndexStats, RolloverOutcome, POLICY_ID_SETTING};
#[cfg(any(test, feature = "testsuite"))]
pub use cluster::MockClusterService;
pub use error::{MetastoreError, MetastoreResult};
pub use managed_index_config::{ChangePolicy, ManagedIndexConfig};
pub use managed_index_metadata::{
    ActionMetadata, ManagedIndexMetadata, PolicyRetryInfo, StateMetadata, StepMetadata, StepStatus,
};
pub use metastore::{DocStamp, Metastore, StampedPolicy};
#[cfg(any(test, feature = "testsuite"))]
pub use metastore::MockMetastore;
pub use ram_metastore::RamMetastore;
pub use rollup::{RollupJob, RollupMetadata, RollupStats, RollupStatus};
