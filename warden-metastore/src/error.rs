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

use std::io;

use thiserror::Error;
use warden_common::retry::IsRetryable;

/// Metastore error kinds.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum MetastoreError {
    #[error("Document `{doc_id}` does not exist.")]
    DocumentDoesNotExist { doc_id: String },

    #[error("Index `{index_id}` does not exist.")]
    IndexDoesNotExist { index_id: String },

    /// A compare-and-set write lost the race: the stored document moved
    /// past the `(seq_no, primary_term)` the caller read.
    #[error("Version conflict on document `{doc_id}`.")]
    VersionConflict { doc_id: String },

    /// The cluster leader currently refuses state updates. Transient: the
    /// next tick retries from the last durable state.
    #[error("Cluster blocked: `{message}`.")]
    ClusterBlocked { message: String },

    #[error("Failed to deserialize document: `{cause}`")]
    InvalidDocument { cause: serde_json::Error },

    /// Any generic internal error.
    /// The message can be helpful to users, but the detail of the error
    /// are judged uncoverable and not useful for error handling.
    #[error("Internal error: `{message}` Cause: `{cause}`.")]
    InternalError {
        message: String,
        cause: anyhow::Error,
    },

    #[error("IOError `{0}`")]
    Io(#[from] io::Error),
}

impl MetastoreError {
    /// True for failures worth replaying with the same input; semantic
    /// failures (missing document, parse error, lost CAS race) are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetastoreError::ClusterBlocked { .. }
                | MetastoreError::InternalError { .. }
                | MetastoreError::Io(_)
        )
    }
}

impl IsRetryable for MetastoreError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Generic Result type for metastore operations.
pub type MetastoreResult<T> = Result<T, MetastoreError>;
