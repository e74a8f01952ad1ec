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

use async_trait::async_trait;
use warden_metastore::{ClusterService, IndexInfo, ManagedIndexMetadata, StepStatus};

/// Collaborators a step may touch while executing its side effect.
pub struct StepContext {
    pub cluster: Arc<dyn ClusterService>,
    pub index: IndexInfo,
    /// Metadata as persisted with the step marked starting. Steps read it
    /// for idempotency hints (e.g. an index already rolled over).
    pub metadata: ManagedIndexMetadata,
}

/// Outcome recorded by a step while executing.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub message: String,
}

impl StepOutcome {
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Completed,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            message: message.into(),
        }
    }
}

/// The smallest executable unit of an action.
///
/// `execute` performs the side effect and records the outcome on the step
/// itself; it must not panic and does not return an error.
/// `update_metadata` is a pure projection of the recorded outcome onto the
/// job metadata, applied after the side effect ran (or was skipped).
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&mut self, ctx: &StepContext);

    fn update_metadata(&self, current: &ManagedIndexMetadata) -> ManagedIndexMetadata;

    /// Outcome recorded by `execute`, if it ran.
    fn outcome(&self) -> Option<&StepOutcome>;
}

/// Shared projection: stamps the recorded outcome status and message onto
/// the step and info fields, leaving everything else untouched.
pub(crate) fn apply_outcome(
    current: &ManagedIndexMetadata,
    outcome: Option<&StepOutcome>,
) -> ManagedIndexMetadata {
    let mut updated = current.clone();
    match outcome {
        Some(outcome) => {
            if let Some(step_metadata) = updated.step.as_mut() {
                step_metadata.status = outcome.status;
            }
            updated.info = Some(ManagedIndexMetadata::info_message(&outcome.message));
        }
        // The step never ran: keep the starting status so the recovery
        // rule of the next tick kicks in.
        None => {}
    }
    updated
}
