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

//! Per-tick execution engine for managed indexes.
//!
//! Each managed index progresses through a user-defined state machine of
//! states -> actions -> steps. One tick advances at most one step: the
//! metadata document is persisted with the step marked starting, the step's
//! side effect runs, and the executed outcome is persisted. Every write is
//! compare-and-set so a tick cancelled at any suspension point leaves a
//! state the next tick recovers from.

mod actions;
mod executor;
mod policy_registry;
mod runner;
mod step;

pub use actions::{resolve_action_at, Action, TRANSITION_ACTION_NAME};
pub use executor::{
    completed_metadata, resolve_execution, should_backoff, starting_metadata, Execution,
};
pub use policy_registry::PolicyRegistry;
pub use runner::ManagedIndexRunner;
pub use step::{Step, StepContext, StepOutcome};
