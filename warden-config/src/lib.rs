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

mod action_config;
mod policy;
mod rollup_config;
mod schedule;

pub use action_config::{
    ActionConfig, ActionRetryConfig, ActionType, RolloverParams,
};
pub use policy::{Policy, State, Transition, TransitionConditions};
pub use rollup_config::{
    DateHistogramParams, Dimension, HistogramParams, Metric, MetricsSpec, RollupSpec, TermsParams,
};
pub use schedule::JobSchedule;
