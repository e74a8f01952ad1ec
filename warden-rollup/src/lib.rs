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

//! Per-tick execution engine for rollup jobs.
//!
//! A rollup job reads its source index through paged composite
//! aggregations and writes summary documents to its target index. Progress
//! is the composite `after_key` cursor persisted in the rollup metadata
//! document after every page, which makes the loop resumable and the
//! indexing at-least-once.

mod metadata_service;
mod runner;
mod services;

pub use metadata_service::{MetadataUpdate, RollupMetadataService};
pub use runner::RollupRunner;
pub use services::{IndexedPage, RollupIndexer, RollupMapper, RollupPage, RollupSearchService};
#[cfg(any(test, feature = "testsuite"))]
pub use services::{MockRollupIndexer, MockRollupMapper, MockRollupSearchService};
