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

pub mod lock;
pub mod retry;
pub mod scheduler;

use chrono::Utc;

/// Returns the current UTC time as epoch milliseconds.
///
/// All persisted timestamps in the job documents use this representation.
pub fn utc_now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Installs a tracing subscriber writing to the test output capture.
/// Repeated calls, including from concurrently running tests, are no-ops.
pub fn setup_logging_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
