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

use crate::lock::LockService;

/// Context handed by the external scheduler to a runner for one tick.
///
/// The scheduler never double-dispatches a job whose previous tick is
/// unfinished; cluster-wide exclusivity is nevertheless enforced through
/// the lock service, not assumed.
#[derive(Clone)]
pub struct JobExecutionContext {
    pub job_id: String,
    pub lock_service: Arc<dyn LockService>,
}

impl JobExecutionContext {
    pub fn new(job_id: impl Into<String>, lock_service: Arc<dyn LockService>) -> Self {
        Self {
            job_id: job_id.into(),
            lock_service,
        }
    }
}
