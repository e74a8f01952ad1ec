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

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::utc_now_millis;

/// A cluster-wide, TTL-bounded mutual-exclusion token for one job.
///
/// At most one live lease exists per job across the whole cluster. The
/// holder is expected to complete its tick well within the TTL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lease {
    pub job_id: String,
    pub lease_id: u64,
    pub expiration_time_ms: i64,
}

impl Lease {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expiration_time_ms
    }
}

/// Per-job lease acquisition and release.
///
/// Both operations may perform blocking I/O and must be called from a task
/// context. A failed `acquire` is not an error: it signals that another
/// node holds the lease and the caller should skip its tick.
#[cfg_attr(any(test, feature = "testsuite"), mockall::automock)]
#[async_trait]
pub trait LockService: Send + Sync + 'static {
    async fn acquire(&self, job_id: &str, ttl: Duration) -> Option<Lease>;

    /// Returns false if the lease had already expired and been reclaimed.
    async fn release(&self, lease: Lease) -> bool;
}

/// Process-local [`LockService`] with real TTL semantics.
///
/// Suitable for single-node deployments and for exercising lease
/// contention in tests. An expired lease is reclaimable by any caller.
#[derive(Default)]
pub struct LocalLockService {
    leases: Mutex<HashMap<String, Lease>>,
    next_lease_id: AtomicU64,
}

impl LocalLockService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockService for LocalLockService {
    async fn acquire(&self, job_id: &str, ttl: Duration) -> Option<Lease> {
        let now_ms = utc_now_millis();
        let mut leases = self.leases.lock().await;
        if let Some(existing_lease) = leases.get(job_id) {
            if !existing_lease.is_expired(now_ms) {
                debug!(job_id = %job_id, "Lease is held, skipping acquisition.");
                return None;
            }
        }
        let lease = Lease {
            job_id: job_id.to_string(),
            lease_id: self.next_lease_id.fetch_add(1, Ordering::Relaxed),
            expiration_time_ms: now_ms + ttl.as_millis() as i64,
        };
        leases.insert(job_id.to_string(), lease.clone());
        Some(lease)
    }

    async fn release(&self, lease: Lease) -> bool {
        let mut leases = self.leases.lock().await;
        match leases.get(&lease.job_id) {
            Some(current_lease) if current_lease.lease_id == lease.lease_id => {
                leases.remove(&lease.job_id);
                true
            }
            _ => false,
        }
    }
}
