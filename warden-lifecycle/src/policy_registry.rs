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
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use warden_common::retry::{with_backoff, BackoffPolicy};
use warden_metastore::{DocStamp, Metastore, MetastoreResult, StampedPolicy};

/// Resolves policy ids to their typed definitions, threading through the
/// store identifiers each policy was read at.
///
/// Transient store failures are retried; a missing policy and an invalid
/// one both resolve to `None`, which callers record as a load failure on
/// the job.
pub struct PolicyRegistry {
    metastore: Arc<dyn Metastore>,
    backoff_policy: BackoffPolicy,
    seen_stamps: Mutex<HashMap<String, DocStamp>>,
}

impl PolicyRegistry {
    pub fn new(metastore: Arc<dyn Metastore>) -> Self {
        Self::with_backoff_policy(metastore, BackoffPolicy::default())
    }

    pub fn with_backoff_policy(metastore: Arc<dyn Metastore>, backoff_policy: BackoffPolicy) -> Self {
        Self {
            metastore,
            backoff_policy,
            seen_stamps: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, policy_id: &str) -> MetastoreResult<Option<StampedPolicy>> {
        let resolved =
            with_backoff(&self.backoff_policy, || self.metastore.policy(policy_id)).await?;
        let Some(stamped_policy) = resolved else {
            return Ok(None);
        };
        if let Err(validation_error) = stamped_policy.policy.validate() {
            warn!(policy_id = %policy_id, error = %validation_error, "Ignoring invalid policy.");
            return Ok(None);
        }
        let mut seen_stamps = self.seen_stamps.lock().unwrap();
        if let Some(previous_stamp) =
            seen_stamps.insert(policy_id.to_string(), stamped_policy.stamp)
        {
            if previous_stamp != stamped_policy.stamp {
                debug!(
                    policy_id = %policy_id,
                    previous_seq_no = previous_stamp.seq_no,
                    seq_no = stamped_policy.stamp.seq_no,
                    "Policy moved since last resolution."
                );
            }
        }
        drop(seen_stamps);
        Ok(Some(stamped_policy))
    }

    /// Identifiers the registry last resolved this policy at.
    pub fn last_seen_stamp(&self, policy_id: &str) -> Option<DocStamp> {
        self.seen_stamps.lock().unwrap().get(policy_id).copied()
    }
}
