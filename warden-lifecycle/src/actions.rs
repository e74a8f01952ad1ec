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

use async_trait::async_trait;
use warden_common::utc_now_millis;
use warden_config::{ActionRetryConfig, ActionType, RolloverParams, State, Transition};
use warden_metastore::{ManagedIndexMetadata, StepStatus};

use crate::step::{apply_outcome, Step, StepContext, StepOutcome};

/// Name under which the implicit transition evaluation is recorded in the
/// action metadata.
pub const TRANSITION_ACTION_NAME: &str = "transition";

/// Capability set shared by every action of the catalog.
///
/// An action is not inheritance-based: it exposes the retry settings the
/// runner needs for its backoff gate, a discriminator used in the
/// serialized action metadata, and the step to execute next.
pub trait Action: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Position in the state's declared order. The implicit transition
    /// action sits after the last declared action.
    fn position(&self) -> usize;

    fn retry_config(&self) -> &ActionRetryConfig;

    fn step_to_execute(&self, metadata: &ManagedIndexMetadata) -> Box<dyn Step>;

    /// Whether the persisted metadata says the action's work actually
    /// happened. A completed step of an unfulfilled action (a rollover
    /// whose conditions were not met yet, a transition still waiting) is
    /// re-entered on the next tick instead of advancing past it.
    fn is_fulfilled(&self, metadata: &ManagedIndexMetadata) -> bool {
        let _ = metadata;
        true
    }
}

/// Builds the action sitting at `position` in the state's declared order,
/// or `None` when the position is past the implicit transition action.
pub fn resolve_action_at(state: &State, position: usize) -> Option<Box<dyn Action>> {
    if let Some(action_config) = state.actions.get(position) {
        let action: Box<dyn Action> = match &action_config.action_type {
            ActionType::Open => Box::new(OpenAction {
                position,
                retry: action_config.retry.clone(),
            }),
            ActionType::Close => Box::new(CloseAction {
                position,
                retry: action_config.retry.clone(),
            }),
            ActionType::ReadOnly => Box::new(ReadOnlyAction {
                position,
                retry: action_config.retry.clone(),
            }),
            ActionType::ReadWrite => Box::new(ReadWriteAction {
                position,
                retry: action_config.retry.clone(),
            }),
            ActionType::Rollover(params) => Box::new(RolloverAction {
                position,
                retry: action_config.retry.clone(),
                params: params.clone(),
            }),
            ActionType::Delete => Box::new(DeleteAction {
                position,
                retry: action_config.retry.clone(),
            }),
        };
        return Some(action);
    }
    if position == state.actions.len() {
        return Some(Box::new(TransitionAction {
            position,
            retry: ActionRetryConfig::default(),
            transitions: state.transitions.clone(),
        }));
    }
    None
}

macro_rules! single_step_action {
    ($action:ident, $kind:literal, $step:ident) => {
        struct $action {
            position: usize,
            retry: ActionRetryConfig,
        }

        impl Action for $action {
            fn kind(&self) -> &'static str {
                $kind
            }

            fn position(&self) -> usize {
                self.position
            }

            fn retry_config(&self) -> &ActionRetryConfig {
                &self.retry
            }

            fn step_to_execute(&self, _metadata: &ManagedIndexMetadata) -> Box<dyn Step> {
                Box::new($step { outcome: None })
            }
        }
    };
}

single_step_action!(OpenAction, "open", AttemptOpenStep);
single_step_action!(CloseAction, "close", AttemptCloseStep);
single_step_action!(ReadOnlyAction, "read_only", AttemptSetReadOnlyStep);
single_step_action!(ReadWriteAction, "read_write", AttemptSetReadWriteStep);
single_step_action!(DeleteAction, "delete", AttemptDeleteStep);

struct RolloverAction {
    position: usize,
    retry: ActionRetryConfig,
    params: RolloverParams,
}

impl Action for RolloverAction {
    fn kind(&self) -> &'static str {
        "rollover"
    }

    fn position(&self) -> usize {
        self.position
    }

    fn retry_config(&self) -> &ActionRetryConfig {
        &self.retry
    }

    fn step_to_execute(&self, _metadata: &ManagedIndexMetadata) -> Box<dyn Step> {
        Box::new(AttemptRolloverStep {
            params: self.params.clone(),
            outcome: None,
            rolled_over: false,
        })
    }

    fn is_fulfilled(&self, metadata: &ManagedIndexMetadata) -> bool {
        metadata.rolled_over
    }
}

struct TransitionAction {
    position: usize,
    retry: ActionRetryConfig,
    transitions: Vec<Transition>,
}

impl Action for TransitionAction {
    fn kind(&self) -> &'static str {
        TRANSITION_ACTION_NAME
    }

    fn position(&self) -> usize {
        self.position
    }

    fn retry_config(&self) -> &ActionRetryConfig {
        &self.retry
    }

    fn step_to_execute(&self, _metadata: &ManagedIndexMetadata) -> Box<dyn Step> {
        Box::new(AttemptTransitionStep {
            transitions: self.transitions.clone(),
            outcome: None,
            target_state: None,
            policy_completed: false,
        })
    }

    fn is_fulfilled(&self, metadata: &ManagedIndexMetadata) -> bool {
        metadata.transition_to.is_some() || metadata.policy_completed
    }
}

struct AttemptOpenStep {
    outcome: Option<StepOutcome>,
}

#[async_trait]
impl Step for AttemptOpenStep {
    fn name(&self) -> &'static str {
        "attempt_open"
    }

    async fn execute(&mut self, ctx: &StepContext) {
        self.outcome = Some(match ctx.cluster.open_index(&ctx.index.index_name).await {
            Ok(()) => StepOutcome::completed(format!(
                "Successfully opened index `{}`.",
                ctx.index.index_name
            )),
            Err(error) => StepOutcome::failed(format!(
                "Failed to open index `{}`: {error}",
                ctx.index.index_name
            )),
        });
    }

    fn update_metadata(&self, current: &ManagedIndexMetadata) -> ManagedIndexMetadata {
        apply_outcome(current, self.outcome.as_ref())
    }

    fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }
}

struct AttemptCloseStep {
    outcome: Option<StepOutcome>,
}

#[async_trait]
impl Step for AttemptCloseStep {
    fn name(&self) -> &'static str {
        "attempt_close"
    }

    async fn execute(&mut self, ctx: &StepContext) {
        self.outcome = Some(match ctx.cluster.close_index(&ctx.index.index_name).await {
            Ok(()) => StepOutcome::completed(format!(
                "Successfully closed index `{}`.",
                ctx.index.index_name
            )),
            Err(error) => StepOutcome::failed(format!(
                "Failed to close index `{}`: {error}",
                ctx.index.index_name
            )),
        });
    }

    fn update_metadata(&self, current: &ManagedIndexMetadata) -> ManagedIndexMetadata {
        apply_outcome(current, self.outcome.as_ref())
    }

    fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }
}

struct AttemptSetReadOnlyStep {
    outcome: Option<StepOutcome>,
}

#[async_trait]
impl Step for AttemptSetReadOnlyStep {
    fn name(&self) -> &'static str {
        "attempt_set_read_only"
    }

    async fn execute(&mut self, ctx: &StepContext) {
        self.outcome = Some(
            match ctx
                .cluster
                .set_index_read_only(&ctx.index.index_name, true)
                .await
            {
                Ok(()) => StepOutcome::completed(format!(
                    "Successfully set index `{}` to read-only.",
                    ctx.index.index_name
                )),
                Err(error) => StepOutcome::failed(format!(
                    "Failed to set index `{}` to read-only: {error}",
                    ctx.index.index_name
                )),
            },
        );
    }

    fn update_metadata(&self, current: &ManagedIndexMetadata) -> ManagedIndexMetadata {
        let mut updated = apply_outcome(current, self.outcome.as_ref());
        if matches!(self.outcome.as_ref().map(|outcome| outcome.status), Some(StepStatus::Completed)) {
            updated.was_read_only = true;
        }
        updated
    }

    fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }
}

struct AttemptSetReadWriteStep {
    outcome: Option<StepOutcome>,
}

#[async_trait]
impl Step for AttemptSetReadWriteStep {
    fn name(&self) -> &'static str {
        "attempt_set_read_write"
    }

    async fn execute(&mut self, ctx: &StepContext) {
        self.outcome = Some(
            match ctx
                .cluster
                .set_index_read_only(&ctx.index.index_name, false)
                .await
            {
                Ok(()) => StepOutcome::completed(format!(
                    "Successfully set index `{}` to read-write.",
                    ctx.index.index_name
                )),
                Err(error) => StepOutcome::failed(format!(
                    "Failed to set index `{}` to read-write: {error}",
                    ctx.index.index_name
                )),
            },
        );
    }

    fn update_metadata(&self, current: &ManagedIndexMetadata) -> ManagedIndexMetadata {
        let mut updated = apply_outcome(current, self.outcome.as_ref());
        if matches!(self.outcome.as_ref().map(|outcome| outcome.status), Some(StepStatus::Completed)) {
            updated.was_read_only = false;
        }
        updated
    }

    fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }
}

struct AttemptDeleteStep {
    outcome: Option<StepOutcome>,
}

#[async_trait]
impl Step for AttemptDeleteStep {
    fn name(&self) -> &'static str {
        "attempt_delete"
    }

    async fn execute(&mut self, ctx: &StepContext) {
        self.outcome = Some(match ctx.cluster.delete_index(&ctx.index.index_name).await {
            Ok(()) => StepOutcome::completed(format!(
                "Successfully deleted index `{}`.",
                ctx.index.index_name
            )),
            Err(error) => StepOutcome::failed(format!(
                "Failed to delete index `{}`: {error}",
                ctx.index.index_name
            )),
        });
    }

    fn update_metadata(&self, current: &ManagedIndexMetadata) -> ManagedIndexMetadata {
        apply_outcome(current, self.outcome.as_ref())
    }

    fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }
}

struct AttemptRolloverStep {
    params: RolloverParams,
    outcome: Option<StepOutcome>,
    rolled_over: bool,
}

impl AttemptRolloverStep {
    /// Rollover fires as soon as one declared condition holds; with no
    /// condition declared it fires unconditionally.
    async fn conditions_met(&self, ctx: &StepContext) -> Result<bool, String> {
        let min_index_age = self
            .params
            .min_index_age()
            .map_err(|error| error.to_string())?;
        if min_index_age.is_none() && self.params.min_doc_count.is_none() {
            return Ok(true);
        }
        if let Some(min_index_age) = min_index_age {
            let index_age_ms = utc_now_millis() - ctx.index.creation_date_ms;
            if index_age_ms >= min_index_age.as_millis() as i64 {
                return Ok(true);
            }
        }
        if let Some(min_doc_count) = self.params.min_doc_count {
            let index_stats = ctx
                .cluster
                .index_stats(&ctx.index.index_name)
                .await
                .map_err(|error| error.to_string())?;
            if index_stats.doc_count >= min_doc_count {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl Step for AttemptRolloverStep {
    fn name(&self) -> &'static str {
        "attempt_rollover"
    }

    async fn execute(&mut self, ctx: &StepContext) {
        if ctx.metadata.rolled_over {
            self.rolled_over = true;
            self.outcome = Some(StepOutcome::completed(format!(
                "Index `{}` has already been rolled over.",
                ctx.index.index_name
            )));
            return;
        }
        let rollover_alias = match &ctx.index.rollover_alias {
            Some(rollover_alias) => rollover_alias.clone(),
            None => {
                self.outcome = Some(StepOutcome::failed(format!(
                    "Index `{}` has no rollover alias.",
                    ctx.index.index_name
                )));
                return;
            }
        };
        match self.conditions_met(ctx).await {
            Ok(false) => {
                self.outcome = Some(StepOutcome::completed(format!(
                    "Rollover conditions not yet met for index `{}`.",
                    ctx.index.index_name
                )));
            }
            Ok(true) => match ctx.cluster.rollover(&rollover_alias).await {
                Ok(rollover_outcome) => {
                    self.rolled_over = true;
                    self.outcome = Some(StepOutcome::completed(format!(
                        "Successfully rolled over index `{}` to `{}`.",
                        rollover_outcome.old_index, rollover_outcome.new_index
                    )));
                }
                Err(error) => {
                    self.outcome = Some(StepOutcome::failed(format!(
                        "Failed to roll over alias `{rollover_alias}`: {error}"
                    )));
                }
            },
            Err(error) => {
                self.outcome = Some(StepOutcome::failed(format!(
                    "Failed to evaluate rollover conditions for index `{}`: {error}",
                    ctx.index.index_name
                )));
            }
        }
    }

    fn update_metadata(&self, current: &ManagedIndexMetadata) -> ManagedIndexMetadata {
        let mut updated = apply_outcome(current, self.outcome.as_ref());
        if self.rolled_over {
            updated.rolled_over = true;
        }
        updated
    }

    fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }
}

struct AttemptTransitionStep {
    transitions: Vec<Transition>,
    outcome: Option<StepOutcome>,
    target_state: Option<String>,
    policy_completed: bool,
}

impl AttemptTransitionStep {
    /// All conditions declared on a transition must hold for it to fire;
    /// a transition with no conditions fires unconditionally.
    async fn transition_fires(
        transition: &Transition,
        ctx: &StepContext,
    ) -> Result<bool, String> {
        let Some(conditions) = &transition.conditions else {
            return Ok(true);
        };
        if let Some(min_index_age) = conditions
            .min_index_age()
            .map_err(|error| error.to_string())?
        {
            let index_age_ms = utc_now_millis() - ctx.index.creation_date_ms;
            if index_age_ms < min_index_age.as_millis() as i64 {
                return Ok(false);
            }
        }
        if let Some(min_doc_count) = conditions.min_doc_count {
            let index_stats = ctx
                .cluster
                .index_stats(&ctx.index.index_name)
                .await
                .map_err(|error| error.to_string())?;
            if index_stats.doc_count < min_doc_count {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl Step for AttemptTransitionStep {
    fn name(&self) -> &'static str {
        "attempt_transition"
    }

    async fn execute(&mut self, ctx: &StepContext) {
        if self.transitions.is_empty() {
            self.policy_completed = true;
            self.outcome = Some(StepOutcome::completed(format!(
                "Policy completed for index `{}`.",
                ctx.index.index_name
            )));
            return;
        }
        let mut fired_transition: Option<String> = None;
        let mut evaluation_failure: Option<String> = None;
        for transition in &self.transitions {
            match Self::transition_fires(transition, ctx).await {
                Ok(true) => {
                    fired_transition = Some(transition.state_name.clone());
                    break;
                }
                Ok(false) => {}
                Err(error) => {
                    evaluation_failure = Some(error);
                    break;
                }
            }
        }
        if let Some(error) = evaluation_failure {
            self.outcome = Some(StepOutcome::failed(format!(
                "Failed to evaluate transition conditions for index `{}`: {error}",
                ctx.index.index_name
            )));
            return;
        }
        match fired_transition {
            Some(target_state) => {
                self.outcome = Some(StepOutcome::completed(format!(
                    "Transitioning index `{}` to state `{target_state}`.",
                    ctx.index.index_name
                )));
                self.target_state = Some(target_state);
            }
            None => {
                self.outcome = Some(StepOutcome::completed(format!(
                    "No transition condition met yet for index `{}`.",
                    ctx.index.index_name
                )));
            }
        }
    }

    fn update_metadata(&self, current: &ManagedIndexMetadata) -> ManagedIndexMetadata {
        let mut updated = apply_outcome(current, self.outcome.as_ref());
        if self.target_state.is_some() {
            updated.transition_to = self.target_state.clone();
        }
        if self.policy_completed {
            updated.policy_completed = true;
        }
        updated
    }

    fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use warden_config::{ActionConfig, TransitionConditions};
    use warden_metastore::{
        IndexInfo, IndexStats, MetastoreError, MockClusterService, RolloverOutcome,
    };

    use super::*;

    fn index_info(creation_date_ms: i64, rollover_alias: Option<&str>) -> IndexInfo {
        IndexInfo {
            index_name: "nginx-logs-000001".to_string(),
            index_uuid: "aCzpX0QvTEGmD9HAfIKu1A".to_string(),
            policy_id: Some("hot-warm-delete".to_string()),
            rollover_alias: rollover_alias.map(ToString::to_string),
            creation_date_ms,
        }
    }

    fn step_context(cluster: MockClusterService, index: IndexInfo) -> StepContext {
        StepContext {
            cluster: Arc::new(cluster),
            index,
            metadata: ManagedIndexMetadata::new(
                "nginx-logs-000001",
                "aCzpX0QvTEGmD9HAfIKu1A",
                "hot-warm-delete",
            ),
        }
    }

    #[tokio::test]
    async fn test_attempt_open_step_records_completion() {
        let mut mock_cluster = MockClusterService::default();
        mock_cluster
            .expect_open_index()
            .times(1)
            .returning(|_| Ok(()));
        let ctx = step_context(mock_cluster, index_info(0, None));
        let mut step = AttemptOpenStep { outcome: None };
        step.execute(&ctx).await;
        let updated = step.update_metadata(&ctx.metadata);
        assert_eq!(step.outcome().unwrap().status, StepStatus::Completed);
        assert!(updated.info.unwrap()["message"]
            .as_str()
            .unwrap()
            .contains("Successfully opened"));
    }

    #[tokio::test]
    async fn test_attempt_delete_step_records_failure() {
        let mut mock_cluster = MockClusterService::default();
        mock_cluster.expect_delete_index().times(1).returning(|_| {
            Err(MetastoreError::ClusterBlocked {
                message: "no leader elected".to_string(),
            })
        });
        let ctx = step_context(mock_cluster, index_info(0, None));
        let mut step = AttemptDeleteStep { outcome: None };
        step.execute(&ctx).await;
        assert_eq!(step.outcome().unwrap().status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_attempt_set_read_only_step_records_flag() {
        let mut mock_cluster = MockClusterService::default();
        mock_cluster
            .expect_set_index_read_only()
            .times(1)
            .returning(|_, read_only| {
                assert!(read_only);
                Ok(())
            });
        let ctx = step_context(mock_cluster, index_info(0, None));
        let mut step = AttemptSetReadOnlyStep { outcome: None };
        step.execute(&ctx).await;
        let updated = step.update_metadata(&ctx.metadata);
        assert!(updated.was_read_only);
    }

    #[tokio::test]
    async fn test_attempt_rollover_step_is_idempotent() {
        let mock_cluster = MockClusterService::default();
        let mut ctx = step_context(mock_cluster, index_info(0, Some("nginx-logs")));
        ctx.metadata.rolled_over = true;
        let mut step = AttemptRolloverStep {
            params: RolloverParams::default(),
            outcome: None,
            rolled_over: false,
        };
        step.execute(&ctx).await;
        assert_eq!(step.outcome().unwrap().status, StepStatus::Completed);
        assert!(step.update_metadata(&ctx.metadata).rolled_over);
    }

    #[tokio::test]
    async fn test_attempt_rollover_step_fails_without_alias() {
        let mock_cluster = MockClusterService::default();
        let ctx = step_context(mock_cluster, index_info(0, None));
        let mut step = AttemptRolloverStep {
            params: RolloverParams::default(),
            outcome: None,
            rolled_over: false,
        };
        step.execute(&ctx).await;
        assert_eq!(step.outcome().unwrap().status, StepStatus::Failed);
        assert!(!step.update_metadata(&ctx.metadata).rolled_over);
    }

    #[tokio::test]
    async fn test_attempt_rollover_step_waits_for_conditions() {
        let mock_cluster = MockClusterService::default();
        // Index created just now, min age of one hour: not due yet.
        let ctx = step_context(
            mock_cluster,
            index_info(utc_now_millis(), Some("nginx-logs")),
        );
        let mut step = AttemptRolloverStep {
            params: RolloverParams {
                min_index_age: Some("1 hour".to_string()),
                min_doc_count: None,
            },
            outcome: None,
            rolled_over: false,
        };
        step.execute(&ctx).await;
        assert_eq!(step.outcome().unwrap().status, StepStatus::Completed);
        let updated = step.update_metadata(&ctx.metadata);
        assert!(!updated.rolled_over);
    }

    #[tokio::test]
    async fn test_attempt_rollover_step_rolls_over_on_doc_count() {
        let mut mock_cluster = MockClusterService::default();
        mock_cluster.expect_index_stats().times(1).returning(|_| {
            Ok(IndexStats {
                doc_count: 5_000,
                size_in_bytes: 1 << 20,
            })
        });
        mock_cluster
            .expect_rollover()
            .times(1)
            .returning(|rollover_alias| {
                assert_eq!(rollover_alias, "nginx-logs");
                Ok(RolloverOutcome {
                    old_index: "nginx-logs-000001".to_string(),
                    new_index: "nginx-logs-000002".to_string(),
                })
            });
        let ctx = step_context(
            mock_cluster,
            index_info(utc_now_millis(), Some("nginx-logs")),
        );
        let mut step = AttemptRolloverStep {
            params: RolloverParams {
                min_index_age: None,
                min_doc_count: Some(1_000),
            },
            outcome: None,
            rolled_over: false,
        };
        step.execute(&ctx).await;
        assert_eq!(step.outcome().unwrap().status, StepStatus::Completed);
        assert!(step.update_metadata(&ctx.metadata).rolled_over);
    }

    #[tokio::test]
    async fn test_attempt_transition_step_completes_policy_without_transitions() {
        let mock_cluster = MockClusterService::default();
        let ctx = step_context(mock_cluster, index_info(0, None));
        let mut step = AttemptTransitionStep {
            transitions: Vec::new(),
            outcome: None,
            target_state: None,
            policy_completed: false,
        };
        step.execute(&ctx).await;
        let updated = step.update_metadata(&ctx.metadata);
        assert!(updated.policy_completed);
        assert_eq!(updated.transition_to, None);
    }

    #[tokio::test]
    async fn test_attempt_transition_step_fires_first_ready_transition() {
        let mock_cluster = MockClusterService::default();
        // One day old index.
        let ctx = step_context(
            mock_cluster,
            index_info(utc_now_millis() - 86_400_000, None),
        );
        let mut step = AttemptTransitionStep {
            transitions: vec![
                Transition {
                    state_name: "cold".to_string(),
                    conditions: Some(TransitionConditions {
                        min_index_age: Some("30 days".to_string()),
                        min_doc_count: None,
                    }),
                },
                Transition {
                    state_name: "warm".to_string(),
                    conditions: Some(TransitionConditions {
                        min_index_age: Some("12 hours".to_string()),
                        min_doc_count: None,
                    }),
                },
            ],
            outcome: None,
            target_state: None,
            policy_completed: false,
        };
        step.execute(&ctx).await;
        let updated = step.update_metadata(&ctx.metadata);
        assert_eq!(updated.transition_to.as_deref(), Some("warm"));
        assert!(!updated.policy_completed);
    }

    #[tokio::test]
    async fn test_attempt_transition_step_waits_when_no_condition_met() {
        let mock_cluster = MockClusterService::default();
        let ctx = step_context(mock_cluster, index_info(utc_now_millis(), None));
        let mut step = AttemptTransitionStep {
            transitions: vec![Transition {
                state_name: "warm".to_string(),
                conditions: Some(TransitionConditions {
                    min_index_age: Some("30 days".to_string()),
                    min_doc_count: None,
                }),
            }],
            outcome: None,
            target_state: None,
            policy_completed: false,
        };
        step.execute(&ctx).await;
        assert_eq!(step.outcome().unwrap().status, StepStatus::Completed);
        let updated = step.update_metadata(&ctx.metadata);
        assert_eq!(updated.transition_to, None);
        assert!(!updated.policy_completed);
    }

    #[test]
    fn test_resolve_action_at_positions() {
        let state = State {
            name: "hot".to_string(),
            actions: vec![ActionConfig {
                retry: ActionRetryConfig::default(),
                action_type: ActionType::Rollover(RolloverParams::default()),
            }],
            transitions: Vec::new(),
        };
        assert_eq!(resolve_action_at(&state, 0).unwrap().kind(), "rollover");
        assert_eq!(
            resolve_action_at(&state, 1).unwrap().kind(),
            TRANSITION_ACTION_NAME
        );
        assert!(resolve_action_at(&state, 2).is_none());
    }
}
