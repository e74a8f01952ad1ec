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

use warden_config::{ActionRetryConfig, Policy, State};
use warden_metastore::{
    ActionMetadata, ManagedIndexMetadata, StateMetadata, StepMetadata, StepStatus,
};

use crate::actions::{resolve_action_at, Action};
use crate::step::Step;

/// What one tick resolved to execute: the state, the action within it, and
/// the action's next step. Resolution order is state, then action, then
/// step; the first action in declared order wins.
pub struct Execution<'a> {
    pub state: &'a State,
    pub action: Box<dyn Action>,
    pub step: Box<dyn Step>,
    /// The tick enters a state the metadata was not in yet, either on
    /// first contact or because a transition fired.
    pub entering_state: bool,
}

impl<'a> std::fmt::Debug for Execution<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("state", &self.state)
            .field("action", &self.action.kind())
            .field("step", &self.step.name())
            .field("entering_state", &self.entering_state)
            .finish()
    }
}

/// Resolves the `(state, action, step)` triple for the current metadata.
/// An unresolvable triple is reported as a message destined for the job's
/// error state.
pub fn resolve_execution<'a>(
    policy: &'a Policy,
    metadata: &ManagedIndexMetadata,
) -> Result<Execution<'a>, String> {
    let (state_name, entering_state) = match &metadata.transition_to {
        Some(target_state) => (target_state.as_str(), true),
        None => match &metadata.state {
            None => (policy.default_state.as_str(), true),
            Some(state_metadata) => (state_metadata.name.as_str(), false),
        },
    };
    let Some(state) = policy.state(state_name) else {
        return Err(format!(
            "Policy `{}` has no state named `{state_name}`.",
            policy.policy_id
        ));
    };

    let position = if entering_state {
        0
    } else {
        next_action_position(state, metadata)?
    };
    let Some(action) = resolve_action_at(state, position) else {
        return Err(format!(
            "State `{}` of policy `{}` has no action to execute at position {position}.",
            state.name, policy.policy_id
        ));
    };
    let step = action.step_to_execute(metadata);
    Ok(Execution {
        state,
        action,
        step,
        entering_state,
    })
}

fn next_action_position(state: &State, metadata: &ManagedIndexMetadata) -> Result<usize, String> {
    let Some(action_metadata) = &metadata.action else {
        return Ok(0);
    };
    let step_status = metadata.step.as_ref().map(|step_metadata| step_metadata.status);
    match step_status {
        // Nothing recorded yet, or the previous attempt has to be redone.
        None | Some(StepStatus::Starting) | Some(StepStatus::Failed) => Ok(action_metadata.index),
        Some(StepStatus::Completed) => {
            let Some(current_action) = resolve_action_at(state, action_metadata.index) else {
                return Err(format!(
                    "State `{}` no longer declares an action at position {}.",
                    state.name, action_metadata.index
                ));
            };
            // A completed step of an action whose work did not happen yet
            // (rollover waiting on its conditions, transition waiting on
            // its own) is re-entered instead of advanced past.
            if !current_action.is_fulfilled(metadata) {
                Ok(action_metadata.index)
            } else {
                Ok(action_metadata.index + 1)
            }
        }
    }
}

/// Builds the metadata persisted before the side effect runs: the step is
/// marked starting, state entry is recorded, and the pending transition is
/// consumed.
pub fn starting_metadata(
    current: &ManagedIndexMetadata,
    execution: &Execution<'_>,
    now_ms: i64,
) -> ManagedIndexMetadata {
    let mut starting = current.clone();
    if execution.entering_state {
        starting.state = Some(StateMetadata {
            name: execution.state.name.clone(),
            start_time_ms: now_ms,
        });
        starting.transition_to = None;
        starting.action = None;
        starting.step = None;
    }
    let continuing_action = starting.action.as_ref().filter(|action_metadata| {
        action_metadata.index == execution.action.position()
            && action_metadata.name == execution.action.kind()
    });
    starting.action = Some(match continuing_action {
        Some(action_metadata) => action_metadata.clone(),
        None => ActionMetadata {
            name: execution.action.kind().to_string(),
            start_time_ms: now_ms,
            index: execution.action.position(),
            failed: false,
            consumed_retries: 0,
            last_retry_time_ms: None,
        },
    });
    starting.step = Some(StepMetadata {
        name: execution.step.name().to_string(),
        start_time_ms: now_ms,
        status: StepStatus::Starting,
    });
    starting
}

/// Projects the executed step onto the starting metadata and applies the
/// action retry bookkeeping on failure.
pub fn completed_metadata(
    starting: &ManagedIndexMetadata,
    step: &dyn Step,
    retry_config: &ActionRetryConfig,
    now_ms: i64,
) -> ManagedIndexMetadata {
    let mut executed = step.update_metadata(starting);
    if let Some(outcome) = step.outcome() {
        if outcome.status == StepStatus::Failed {
            if let Some(action_metadata) = executed.action.as_mut() {
                if action_metadata.consumed_retries < retry_config.count {
                    action_metadata.consumed_retries += 1;
                    action_metadata.last_retry_time_ms = Some(now_ms);
                } else {
                    action_metadata.failed = true;
                }
            }
        }
    }
    executed
}

/// Remaining backoff in milliseconds before the current action may be
/// retried, or `None` when the tick may proceed.
pub fn should_backoff(
    action: &dyn Action,
    metadata: &ManagedIndexMetadata,
    now_ms: i64,
) -> Option<i64> {
    let action_metadata = metadata.action.as_ref()?;
    if action_metadata.index != action.position() || action_metadata.consumed_retries == 0 {
        return None;
    }
    let last_retry_time_ms = action_metadata.last_retry_time_ms?;
    let base_delay_ms = action.retry_config().delay().ok()?.as_millis() as i64;
    let backoff_ms = base_delay_ms
        .saturating_mul(1_i64 << (action_metadata.consumed_retries - 1).min(32));
    let next_retry_time_ms = last_retry_time_ms.saturating_add(backoff_ms);
    if now_ms < next_retry_time_ms {
        Some(next_retry_time_ms - now_ms)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use warden_config::{ActionConfig, ActionType, RolloverParams, Transition};

    use super::*;
    use crate::actions::TRANSITION_ACTION_NAME;

    fn two_state_policy() -> Policy {
        Policy {
            policy_id: "hot-delete".to_string(),
            description: None,
            default_state: "hot".to_string(),
            states: vec![
                State {
                    name: "hot".to_string(),
                    actions: vec![
                        ActionConfig {
                            retry: ActionRetryConfig::default(),
                            action_type: ActionType::Rollover(RolloverParams::default()),
                        },
                        ActionConfig {
                            retry: ActionRetryConfig::default(),
                            action_type: ActionType::ReadOnly,
                        },
                    ],
                    transitions: vec![Transition {
                        state_name: "delete".to_string(),
                        conditions: None,
                    }],
                },
                State {
                    name: "delete".to_string(),
                    actions: vec![ActionConfig {
                        retry: ActionRetryConfig::default(),
                        action_type: ActionType::Delete,
                    }],
                    transitions: Vec::new(),
                },
            ],
        }
    }

    fn metadata() -> ManagedIndexMetadata {
        ManagedIndexMetadata::new("nginx-logs", "aCzpX0QvTEGmD9HAfIKu1A", "hot-delete")
    }

    fn metadata_in_action(
        state: &str,
        action_name: &str,
        index: usize,
        step_name: &str,
        status: StepStatus,
    ) -> ManagedIndexMetadata {
        let mut md = metadata();
        md.state = Some(StateMetadata {
            name: state.to_string(),
            start_time_ms: 0,
        });
        md.action = Some(ActionMetadata {
            name: action_name.to_string(),
            start_time_ms: 0,
            index,
            failed: false,
            consumed_retries: 0,
            last_retry_time_ms: None,
        });
        md.step = Some(StepMetadata {
            name: step_name.to_string(),
            start_time_ms: 0,
            status,
        });
        md
    }

    #[test]
    fn test_resolution_of_fresh_metadata_enters_default_state() {
        let policy = two_state_policy();
        let execution = resolve_execution(&policy, &metadata()).unwrap();
        assert!(execution.entering_state);
        assert_eq!(execution.state.name, "hot");
        assert_eq!(execution.action.kind(), "rollover");
        assert_eq!(execution.step.name(), "attempt_rollover");
    }

    #[test]
    fn test_resolution_retries_failed_step() {
        let policy = two_state_policy();
        let md = metadata_in_action("hot", "rollover", 0, "attempt_rollover", StepStatus::Failed);
        let execution = resolve_execution(&policy, &md).unwrap();
        assert!(!execution.entering_state);
        assert_eq!(execution.action.kind(), "rollover");
        assert_eq!(execution.action.position(), 0);
    }

    #[test]
    fn test_resolution_repeats_unfulfilled_rollover() {
        let policy = two_state_policy();
        let md = metadata_in_action(
            "hot",
            "rollover",
            0,
            "attempt_rollover",
            StepStatus::Completed,
        );
        // `rolled_over` is still false: the conditions were not met.
        let execution = resolve_execution(&policy, &md).unwrap();
        assert_eq!(execution.action.kind(), "rollover");
        assert_eq!(execution.action.position(), 0);
    }

    #[test]
    fn test_resolution_advances_past_fulfilled_rollover() {
        let policy = two_state_policy();
        let mut md = metadata_in_action(
            "hot",
            "rollover",
            0,
            "attempt_rollover",
            StepStatus::Completed,
        );
        md.rolled_over = true;
        let execution = resolve_execution(&policy, &md).unwrap();
        assert_eq!(execution.action.kind(), "read_only");
        assert_eq!(execution.action.position(), 1);
    }

    #[test]
    fn test_resolution_reaches_transition_action_after_last_action() {
        let policy = two_state_policy();
        let md = metadata_in_action(
            "hot",
            "read_only",
            1,
            "attempt_set_read_only",
            StepStatus::Completed,
        );
        let execution = resolve_execution(&policy, &md).unwrap();
        assert_eq!(execution.action.kind(), TRANSITION_ACTION_NAME);
        assert_eq!(execution.action.position(), 2);
    }

    #[test]
    fn test_resolution_follows_pending_transition() {
        let policy = two_state_policy();
        let mut md = metadata_in_action(
            "hot",
            TRANSITION_ACTION_NAME,
            2,
            "attempt_transition",
            StepStatus::Completed,
        );
        md.transition_to = Some("delete".to_string());
        let execution = resolve_execution(&policy, &md).unwrap();
        assert!(execution.entering_state);
        assert_eq!(execution.state.name, "delete");
        assert_eq!(execution.action.kind(), "delete");
    }

    #[test]
    fn test_resolution_reports_unknown_state() {
        let policy = two_state_policy();
        let mut md = metadata();
        md.transition_to = Some("frozen".to_string());
        let resolution_error = resolve_execution(&policy, &md).unwrap_err();
        assert!(resolution_error.contains("no state named `frozen`"));
    }

    #[test]
    fn test_starting_metadata_on_state_entry() {
        let policy = two_state_policy();
        let mut md = metadata_in_action(
            "hot",
            TRANSITION_ACTION_NAME,
            2,
            "attempt_transition",
            StepStatus::Completed,
        );
        md.transition_to = Some("delete".to_string());
        let execution = resolve_execution(&policy, &md).unwrap();
        let starting = starting_metadata(&md, &execution, 42);
        assert_eq!(starting.state.as_ref().unwrap().name, "delete");
        assert_eq!(starting.state.as_ref().unwrap().start_time_ms, 42);
        assert_eq!(starting.transition_to, None);
        let action_metadata = starting.action.as_ref().unwrap();
        assert_eq!(action_metadata.name, "delete");
        assert_eq!(action_metadata.index, 0);
        assert_eq!(action_metadata.consumed_retries, 0);
        let step_metadata = starting.step.as_ref().unwrap();
        assert_eq!(step_metadata.name, "attempt_delete");
        assert_eq!(step_metadata.status, StepStatus::Starting);
    }

    #[test]
    fn test_starting_metadata_keeps_retry_bookkeeping_of_continuing_action() {
        let policy = two_state_policy();
        let mut md =
            metadata_in_action("hot", "rollover", 0, "attempt_rollover", StepStatus::Failed);
        md.action.as_mut().unwrap().consumed_retries = 2;
        md.action.as_mut().unwrap().last_retry_time_ms = Some(41);
        let execution = resolve_execution(&policy, &md).unwrap();
        let starting = starting_metadata(&md, &execution, 42);
        let action_metadata = starting.action.as_ref().unwrap();
        assert_eq!(action_metadata.consumed_retries, 2);
        assert_eq!(action_metadata.last_retry_time_ms, Some(41));
        assert_eq!(starting.step.as_ref().unwrap().status, StepStatus::Starting);
    }

    #[test]
    fn test_should_backoff_applies_exponential_delay() {
        let policy = two_state_policy();
        let mut md =
            metadata_in_action("hot", "rollover", 0, "attempt_rollover", StepStatus::Failed);
        md.action.as_mut().unwrap().consumed_retries = 2;
        md.action.as_mut().unwrap().last_retry_time_ms = Some(1_000);
        let execution = resolve_execution(&policy, &md).unwrap();
        // Base delay 250ms, second retry: 500ms of backoff.
        assert_eq!(
            should_backoff(execution.action.as_ref(), &md, 1_100),
            Some(400)
        );
        assert_eq!(should_backoff(execution.action.as_ref(), &md, 1_500), None);
    }

    #[test]
    fn test_should_backoff_ignores_untouched_action() {
        let policy = two_state_policy();
        let md = metadata_in_action("hot", "rollover", 0, "attempt_rollover", StepStatus::Failed);
        let execution = resolve_execution(&policy, &md).unwrap();
        assert_eq!(should_backoff(execution.action.as_ref(), &md, 1_000), None);
    }
}
