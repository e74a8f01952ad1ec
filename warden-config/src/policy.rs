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

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context};
use humantime::parse_duration;
use serde::{Deserialize, Serialize};

use crate::ActionConfig;

/// A named state machine of states -> actions -> steps, attached to the
/// indexes it manages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub default_state: String,
    pub states: Vec<State>,
}

impl Policy {
    pub fn state(&self, state_name: &str) -> Option<&State> {
        self.states.iter().find(|state| state.name == state_name)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.states.is_empty() {
            bail!("Policy `{}` declares no state.", self.policy_id);
        }
        let state_names: HashSet<&str> = self
            .states
            .iter()
            .map(|state| state.name.as_str())
            .collect();
        if state_names.len() != self.states.len() {
            bail!("Policy `{}` declares duplicate state names.", self.policy_id);
        }
        if !state_names.contains(self.default_state.as_str()) {
            bail!(
                "Policy `{}` default state `{}` is not a declared state.",
                self.policy_id,
                self.default_state
            );
        }
        for state in &self.states {
            for transition in &state.transitions {
                if !state_names.contains(transition.state_name.as_str()) {
                    bail!(
                        "Policy `{}` state `{}` transitions to undeclared state `{}`.",
                        self.policy_id,
                        state.name,
                        transition.state_name
                    );
                }
                if let Some(conditions) = &transition.conditions {
                    conditions.validate().with_context(|| {
                        format!(
                            "Invalid transition conditions in policy `{}` state `{}`.",
                            self.policy_id, state.name
                        )
                    })?;
                }
            }
            for action_config in &state.actions {
                action_config.retry.validate().with_context(|| {
                    format!(
                        "Invalid `{}` action in policy `{}` state `{}`.",
                        action_config.kind(),
                        self.policy_id,
                        state.name
                    )
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state_name: String,
    /// A transition with no conditions fires unconditionally.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<TransitionConditions>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionConditions {
    /// Minimum index age, expressed in a human-friendly way
    /// (`30 days`, `12 hours`, ...).
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_index_age: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<u64>,
}

impl TransitionConditions {
    pub fn min_index_age(&self) -> anyhow::Result<Option<Duration>> {
        self.min_index_age
            .as_deref()
            .map(|min_index_age| {
                parse_duration(min_index_age).with_context(|| {
                    format!("Failed to parse transition min index age `{min_index_age}`.")
                })
            })
            .transpose()
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.min_index_age()?;
        Ok(())
    }
}
