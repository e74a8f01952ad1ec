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

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use cron::Schedule;
use serde::{Deserialize, Serialize};

/// Frequency at which a job is dispatched by the external scheduler,
/// expressed in a human-friendly way (`hourly`, `daily`, ...) or as a cron
/// expression (`0 0 * * * *`, `0 0 0 * * *`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSchedule {
    expression: String,
}

impl JobSchedule {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    pub fn hourly() -> Self {
        Self::new("hourly")
    }

    fn compiled(&self) -> anyhow::Result<Schedule> {
        let expression = self.expression.trim();
        // Bare aliases reach the cron parser in their `@`-prefixed form:
        // `hourly` -> `@hourly`.
        let parsed = if expression.starts_with('@')
            || !expression.chars().all(|ch| ch.is_ascii_alphabetic())
        {
            Schedule::from_str(expression)
        } else {
            Schedule::from_str(&format!("@{expression}"))
        };
        parsed.with_context(|| format!("Failed to parse job schedule `{}`.", self.expression))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.compiled()?;
        Ok(())
    }

    pub fn time_to_next_run(&self) -> anyhow::Result<Duration> {
        let next_run = self
            .compiled()?
            .upcoming(Utc)
            .next()
            .context("Job schedule yields no upcoming run date.")?;
        // A next-run date can slip into the past between the two clock
        // reads; that is due now, not an error.
        Ok((next_run - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_aliases_are_accepted() {
        for alias in ["hourly", "daily", "@weekly", " monthly "] {
            JobSchedule::new(alias).validate().unwrap_or_else(|error| {
                panic!("Expected schedule alias `{alias}` to be valid: {error}")
            });
        }
    }

    #[test]
    fn test_schedule_cron_expression_is_accepted() {
        JobSchedule::new("0 0 * * * *").validate().unwrap();
        let time_to_next_run = JobSchedule::new("0 0 * * * *")
            .time_to_next_run()
            .unwrap();
        assert!(time_to_next_run <= Duration::from_secs(3600));
    }

    #[test]
    fn test_schedule_rejects_malformed_expression() {
        assert!(JobSchedule::new("every full moon").validate().is_err());
    }

    #[test]
    fn test_schedule_serializes_as_plain_string() {
        let schedule = JobSchedule::hourly();
        let schedule_json = serde_json::to_string(&schedule).unwrap();
        assert_eq!(schedule_json, r#""hourly""#);
        let deserialized: JobSchedule = serde_json::from_str(&schedule_json).unwrap();
        assert_eq!(deserialized, schedule);
    }
}
