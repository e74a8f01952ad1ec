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

use anyhow::{bail, Context};
use humantime::parse_duration;
use serde::{Deserialize, Serialize};

/// What a rollup job aggregates and where the summary documents go.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollupSpec {
    pub source_index: String,
    pub target_index: String,
    /// Number of composite buckets requested per search page.
    pub page_size: usize,
    /// A continuous job keeps rolling new data up on every trigger instead
    /// of terminating once the source has been fully processed.
    #[serde(default)]
    pub continuous: bool,
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricsSpec>,
}

impl RollupSpec {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.page_size == 0 {
            bail!("Rollup page size must be strictly positive.");
        }
        if self.dimensions.is_empty() {
            bail!("Rollup requires at least one dimension.");
        }
        if !matches!(self.dimensions[0], Dimension::DateHistogram(_)) {
            bail!("The first rollup dimension must be a date histogram.");
        }
        for dimension in &self.dimensions {
            dimension.validate()?;
        }
        for metrics_spec in &self.metrics {
            if metrics_spec.metrics.is_empty() {
                bail!(
                    "Rollup metrics for field `{}` declare no aggregation.",
                    metrics_spec.source_field
                );
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dimension_type", content = "params")]
pub enum Dimension {
    #[serde(rename = "date_histogram")]
    DateHistogram(DateHistogramParams),
    #[serde(rename = "terms")]
    Terms(TermsParams),
    #[serde(rename = "histogram")]
    Histogram(HistogramParams),
}

impl Dimension {
    pub fn source_field(&self) -> &str {
        match self {
            Dimension::DateHistogram(params) => &params.source_field,
            Dimension::Terms(params) => &params.source_field,
            Dimension::Histogram(params) => &params.source_field,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self {
            Dimension::DateHistogram(params) => {
                parse_duration(&params.fixed_interval).with_context(|| {
                    format!(
                        "Failed to parse date histogram interval `{}`.",
                        params.fixed_interval
                    )
                })?;
            }
            Dimension::Histogram(params) => {
                if params.interval <= 0.0 {
                    bail!(
                        "Histogram interval for field `{}` must be strictly positive.",
                        params.source_field
                    );
                }
            }
            Dimension::Terms(_) => {}
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DateHistogramParams {
    pub source_field: String,
    /// Bucket width, expressed in a human-friendly way (`1 hour`, ...).
    pub fixed_interval: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermsParams {
    pub source_field: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramParams {
    pub source_field: String,
    pub interval: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSpec {
    pub source_field: String,
    pub metrics: Vec<Metric>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Avg,
    Sum,
    Min,
    Max,
    ValueCount,
}
