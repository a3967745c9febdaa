// Copyright 2026 The region-balancer Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Names of the cost functions a configuration may reference.
pub const COST_FUNCTION_NAMES: &[&str] = &[
    "region_count_skew",
    "primary_region_count_skew",
    "table_skew",
    "rack_skew",
];

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BalancerConfig {
    /// Hard cap on optimizer steps per run.
    pub max_steps: u64,
    /// Steps scale with cluster size: `steps_per_region * num_regions`,
    /// bounded by `max_steps`.
    pub steps_per_region: u64,
    pub max_run_time_millis: u64,
    /// A run whose best improvement stays below this emits an empty plan.
    pub min_cost_need_balance: f64,
    /// Total weighted cost at or below this ends the run early.
    pub converged_cost: f64,

    #[serde(default)]
    pub cost_functions: HashMap<String, CostFunctionConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CostFunctionConfig {
    pub multiplier: Option<f64>,
    pub enabled: Option<bool>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            steps_per_region: 800,
            max_run_time_millis: 30_000,
            min_cost_need_balance: 0.025,
            converged_cost: 0.0,
            cost_functions: HashMap::new(),
        }
    }
}

impl BalancerConfig {
    pub fn max_run_time(&self) -> Duration {
        Duration::from_millis(self.max_run_time_millis)
    }

    pub fn multiplier_of(&self, name: &str, default: f64) -> f64 {
        self.cost_functions
            .get(name)
            .and_then(|c| c.multiplier)
            .unwrap_or(default)
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.cost_functions
            .get(name)
            .and_then(|c| c.enabled)
            .unwrap_or(true)
    }

    /// Applies one entry of the string option surface. Recognized keys:
    /// `balancer.maxSteps`, `balancer.maxRunTimeMillis`,
    /// `balancer.minCostNeedBalance`, `<name>.multiplier`, `<name>.enabled`.
    pub fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "balancer.maxSteps" => self.max_steps = parse(key, value)?,
            "balancer.maxRunTimeMillis" => self.max_run_time_millis = parse(key, value)?,
            "balancer.minCostNeedBalance" => self.min_cost_need_balance = parse(key, value)?,
            _ => {
                let (name, field) = key.rsplit_once('.').ok_or_else(|| unknown_key(key))?;
                if !COST_FUNCTION_NAMES.contains(&name) {
                    return Err(unknown_key(key));
                }
                let entry = self.cost_functions.entry(name.to_owned()).or_default();
                match field {
                    "multiplier" => entry.multiplier = Some(parse(key, value)?),
                    "enabled" => entry.enabled = Some(parse(key, value)?),
                    _ => return Err(unknown_key(key)),
                }
            }
        }
        Ok(())
    }

    /// Fails fast before a run starts, never mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(Error::InvalidConfiguration("max_steps must be > 0".into()));
        }
        if self.max_run_time_millis == 0 {
            return Err(Error::InvalidConfiguration(
                "max_run_time_millis must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_cost_need_balance) {
            return Err(Error::InvalidConfiguration(
                "min_cost_need_balance must be within [0, 1]".into(),
            ));
        }
        if !self.converged_cost.is_finite() || self.converged_cost < 0.0 {
            return Err(Error::InvalidConfiguration(
                "converged_cost must be finite and >= 0".into(),
            ));
        }
        for (name, c) in &self.cost_functions {
            if !COST_FUNCTION_NAMES.contains(&name.as_str()) {
                return Err(Error::InvalidConfiguration(format!(
                    "unknown cost function {name}"
                )));
            }
            if let Some(m) = c.multiplier {
                if !m.is_finite() || m < 0.0 {
                    return Err(Error::InvalidConfiguration(format!(
                        "{name}.multiplier must be finite and >= 0"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidConfiguration(format!("bad value {value:?} for {key}")))
}

fn unknown_key(key: &str) -> Error {
    Error::InvalidConfiguration(format!("unknown option {key}"))
}
