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

use super::WorkingAssignment;
use crate::{config::BalancerConfig, snapshot::ClusterSnapshot, Result};

const DEFAULT_REGION_COUNT_SKEW_COST: f64 = 500.0;
const DEFAULT_PRIMARY_REGION_COUNT_SKEW_COST: f64 = 500.0;
const DEFAULT_TABLE_SKEW_COST: f64 = 35.0;
const DEFAULT_RACK_SKEW_COST: f64 = 100.0;

/// One weighted objective scoring how unbalanced an assignment is along one
/// dimension. `prepare` sizes and recomputes the per-server statistics for a
/// snapshot; `region_moved` keeps them current incrementally; `cost` reads
/// them out as a value in [0, 1].
pub trait CostFunction: Send {
    fn name(&self) -> &'static str;

    fn multiplier(&self) -> f64;

    /// Cheap predicate letting the optimizer skip functions that are
    /// degenerate for this snapshot.
    fn is_needed(&self, snapshot: &ClusterSnapshot) -> bool {
        let _ = snapshot;
        true
    }

    fn prepare(&mut self, snapshot: &ClusterSnapshot, assignment: &WorkingAssignment)
        -> Result<()>;

    fn region_moved(&mut self, snapshot: &ClusterSnapshot, region: usize, from: usize, to: usize);

    fn cost(&self) -> f64;
}

/// Builds the active cost function set from configuration; disabled functions
/// and zero multipliers drop out entirely.
pub fn build_cost_functions(config: &BalancerConfig) -> Vec<Box<dyn CostFunction>> {
    let all: Vec<Box<dyn CostFunction>> = vec![
        Box::new(RegionCountSkewCost::new(
            config.multiplier_of("region_count_skew", DEFAULT_REGION_COUNT_SKEW_COST),
        )),
        Box::new(PrimaryRegionCountSkewCost::new(config.multiplier_of(
            "primary_region_count_skew",
            DEFAULT_PRIMARY_REGION_COUNT_SKEW_COST,
        ))),
        Box::new(TableSkewCost::new(
            config.multiplier_of("table_skew", DEFAULT_TABLE_SKEW_COST),
        )),
        Box::new(RackSkewCost::new(
            config.multiplier_of("rack_skew", DEFAULT_RACK_SKEW_COST),
        )),
    ];
    all.into_iter()
        .filter(|f| config.enabled(f.name()) && f.multiplier() > 0.0)
        .collect()
}

/// Normalizes a per-server (or per-rack) value vector into [0, 1]: the sum of
/// absolute deviations from the mean, scaled between the unavoidable minimum
/// (remainder skew when the total doesn't divide evenly) and the worst case
/// of all load on one slot. A perfectly uniform vector costs 0.
pub(crate) fn cost_from_array(stats: &[f64]) -> f64 {
    if stats.is_empty() {
        return 0.0;
    }
    let count = stats.len() as f64;
    let total: f64 = stats.iter().sum();
    let mean = total / count;

    let max = (count - 1.0) * mean + (total - mean);
    let min = if count > total {
        (count - total) * mean + (1.0 - mean) * total
    } else {
        let num_high = total - mean.floor() * count;
        let num_low = count - num_high;
        num_high * (mean.ceil() - mean) + num_low * (mean - mean.floor())
    };
    let min = min.max(0.0);

    let total_cost: f64 = stats.iter().map(|v| (v - mean).abs()).sum();
    scale(min, max, total_cost)
}

fn scale(min: f64, max: f64, value: f64) -> f64 {
    if max <= min || value <= min {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Skew in total region count per server.
pub struct RegionCountSkewCost {
    multiplier: f64,
    stats: Vec<f64>,
}

impl RegionCountSkewCost {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier,
            stats: Vec::new(),
        }
    }
}

impl CostFunction for RegionCountSkewCost {
    fn name(&self) -> &'static str {
        "region_count_skew"
    }

    fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn prepare(
        &mut self,
        snapshot: &ClusterSnapshot,
        assignment: &WorkingAssignment,
    ) -> Result<()> {
        self.stats.clear();
        self.stats.resize(snapshot.num_servers, 0.0);
        for (s, regions) in assignment.server_regions.iter().enumerate() {
            self.stats[s] = regions.len() as f64;
        }
        Ok(())
    }

    fn region_moved(&mut self, _: &ClusterSnapshot, _region: usize, from: usize, to: usize) {
        self.stats[from] -= 1.0;
        self.stats[to] += 1.0;
    }

    fn cost(&self) -> f64 {
        cost_from_array(&self.stats)
    }
}

/// Skew in the number of primary regions per server. Primaries absorb all
/// writes and most reads, so an even total count can still overload the
/// servers holding the primaries. Degenerate without replicas, where every
/// region is trivially primary.
pub struct PrimaryRegionCountSkewCost {
    multiplier: f64,
    stats: Vec<f64>,
}

impl PrimaryRegionCountSkewCost {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier,
            stats: Vec::new(),
        }
    }
}

impl CostFunction for PrimaryRegionCountSkewCost {
    fn name(&self) -> &'static str {
        "primary_region_count_skew"
    }

    fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn is_needed(&self, snapshot: &ClusterSnapshot) -> bool {
        snapshot.has_region_replicas
    }

    fn prepare(
        &mut self,
        snapshot: &ClusterSnapshot,
        assignment: &WorkingAssignment,
    ) -> Result<()> {
        self.stats.clear();
        self.stats.resize(snapshot.num_servers, 0.0);
        for (s, regions) in assignment.server_regions.iter().enumerate() {
            for &r in regions {
                if snapshot.primary_of_region(r) == r {
                    self.stats[s] += 1.0;
                }
            }
        }
        Ok(())
    }

    fn region_moved(&mut self, snapshot: &ClusterSnapshot, region: usize, from: usize, to: usize) {
        if snapshot.primary_of_region(region) == region {
            self.stats[from] -= 1.0;
            self.stats[to] += 1.0;
        }
    }

    fn cost(&self) -> f64 {
        cost_from_array(&self.stats)
    }
}

/// Per-table skew across servers, averaged over tables. Keeps a single hot
/// table from piling onto few servers even when total counts look even.
pub struct TableSkewCost {
    multiplier: f64,
    // table -> per-server counts.
    stats: Vec<Vec<f64>>,
}

impl TableSkewCost {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier,
            stats: Vec::new(),
        }
    }
}

impl CostFunction for TableSkewCost {
    fn name(&self) -> &'static str {
        "table_skew"
    }

    fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn is_needed(&self, snapshot: &ClusterSnapshot) -> bool {
        snapshot.num_tables > 1
    }

    fn prepare(
        &mut self,
        snapshot: &ClusterSnapshot,
        assignment: &WorkingAssignment,
    ) -> Result<()> {
        self.stats.clear();
        self.stats
            .resize(snapshot.num_tables, vec![0.0; snapshot.num_servers]);
        for (s, regions) in assignment.server_regions.iter().enumerate() {
            for &r in regions {
                self.stats[snapshot.table_of_region(r)][s] += 1.0;
            }
        }
        Ok(())
    }

    fn region_moved(&mut self, snapshot: &ClusterSnapshot, region: usize, from: usize, to: usize) {
        let t = snapshot.table_of_region(region);
        self.stats[t][from] -= 1.0;
        self.stats[t][to] += 1.0;
    }

    fn cost(&self) -> f64 {
        if self.stats.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.stats.iter().map(|per_table| cost_from_array(per_table)).sum();
        sum / self.stats.len() as f64
    }
}

/// Skew in region count per rack; degenerate on single-rack clusters.
pub struct RackSkewCost {
    multiplier: f64,
    stats: Vec<f64>,
}

impl RackSkewCost {
    pub fn new(multiplier: f64) -> Self {
        Self {
            multiplier,
            stats: Vec::new(),
        }
    }
}

impl CostFunction for RackSkewCost {
    fn name(&self) -> &'static str {
        "rack_skew"
    }

    fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn is_needed(&self, snapshot: &ClusterSnapshot) -> bool {
        snapshot.num_racks > 1
    }

    fn prepare(
        &mut self,
        snapshot: &ClusterSnapshot,
        assignment: &WorkingAssignment,
    ) -> Result<()> {
        self.stats.clear();
        self.stats.resize(snapshot.num_racks, 0.0);
        for (s, regions) in assignment.server_regions.iter().enumerate() {
            self.stats[snapshot.rack_of_server(s)] += regions.len() as f64;
        }
        Ok(())
    }

    fn region_moved(&mut self, snapshot: &ClusterSnapshot, _region: usize, from: usize, to: usize) {
        self.stats[snapshot.rack_of_server(from)] -= 1.0;
        self.stats[snapshot.rack_of_server(to)] += 1.0;
    }

    fn cost(&self) -> f64 {
        cost_from_array(&self.stats)
    }
}
