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

use std::{
    sync::{atomic::AtomicBool, Arc},
    time::Instant,
};

use tracing::info;

mod candidate;
mod cost;
mod optimizer;

pub use cost::{build_cost_functions, CostFunction};
pub use optimizer::optimize;

use crate::{
    config::BalancerConfig,
    metrics,
    rsgroup::{GroupStore, RsGroupManager},
    snapshot::ClusterSnapshot,
    source::ClusterSource,
    Result,
};

/// One reassignment in an emitted plan. `from` is absent for regions that
/// arrived unassigned and received their first placement this round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionMove {
    pub region: u64,
    pub from: Option<u64>,
    pub to: u64,
}

#[derive(Clone, Copy, Debug)]
pub enum StopReason {
    /// Total cost fell to the configured "good enough" level.
    Converged,
    /// Step budget, wall-clock budget, or cancellation.
    BudgetExhausted,
}

/// Result of one balancing round. An empty plan is the normal outcome of a
/// round whose best improvement wasn't worth moving anything for.
#[derive(Clone, Debug)]
pub struct BalanceOutcome {
    pub plan: Vec<RegionMove>,
    pub initial_cost: f64,
    pub best_cost: f64,
    pub stop: StopReason,
    pub steps: u64,
    pub accepted: u64,
}

/// The candidate assignment the optimizer mutates in place. The snapshot it
/// derives from is never touched.
pub struct WorkingAssignment {
    pub region_server: Vec<usize>,
    pub server_regions: Vec<Vec<usize>>,
}

impl WorkingAssignment {
    pub fn from_snapshot(snapshot: &ClusterSnapshot) -> Self {
        Self {
            region_server: snapshot.region_server.clone(),
            server_regions: snapshot.server_regions.clone(),
        }
    }

    pub fn apply_move(&mut self, region: usize, from: usize, to: usize) {
        debug_assert_eq!(self.region_server[region], from);
        let slot = self.server_regions[from]
            .iter()
            .position(|&r| r == region)
            .expect("region absent from its server list");
        self.server_regions[from].swap_remove(slot);
        self.server_regions[to].push(region);
        self.region_server[region] = to;
    }
}

/// Ties the pieces together for one cluster: refresh the state source, build
/// a group-constrained snapshot, run the optimizer, emit the plan. Taking
/// `&mut self` makes concurrent rounds on one cluster unrepresentable.
pub struct Balancer<T: ClusterSource, S: GroupStore> {
    source: Arc<T>,
    groups: Arc<RsGroupManager<S>>,
    config: BalancerConfig,
}

impl<T: ClusterSource, S: GroupStore> Balancer<T, S> {
    pub fn new(source: Arc<T>, groups: Arc<RsGroupManager<S>>, config: BalancerConfig) -> Self {
        Self {
            source,
            groups,
            config,
        }
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    pub async fn balance_cluster(
        &mut self,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<BalanceOutcome> {
        self.config.validate()?;
        let started = Instant::now();

        self.source.refresh_all().await?;
        let view = self.groups.membership_view().await;
        let snapshot =
            ClusterSnapshot::build(self.source.regions(), self.source.servers(), &view)?;

        let mut functions = cost::build_cost_functions(&self.config);
        let outcome = optimizer::optimize(
            &snapshot,
            &mut functions,
            &self.config,
            cancel.as_deref(),
        )?;

        metrics::BALANCE_ROUND_TOTAL.inc();
        metrics::BALANCE_ROUND_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        metrics::BALANCE_ALREADY_BALANCED_INFO.set(outcome.plan.is_empty() as i64);
        info!(
            initial_cost = outcome.initial_cost,
            best_cost = outcome.best_cost,
            moves = outcome.plan.len(),
            "balancing round finished"
        );
        Ok(outcome)
    }
}
