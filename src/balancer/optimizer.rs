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
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use rand::thread_rng;
use tracing::{debug, info, trace};

use super::{
    candidate::{Candidate, CandidateGenerator},
    cost::CostFunction,
    BalanceOutcome, RegionMove, StopReason, WorkingAssignment,
};
use crate::{config::BalancerConfig, metrics, snapshot::ClusterSnapshot, Result};

const COST_EPSILON: f64 = 1e-12;

/// Hill-climbing search over the working assignment: propose a candidate,
/// apply it, keep it only when the weighted total cost strictly drops. The
/// best assignment seen is tracked separately and emitted as the plan, so
/// partial progress survives budget exhaustion and cancellation.
pub fn optimize(
    snapshot: &ClusterSnapshot,
    functions: &mut [Box<dyn CostFunction>],
    config: &BalancerConfig,
    cancel: Option<&AtomicBool>,
) -> Result<BalanceOutcome> {
    let mut assignment = WorkingAssignment::from_snapshot(snapshot);

    let needed: Vec<bool> = functions.iter().map(|f| f.is_needed(snapshot)).collect();
    for (f, n) in functions.iter_mut().zip(&needed) {
        if *n {
            f.prepare(snapshot, &assignment)?;
        }
    }

    let initial_cost = total_cost(functions, &needed);
    let mut current_cost = initial_cost;
    let mut best = assignment.region_server.clone();
    let mut best_cost = current_cost;

    let max_steps = config
        .max_steps
        .min(config.steps_per_region.saturating_mul(snapshot.num_regions as u64));
    let deadline = Instant::now() + config.max_run_time();
    let generator = CandidateGenerator::new();
    let mut rng = thread_rng();

    let mut stop = StopReason::BudgetExhausted;
    let mut steps = 0u64;
    let mut accepted = 0u64;

    if best_cost <= config.converged_cost + COST_EPSILON {
        stop = StopReason::Converged;
    }

    debug!(
        regions = snapshot.num_regions,
        servers = snapshot.num_servers,
        max_steps,
        initial_cost,
        "optimizer run starting"
    );

    while steps < max_steps && !matches!(stop, StopReason::Converged) {
        // budget and cancellation are honored between steps, never mid-step.
        if cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false) {
            break;
        }
        if Instant::now() >= deadline {
            break;
        }
        steps += 1;

        let Some(candidate) = generator.next(snapshot, &assignment, &mut rng) else {
            continue;
        };
        apply(&mut assignment, functions, &needed, snapshot, candidate, false);
        let new_cost = total_cost(functions, &needed);
        if new_cost + COST_EPSILON < current_cost {
            current_cost = new_cost;
            metrics::BALANCE_STEP_ACCEPT_TOTAL.inc();
            accepted += 1;
            trace!(steps, new_cost, ?candidate, "candidate accepted");
            if current_cost < best_cost {
                best_cost = current_cost;
                best.copy_from_slice(&assignment.region_server);
            }
            if best_cost <= config.converged_cost + COST_EPSILON {
                stop = StopReason::Converged;
                break;
            }
        } else {
            apply(&mut assignment, functions, &needed, snapshot, candidate, true);
            metrics::BALANCE_STEP_REJECT_TOTAL.inc();
        }
    }

    // costs are in multiplier-weighted units while the threshold lives on
    // the normalized [0, 1] scale of a single function.
    let sum_multiplier: f64 = functions
        .iter()
        .zip(&needed)
        .filter(|(_, n)| **n)
        .map(|(f, _)| f.multiplier())
        .sum();
    let improvement = if sum_multiplier > 0.0 {
        (initial_cost - best_cost) / sum_multiplier
    } else {
        0.0
    };
    let plan = if improvement > config.min_cost_need_balance {
        build_plan(snapshot, &best)
    } else {
        // not worth thrashing the cluster; still report placements of
        // regions that arrived unassigned.
        build_plan(snapshot, &snapshot.region_server)
    };

    info!(
        steps,
        accepted,
        initial_cost,
        best_cost,
        moves = plan.len(),
        stop = ?stop,
        "optimizer run finished"
    );

    Ok(BalanceOutcome {
        plan,
        initial_cost,
        best_cost,
        stop,
        steps,
        accepted,
    })
}

fn total_cost(functions: &[Box<dyn CostFunction>], needed: &[bool]) -> f64 {
    functions
        .iter()
        .zip(needed)
        .filter(|(_, n)| **n)
        .map(|(f, _)| f.multiplier() * f.cost())
        .sum()
}

fn apply(
    assignment: &mut WorkingAssignment,
    functions: &mut [Box<dyn CostFunction>],
    needed: &[bool],
    snapshot: &ClusterSnapshot,
    candidate: Candidate,
    invert: bool,
) {
    let mut moves: [Option<(usize, usize, usize)>; 2] = [None, None];
    match candidate {
        Candidate::Move { region, from, to } => {
            moves[0] = Some((region, from, to));
        }
        Candidate::Swap {
            region_a,
            server_a,
            region_b,
            server_b,
        } => {
            moves[0] = Some((region_a, server_a, server_b));
            moves[1] = Some((region_b, server_b, server_a));
        }
    }
    for m in moves.into_iter().flatten() {
        let (region, mut from, mut to) = m;
        if invert {
            std::mem::swap(&mut from, &mut to);
        }
        assignment.apply_move(region, from, to);
        for (f, n) in functions.iter_mut().zip(needed) {
            if *n {
                f.region_moved(snapshot, region, from, to);
            }
        }
    }
}

/// Diffs the chosen assignment against the snapshot's input assignment.
/// Moves draining the most loaded origin servers come first so capacity is
/// freed before it is consumed; regions that arrived unassigned are reported
/// with no origin and ordered last.
fn build_plan(snapshot: &ClusterSnapshot, chosen: &[usize]) -> Vec<RegionMove> {
    let initial: HashSet<usize> = snapshot.initial_placements.iter().copied().collect();
    // (origin load, move); first placements carry load 0 and sort last.
    let mut moves: Vec<(usize, RegionMove)> = Vec::new();
    for r in 0..snapshot.num_regions {
        let origin = snapshot.region_server[r];
        let dest = chosen[r];
        if initial.contains(&r) {
            moves.push((
                0,
                RegionMove {
                    region: snapshot.regions[r].id,
                    from: None,
                    to: snapshot.servers[dest].id,
                },
            ));
        } else if dest != origin {
            moves.push((
                snapshot.server_regions[origin].len(),
                RegionMove {
                    region: snapshot.regions[r].id,
                    from: Some(snapshot.servers[origin].id),
                    to: snapshot.servers[dest].id,
                },
            ));
        }
    }
    moves.sort_by_key(|(load, _)| std::cmp::Reverse(*load));
    moves.into_iter().map(|(_, m)| m).collect()
}
