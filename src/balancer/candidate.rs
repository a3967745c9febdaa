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

use rand::Rng;

use super::WorkingAssignment;
use crate::snapshot::ClusterSnapshot;

/// A proposed change to the working assignment. Illegal placements (wrong
/// group, replica colocation) are never generated, so the optimizer only ever
/// scores candidates it could accept.
#[derive(Clone, Copy, Debug)]
pub enum Candidate {
    Move {
        region: usize,
        from: usize,
        to: usize,
    },
    /// Exchanges one region each between two servers, keeping both servers'
    /// region counts unchanged. Useful for escaping local minima of
    /// skew-only objectives.
    Swap {
        region_a: usize,
        server_a: usize,
        region_b: usize,
        server_b: usize,
    },
}

const DRAW_ATTEMPTS: usize = 16;
// roughly one in three draws proposes a swap.
const SWAP_NUMERATOR: u32 = 1;
const SWAP_DENOMINATOR: u32 = 3;

#[derive(Default)]
pub struct CandidateGenerator {}

impl CandidateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(
        &self,
        snapshot: &ClusterSnapshot,
        assignment: &WorkingAssignment,
        rng: &mut impl Rng,
    ) -> Option<Candidate> {
        for _ in 0..DRAW_ATTEMPTS {
            let candidate = if rng.gen_ratio(SWAP_NUMERATOR, SWAP_DENOMINATOR) {
                self.try_swap(snapshot, assignment, rng)
            } else {
                self.try_move(snapshot, assignment, rng)
            };
            if candidate.is_some() {
                return candidate;
            }
        }
        None
    }

    fn try_move(
        &self,
        snapshot: &ClusterSnapshot,
        assignment: &WorkingAssignment,
        rng: &mut impl Rng,
    ) -> Option<Candidate> {
        let (region, from) = random_region(assignment, rng)?;
        let primary = snapshot.primary_of_region(region);
        let eligible: Vec<usize> = snapshot
            .eligible_servers(snapshot.table_of_region(region))
            .iter()
            .copied()
            .filter(|&s| s != from && !hosts_replica_of(snapshot, assignment, s, primary, None))
            .collect();
        if eligible.is_empty() {
            return None;
        }
        let to = eligible[rng.gen_range(0..eligible.len())];
        Some(Candidate::Move { region, from, to })
    }

    fn try_swap(
        &self,
        snapshot: &ClusterSnapshot,
        assignment: &WorkingAssignment,
        rng: &mut impl Rng,
    ) -> Option<Candidate> {
        let (region_a, server_a) = random_region(assignment, rng)?;
        let (region_b, server_b) = random_region(assignment, rng)?;
        if server_a == server_b || region_a == region_b {
            return None;
        }
        if !snapshot
            .eligible_servers(snapshot.table_of_region(region_a))
            .contains(&server_b)
        {
            return None;
        }
        if !snapshot
            .eligible_servers(snapshot.table_of_region(region_b))
            .contains(&server_a)
        {
            return None;
        }
        // the departing region no longer counts against its old server.
        let primary_a = snapshot.primary_of_region(region_a);
        let primary_b = snapshot.primary_of_region(region_b);
        if hosts_replica_of(snapshot, assignment, server_b, primary_a, Some(region_b)) {
            return None;
        }
        if hosts_replica_of(snapshot, assignment, server_a, primary_b, Some(region_a)) {
            return None;
        }
        Some(Candidate::Swap {
            region_a,
            server_a,
            region_b,
            server_b,
        })
    }
}

fn random_region(assignment: &WorkingAssignment, rng: &mut impl Rng) -> Option<(usize, usize)> {
    if assignment.region_server.is_empty() {
        return None;
    }
    // pick a non-empty server, then one of its regions, so busy servers are
    // probed without scanning the whole cluster.
    for _ in 0..DRAW_ATTEMPTS {
        let server = rng.gen_range(0..assignment.server_regions.len());
        let regions = &assignment.server_regions[server];
        if regions.is_empty() {
            continue;
        }
        let region = regions[rng.gen_range(0..regions.len())];
        return Some((region, server));
    }
    None
}

fn hosts_replica_of(
    snapshot: &ClusterSnapshot,
    assignment: &WorkingAssignment,
    server: usize,
    primary: usize,
    exclude: Option<usize>,
) -> bool {
    assignment.server_regions[server]
        .iter()
        .any(|&r| Some(r) != exclude && snapshot.primary_of_region(r) == primary)
}
