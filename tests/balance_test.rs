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

use std::{collections::HashMap, sync::Arc};

use region_balancer::{
    BalancerConfig, Balancer, ClusterSource, MemGroupStore, RegionDesc, RsGroupManager,
    ServerDesc, StaticClusterSource,
};

#[ctor::ctor]
fn init() {
    tracing_subscriber::fmt::init();
}

fn region(id: u64, table: u64, server: u64) -> RegionDesc {
    RegionDesc {
        id,
        table,
        start_key: id.to_be_bytes().to_vec(),
        end_key: vec![],
        replica_index: 0,
        current_server: Some(server),
    }
}

fn server(id: u64, rack: &str) -> ServerDesc {
    ServerDesc {
        id,
        addr: format!("10.0.0.{id}:21000"),
        rack: rack.to_owned(),
    }
}

async fn online_manager() -> Arc<RsGroupManager<MemGroupStore>> {
    let manager = Arc::new(RsGroupManager::new(MemGroupStore::new()));
    manager.refresh().await.unwrap();
    manager
}

fn final_counts(
    source: &StaticClusterSource,
    plan: &[region_balancer::RegionMove],
) -> HashMap<u64, usize> {
    let mut placement: HashMap<u64, u64> = source
        .regions()
        .iter()
        .filter_map(|r| r.current_server.map(|s| (r.id, s)))
        .collect();
    for m in plan {
        placement.insert(m.region, m.to);
    }
    let mut counts = HashMap::new();
    for s in placement.values() {
        *counts.entry(*s).or_default() += 1;
    }
    counts
}

#[tokio::test]
async fn skewed_cluster_converges() {
    let source = Arc::new(StaticClusterSource::new());
    source.set_servers(vec![server(1, "r1"), server(2, "r1"), server(3, "r1")]);
    source.set_regions((1..=12).map(|id| region(id, 1, 1)).collect());

    let mut config = BalancerConfig::default();
    config
        .apply_option("balancer.minCostNeedBalance", "0.01")
        .unwrap();
    let mut balancer = Balancer::new(source.clone(), online_manager().await, config);

    let outcome = balancer.balance_cluster(None).await.unwrap();
    assert!(!outcome.plan.is_empty());
    assert!(outcome.best_cost <= outcome.initial_cost);

    let counts = final_counts(&source, &outcome.plan);
    assert_eq!(counts.get(&1), Some(&4));
    assert_eq!(counts.get(&2), Some(&4));
    assert_eq!(counts.get(&3), Some(&4));
}

#[tokio::test]
async fn pinned_table_never_leaves_its_group() {
    let manager = online_manager().await;
    manager.add_group("g1").await.unwrap();
    manager.add_group("g2").await.unwrap();
    manager.move_servers(&[1], "default", "g1").await.unwrap();
    manager.move_servers(&[2, 3], "default", "g2").await.unwrap();
    manager.move_tables(&[9], "g1").await.unwrap();

    let source = Arc::new(StaticClusterSource::new());
    source.set_servers(vec![server(1, "r1"), server(2, "r1"), server(3, "r1")]);
    // all of table 9 sits on the single g1 server; skew alone would spread
    // it to servers 2 and 3, but those belong to g2.
    source.set_regions((1..=9).map(|id| region(id, 9, 1)).collect());

    let mut config = BalancerConfig::default();
    config
        .apply_option("balancer.minCostNeedBalance", "0.0")
        .unwrap();
    let mut balancer = Balancer::new(source.clone(), manager, config);

    let outcome = balancer.balance_cluster(None).await.unwrap();
    assert!(outcome.plan.is_empty());
}

#[tokio::test]
async fn two_group_cluster_balances_within_groups() {
    let manager = online_manager().await;
    manager.add_group("g1").await.unwrap();
    manager.move_servers(&[1, 2], "default", "g1").await.unwrap();
    manager.move_tables(&[9], "g1").await.unwrap();

    let source = Arc::new(StaticClusterSource::new());
    source.set_servers(vec![
        server(1, "r1"),
        server(2, "r2"),
        server(3, "r1"),
        server(4, "r2"),
    ]);
    let mut regions: Vec<_> = (1..=8).map(|id| region(id, 9, 1)).collect();
    regions.extend((9..=16).map(|id| region(id, 5, 3)));
    source.set_regions(regions);

    let mut config = BalancerConfig::default();
    config
        .apply_option("balancer.minCostNeedBalance", "0.01")
        .unwrap();
    let mut balancer = Balancer::new(source.clone(), manager, config);
    let outcome = balancer.balance_cluster(None).await.unwrap();

    // table 9 spreads over g1 = {1, 2}, table 5 over default = {3, 4}.
    for m in &outcome.plan {
        if m.region <= 8 {
            assert!(m.to == 1 || m.to == 2);
        } else {
            assert!(m.to == 3 || m.to == 4);
        }
    }
    let counts = final_counts(&source, &outcome.plan);
    assert_eq!(counts.get(&1), Some(&4));
    assert_eq!(counts.get(&2), Some(&4));
    assert_eq!(counts.get(&3), Some(&4));
    assert_eq!(counts.get(&4), Some(&4));
}

#[tokio::test]
async fn offline_group_manager_degrades_to_default() {
    let store = MemGroupStore::new();
    let manager = Arc::new(RsGroupManager::new(store.clone()));
    manager.refresh().await.unwrap();
    manager.add_group("g1").await.unwrap();
    manager.move_servers(&[1], "default", "g1").await.unwrap();
    manager.move_tables(&[9], "g1").await.unwrap();

    // a dead store flips the manager offline on the next failed mutation;
    // balancing then treats everything as one big default group.
    store.fail_next_ops(u32::MAX);
    let _ = manager.add_group("g2").await.unwrap_err();
    assert!(!manager.is_online());

    let source = Arc::new(StaticClusterSource::new());
    source.set_servers(vec![server(1, "r1"), server(2, "r1")]);
    source.set_regions((1..=8).map(|id| region(id, 9, 1)).collect());

    let mut config = BalancerConfig::default();
    config
        .apply_option("balancer.minCostNeedBalance", "0.01")
        .unwrap();
    let mut balancer = Balancer::new(source.clone(), manager, config);
    let outcome = balancer.balance_cluster(None).await.unwrap();

    // without the pin, skew pulls half of table 9 onto server 2.
    let counts = final_counts(&source, &outcome.plan);
    assert_eq!(counts.get(&1), Some(&4));
    assert_eq!(counts.get(&2), Some(&4));
}

#[tokio::test]
async fn inconsistent_snapshot_aborts_round() {
    let manager = online_manager().await;
    manager.add_group("g1").await.unwrap();
    manager.move_servers(&[1], "default", "g1").await.unwrap();
    manager.move_tables(&[9], "g1").await.unwrap();

    let source = Arc::new(StaticClusterSource::new());
    source.set_servers(vec![server(1, "r1"), server(2, "r1")]);
    // table 9 belongs to g1 but one region sits on the default-group
    // server 2: an upstream bug that must be reported, not repaired.
    source.set_regions(vec![region(1, 9, 1), region(2, 9, 2)]);

    let mut balancer = Balancer::new(source, manager, BalancerConfig::default());
    let err = balancer.balance_cluster(None).await.unwrap_err();
    assert!(matches!(err, region_balancer::Error::SnapshotInconsistency(_)));
}

#[tokio::test]
async fn invalid_configuration_fails_before_running() {
    let source = Arc::new(StaticClusterSource::new());
    source.set_servers(vec![server(1, "r1")]);
    let mut config = BalancerConfig::default();
    config.max_steps = 0;
    let mut balancer = Balancer::new(source, online_manager().await, config);
    let err = balancer.balance_cluster(None).await.unwrap_err();
    assert!(matches!(
        err,
        region_balancer::Error::InvalidConfiguration(_)
    ));
}

#[tokio::test]
async fn replicas_never_share_a_server() {
    let source = Arc::new(StaticClusterSource::new());
    source.set_servers((1..=4).map(|id| server(id, "r1")).collect());
    // 6 ranges x 2 replicas, everything piled onto servers 1 and 2.
    let mut regions = Vec::new();
    let mut id = 0;
    for range in 0..6u8 {
        for replica in 0..2u32 {
            id += 1;
            regions.push(RegionDesc {
                id,
                table: 1,
                start_key: vec![range],
                end_key: vec![range + 1],
                replica_index: replica,
                current_server: Some(1 + replica as u64),
            });
        }
    }
    source.set_regions(regions);

    let mut config = BalancerConfig::default();
    config
        .apply_option("balancer.minCostNeedBalance", "0.01")
        .unwrap();
    let mut balancer = Balancer::new(source.clone(), online_manager().await, config);
    let outcome = balancer.balance_cluster(None).await.unwrap();
    assert!(!outcome.plan.is_empty());

    // replay the plan and verify no pair of replicas shares a server.
    let mut placement: HashMap<u64, u64> = source
        .regions()
        .iter()
        .map(|r| (r.id, r.current_server.unwrap()))
        .collect();
    for m in &outcome.plan {
        placement.insert(m.region, m.to);
    }
    for r in source.regions() {
        for other in source.regions() {
            if r.id < other.id && r.start_key == other.start_key {
                assert_ne!(
                    placement[&r.id], placement[&other.id],
                    "replicas of range {:?} colocated",
                    r.start_key
                );
            }
        }
    }
}
