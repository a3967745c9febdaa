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

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    rsgroup::{GroupView, DEFAULT_GROUP},
    Error, Result,
};

/// A contiguous partition of a table's keyspace, the unit of placement.
/// Replicas of the same range share `table`/`start_key`/`end_key` and differ
/// in `replica_index` (0 = primary).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDesc {
    pub id: u64,
    pub table: u64,
    /// Empty means unbounded on that side.
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub replica_index: u32,
    pub current_server: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDesc {
    pub id: u64,
    pub addr: String,
    pub rack: String,
}

/// Immutable per-round view of cluster topology and assignment. Regions,
/// servers, tables, racks and groups are referenced by dense indices into
/// flat arrays; the optimizer and the cost functions mutate only their own
/// working copies derived from these arrays.
#[derive(Debug)]
pub struct ClusterSnapshot {
    pub regions: Vec<RegionDesc>,
    pub servers: Vec<ServerDesc>,

    pub num_regions: usize,
    pub num_servers: usize,
    pub num_tables: usize,
    pub num_racks: usize,
    pub num_groups: usize,

    /// region index -> server index, total (unassigned input regions get an
    /// initial placement during construction).
    pub region_server: Vec<usize>,
    pub server_regions: Vec<Vec<usize>>,
    /// region index -> index of its primary replica (self for primaries).
    pub region_primary: Vec<usize>,
    pub region_table: Vec<usize>,
    pub server_rack: Vec<usize>,
    pub server_group: Vec<usize>,
    pub table_group: Vec<usize>,
    pub group_servers: Vec<Vec<usize>>,
    pub group_names: Vec<String>,

    pub has_region_replicas: bool,
    /// Regions that arrived unassigned and were placed at construction.
    pub initial_placements: Vec<usize>,
}

impl ClusterSnapshot {
    pub fn build(
        regions: Vec<RegionDesc>,
        servers: Vec<ServerDesc>,
        view: &GroupView,
    ) -> Result<Self> {
        let num_regions = regions.len();
        let num_servers = servers.len();
        if num_servers == 0 && num_regions > 0 {
            return Err(Error::SnapshotInconsistency(
                "regions present but no servers".into(),
            ));
        }

        let server_index: HashMap<u64, usize> =
            servers.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

        // Dense group indices. The default group is always index 0 so that
        // servers and tables with no explicit membership resolve to it.
        let mut group_names = vec![DEFAULT_GROUP.to_owned()];
        let explicit_groups: BTreeSet<&String> = view
            .server_group
            .values()
            .chain(view.table_group.values())
            .collect();
        for name in explicit_groups {
            if name != DEFAULT_GROUP {
                group_names.push(name.to_owned());
            }
        }
        let group_index: HashMap<&str, usize> = group_names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let num_groups = group_names.len();

        let server_group = servers
            .iter()
            .map(|s| {
                view.server_group
                    .get(&s.id)
                    .map(|n| group_index[n.as_str()])
                    .unwrap_or(0)
            })
            .collect::<Vec<_>>();
        let mut group_servers = vec![Vec::new(); num_groups];
        for (i, g) in server_group.iter().enumerate() {
            group_servers[*g].push(i);
        }

        let mut rack_index = HashMap::new();
        let server_rack = servers
            .iter()
            .map(|s| {
                let next = rack_index.len();
                *rack_index.entry(s.rack.as_str()).or_insert(next)
            })
            .collect::<Vec<_>>();
        let num_racks = rack_index.len();

        let mut table_index: HashMap<u64, usize> = HashMap::new();
        let region_table = regions
            .iter()
            .map(|r| {
                let next = table_index.len();
                *table_index.entry(r.table).or_insert(next)
            })
            .collect::<Vec<_>>();
        let num_tables = table_index.len();
        let mut table_group = vec![0; num_tables];
        for (table_id, t) in &table_index {
            if let Some(name) = view.table_group.get(table_id) {
                table_group[*t] = group_index[name.as_str()];
            }
        }

        // Replica families keyed by range; the replica with the lowest index
        // (0 when present) is the primary of its family.
        let mut family: HashMap<(u64, &[u8], &[u8]), usize> = HashMap::new();
        let mut region_primary = vec![0; num_regions];
        let mut has_region_replicas = false;
        for (i, r) in regions.iter().enumerate() {
            if r.replica_index > 0 {
                has_region_replicas = true;
            }
            let key = (r.table, r.start_key.as_slice(), r.end_key.as_slice());
            match family.get(&key) {
                Some(&p) => {
                    if r.replica_index < regions[p].replica_index {
                        family.insert(key, i);
                    }
                }
                None => {
                    family.insert(key, i);
                }
            }
        }
        for (i, r) in regions.iter().enumerate() {
            let key = (r.table, r.start_key.as_slice(), r.end_key.as_slice());
            region_primary[i] = family[&key];
        }

        // Current assignment; any region sitting on a server outside its
        // table's group signals a bug upstream and is reported, not fixed.
        let mut region_server = vec![usize::MAX; num_regions];
        let mut server_regions = vec![Vec::new(); num_servers];
        let mut unassigned = Vec::new();
        for (i, r) in regions.iter().enumerate() {
            match r.current_server {
                Some(sid) => {
                    let s = *server_index.get(&sid).ok_or_else(|| {
                        Error::SnapshotInconsistency(format!(
                            "region {} assigned to unknown server {sid}",
                            r.id
                        ))
                    })?;
                    let want = table_group[region_table[i]];
                    if server_group[s] != want {
                        return Err(Error::SnapshotInconsistency(format!(
                            "region {} of group {} assigned to server {sid} of group {}",
                            r.id, group_names[want], group_names[server_group[s]]
                        )));
                    }
                    region_server[i] = s;
                    server_regions[s].push(i);
                }
                None => unassigned.push(i),
            }
        }

        // Unassigned regions get a least-loaded placement within their
        // table's group so the working state is total from the start.
        let mut initial_placements = Vec::with_capacity(unassigned.len());
        for i in unassigned {
            let eligible = &group_servers[table_group[region_table[i]]];
            if eligible.is_empty() {
                return Err(Error::SnapshotInconsistency(format!(
                    "region {} belongs to group {} which has no servers",
                    regions[i].id,
                    group_names[table_group[region_table[i]]]
                )));
            }
            let primary = region_primary[i];
            let colocated = |s: usize| {
                server_regions[s]
                    .iter()
                    .any(|&r| region_primary[r] == primary)
            };
            let pick = eligible
                .iter()
                .filter(|&&s| !colocated(s))
                .min_by_key(|&&s| server_regions[s].len())
                .or_else(|| {
                    warn!(
                        region = regions[i].id,
                        "no replica-safe server available for initial placement"
                    );
                    eligible.iter().min_by_key(|&&s| server_regions[s].len())
                })
                .copied()
                .unwrap();
            region_server[i] = pick;
            server_regions[pick].push(i);
            initial_placements.push(i);
        }

        Ok(Self {
            num_regions,
            num_servers,
            num_tables,
            num_racks,
            num_groups,
            region_server,
            server_regions,
            region_primary,
            region_table,
            server_rack,
            server_group,
            table_group,
            group_servers,
            group_names,
            has_region_replicas,
            initial_placements,
            regions,
            servers,
        })
    }

    pub fn server_of_region(&self, region: usize) -> usize {
        self.region_server[region]
    }

    pub fn regions_of_server(&self, server: usize) -> &[usize] {
        &self.server_regions[server]
    }

    pub fn primary_of_region(&self, region: usize) -> usize {
        self.region_primary[region]
    }

    pub fn rack_of_server(&self, server: usize) -> usize {
        self.server_rack[server]
    }

    pub fn group_of_server(&self, server: usize) -> usize {
        self.server_group[server]
    }

    pub fn table_of_region(&self, region: usize) -> usize {
        self.region_table[region]
    }

    /// Servers a region of `table` may legally be placed on.
    pub fn eligible_servers(&self, table: usize) -> &[usize] {
        &self.group_servers[self.table_group[table]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: u64, rack: &str) -> ServerDesc {
        ServerDesc {
            id,
            addr: format!("127.0.0.1:2{id:04}"),
            rack: rack.to_owned(),
        }
    }

    fn region(id: u64, table: u64, start: &[u8], replica: u32, server: Option<u64>) -> RegionDesc {
        RegionDesc {
            id,
            table,
            start_key: start.to_vec(),
            end_key: if start.is_empty() { b"m".to_vec() } else { vec![] },
            replica_index: replica,
            current_server: server,
        }
    }

    #[test]
    fn builds_flat_indices() {
        let view = GroupView::default();
        let snapshot = ClusterSnapshot::build(
            vec![
                region(1, 7, b"", 0, Some(100)),
                region(2, 7, b"m", 0, Some(101)),
                region(3, 8, b"", 0, Some(100)),
            ],
            vec![server(100, "r1"), server(101, "r2")],
            &view,
        )
        .unwrap();

        assert_eq!(snapshot.num_regions, 3);
        assert_eq!(snapshot.num_servers, 2);
        assert_eq!(snapshot.num_tables, 2);
        assert_eq!(snapshot.num_racks, 2);
        assert_eq!(snapshot.server_of_region(0), 0);
        assert_eq!(snapshot.server_of_region(1), 1);
        assert_eq!(snapshot.regions_of_server(0), &[0, 2]);
        assert_eq!(snapshot.table_of_region(2), 1);
        assert!(!snapshot.has_region_replicas);
        // every region is its own primary without replicas.
        for r in 0..3 {
            assert_eq!(snapshot.primary_of_region(r), r);
        }
    }

    #[test]
    fn links_replicas_to_primary() {
        let view = GroupView::default();
        let snapshot = ClusterSnapshot::build(
            vec![
                region(1, 7, b"", 0, Some(100)),
                region(2, 7, b"", 1, Some(101)),
                region(3, 7, b"", 2, Some(102)),
            ],
            vec![server(100, "r1"), server(101, "r1"), server(102, "r1")],
            &view,
        )
        .unwrap();

        assert!(snapshot.has_region_replicas);
        assert_eq!(snapshot.primary_of_region(0), 0);
        assert_eq!(snapshot.primary_of_region(1), 0);
        assert_eq!(snapshot.primary_of_region(2), 0);
    }

    #[test]
    fn rejects_region_outside_table_group() {
        let mut view = GroupView::default();
        view.table_group.insert(7, "g1".to_owned());
        view.server_group.insert(100, "g1".to_owned());
        // server 101 stays in the default group.
        let err = ClusterSnapshot::build(
            vec![region(1, 7, b"", 0, Some(101))],
            vec![server(100, "r1"), server(101, "r1")],
            &view,
        )
        .unwrap_err();
        assert!(matches!(err, Error::SnapshotInconsistency(_)));
    }

    #[test]
    fn places_unassigned_regions_in_their_group() {
        let mut view = GroupView::default();
        view.table_group.insert(7, "g1".to_owned());
        view.server_group.insert(100, "g1".to_owned());
        view.server_group.insert(101, "g1".to_owned());
        let snapshot = ClusterSnapshot::build(
            vec![
                region(1, 7, b"", 0, Some(100)),
                region(2, 7, b"m", 0, None),
            ],
            vec![server(100, "r1"), server(101, "r1"), server(102, "r1")],
            &view,
        )
        .unwrap();

        assert_eq!(snapshot.initial_placements, vec![1]);
        // least-loaded eligible server, never the out-of-group server 102.
        assert_eq!(snapshot.server_of_region(1), 1);
    }

    #[test]
    fn rejects_group_without_servers() {
        let mut view = GroupView::default();
        view.table_group.insert(7, "g1".to_owned());
        let err = ClusterSnapshot::build(
            vec![region(1, 7, b"", 0, None)],
            vec![server(100, "r1")],
            &view,
        )
        .unwrap_err();
        assert!(matches!(err, Error::SnapshotInconsistency(_)));
    }
}
