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
    collections::{BTreeSet, HashMap},
    sync::atomic::{AtomicBool, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

mod store;
pub use store::{GroupStore, MemGroupStore};

use crate::{metrics, Error, Result};

/// The group that absorbs servers and tables without explicit membership.
/// Its member sets stay empty in the persisted record; membership in it is
/// what remains after every explicit group is accounted for.
pub const DEFAULT_GROUP: &str = "default";

/// A named partition of the server fleet and of the set of tables, enforcing
/// hard multi-tenant placement isolation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsGroupInfo {
    pub name: String,
    pub servers: BTreeSet<u64>,
    pub tables: BTreeSet<u64>,
}

impl RsGroupInfo {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }
}

/// Server-group and table-group membership as the snapshot builder consumes
/// it. Servers and tables absent from the maps resolve to the default group.
#[derive(Clone, Debug, Default)]
pub struct GroupView {
    pub server_group: HashMap<u64, String>,
    pub table_group: HashMap<u64, String>,
}

/// Owns the server→group and table→group mappings and persists them through
/// a `GroupStore`. All mutations run under one async mutex (single-writer
/// discipline) and commit to memory only after the store accepted the new
/// record, so a failed save leaves the previous mappings intact.
pub struct RsGroupManager<S: GroupStore> {
    store: S,
    groups: Mutex<HashMap<String, RsGroupInfo>>,
    online: AtomicBool,
}

impl<S: GroupStore> RsGroupManager<S> {
    /// Starts offline; call `refresh` to load the record and come online.
    pub fn new(store: S) -> Self {
        Self {
            store,
            groups: Mutex::new(initial_groups()),
            online: AtomicBool::new(false),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Reloads all mappings from the persistent store. Recovers the manager
    /// after external mutation or a store-availability gap.
    pub async fn refresh(&self) -> Result<()> {
        let mut groups = self.groups.lock().await;
        let payload = match store::with_retry(|| self.store.load()).await {
            Ok(p) => p,
            Err(e) => {
                self.set_online(false);
                return Err(e);
            }
        };
        let mut loaded = match payload {
            Some(bytes) => match decode_record(&bytes) {
                Ok(groups) => groups,
                // a stale cache must not pose as live membership.
                Err(e) => {
                    self.set_online(false);
                    warn!(error = %e, "group record unreadable, manager going offline");
                    return Err(e);
                }
            },
            None => initial_groups(),
        };
        loaded
            .entry(DEFAULT_GROUP.to_owned())
            .or_insert_with(|| RsGroupInfo::named(DEFAULT_GROUP));
        *groups = loaded;
        self.set_online(true);
        info!(groups = groups.len(), "group membership refreshed");
        Ok(())
    }

    pub async fn add_group(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("empty group name".into()));
        }
        let mut groups = self.groups.lock().await;
        self.check_online()?;
        if groups.contains_key(name) {
            return Err(Error::DuplicateGroup(name.to_owned()));
        }
        let mut next = groups.clone();
        next.insert(name.to_owned(), RsGroupInfo::named(name));
        self.persist(&next).await?;
        *groups = next;
        info!(group = name, "group added");
        Ok(())
    }

    pub async fn remove_group(&self, name: &str) -> Result<()> {
        if name == DEFAULT_GROUP {
            return Err(Error::InvalidArgument(
                "the default group is not removable".into(),
            ));
        }
        let mut groups = self.groups.lock().await;
        self.check_online()?;
        let info = groups
            .get(name)
            .ok_or_else(|| Error::GroupNotFound(name.to_owned()))?;
        if !info.servers.is_empty() || !info.tables.is_empty() {
            return Err(Error::GroupNotEmpty(name.to_owned()));
        }
        let mut next = groups.clone();
        next.remove(name);
        self.persist(&next).await?;
        *groups = next;
        info!(group = name, "group removed");
        Ok(())
    }

    /// Moves the subset of `servers` that are confirmed members of `from`
    /// into `to` and returns that subset. Servers in neither group are
    /// skipped, not an error.
    pub async fn move_servers(&self, servers: &[u64], from: &str, to: &str) -> Result<Vec<u64>> {
        if from == to {
            return Err(Error::InvalidArgument(
                "source and destination group are the same".into(),
            ));
        }
        let mut groups = self.groups.lock().await;
        self.check_online()?;
        if !groups.contains_key(from) {
            return Err(Error::GroupNotFound(from.to_owned()));
        }
        if !groups.contains_key(to) {
            return Err(Error::GroupNotFound(to.to_owned()));
        }

        let confirmed: Vec<u64> = servers
            .iter()
            .copied()
            .filter(|s| group_of_server_in(&groups, *s) == from)
            .collect();
        if confirmed.is_empty() {
            return Ok(confirmed);
        }

        let mut next = groups.clone();
        for s in &confirmed {
            if let Some(g) = next.get_mut(from) {
                g.servers.remove(s);
            }
            if to != DEFAULT_GROUP {
                next.get_mut(to).unwrap().servers.insert(*s);
            }
        }
        self.persist(&next).await?;
        *groups = next;
        info!(moved = confirmed.len(), from, to, "servers moved");
        Ok(confirmed)
    }

    /// Rebinds the table→group mapping. Regions follow on the next
    /// balancing cycle; this does not move anything by itself.
    pub async fn move_tables(&self, tables: &[u64], to: &str) -> Result<()> {
        let mut groups = self.groups.lock().await;
        self.check_online()?;
        if !groups.contains_key(to) {
            return Err(Error::GroupNotFound(to.to_owned()));
        }
        let mut next = groups.clone();
        for g in next.values_mut() {
            for t in tables {
                g.tables.remove(t);
            }
        }
        if to != DEFAULT_GROUP {
            let dst = next.get_mut(to).unwrap();
            dst.tables.extend(tables.iter().copied());
        }
        self.persist(&next).await?;
        *groups = next;
        info!(tables = tables.len(), to, "tables moved");
        Ok(())
    }

    pub async fn group_of_server(&self, server: u64) -> String {
        if !self.is_online() {
            return DEFAULT_GROUP.to_owned();
        }
        let groups = self.groups.lock().await;
        group_of_server_in(&groups, server).to_owned()
    }

    pub async fn group_of_table(&self, table: u64) -> String {
        if !self.is_online() {
            return DEFAULT_GROUP.to_owned();
        }
        let groups = self.groups.lock().await;
        groups
            .values()
            .find(|g| g.tables.contains(&table))
            .map(|g| g.name.to_owned())
            .unwrap_or_else(|| DEFAULT_GROUP.to_owned())
    }

    pub async fn list_groups(&self) -> Vec<RsGroupInfo> {
        let groups = self.groups.lock().await;
        let mut all: Vec<_> = groups.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Membership view for snapshot construction. When the store connection
    /// is gone the cluster degrades to "balance everything together" rather
    /// than failing the round.
    pub async fn membership_view(&self) -> GroupView {
        if !self.is_online() {
            warn!("group manager offline, balancing with default-group semantics");
            return GroupView::default();
        }
        let groups = self.groups.lock().await;
        let mut view = GroupView::default();
        for g in groups.values() {
            if g.name == DEFAULT_GROUP {
                continue;
            }
            for s in &g.servers {
                view.server_group.insert(*s, g.name.to_owned());
            }
            for t in &g.tables {
                view.table_group.insert(*t, g.name.to_owned());
            }
        }
        view
    }

    async fn persist(&self, groups: &HashMap<String, RsGroupInfo>) -> Result<()> {
        let payload = encode_record(groups)?;
        match store::with_retry(|| self.store.save(&payload)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_online(false);
                warn!(error = %e, "group record save failed, manager going offline");
                Err(e)
            }
        }
    }

    fn check_online(&self) -> Result<()> {
        if !self.is_online() {
            return Err(Error::GroupStoreUnavailable(
                "group manager is offline".into(),
            ));
        }
        Ok(())
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        metrics::GROUP_MANAGER_ONLINE_INFO.set(online as i64);
    }
}

fn initial_groups() -> HashMap<String, RsGroupInfo> {
    HashMap::from([(DEFAULT_GROUP.to_owned(), RsGroupInfo::named(DEFAULT_GROUP))])
}

fn group_of_server_in<'a>(groups: &'a HashMap<String, RsGroupInfo>, server: u64) -> &'a str {
    groups
        .values()
        .find(|g| g.servers.contains(&server))
        .map(|g| g.name.as_str())
        .unwrap_or(DEFAULT_GROUP)
}

fn encode_record(groups: &HashMap<String, RsGroupInfo>) -> Result<Vec<u8>> {
    let mut all: Vec<_> = groups.values().collect();
    all.sort_by(|a, b| a.name.cmp(&b.name));
    serde_json::to_vec(&all).map_err(|e| Error::InvalidArgument(format!("group record: {e}")))
}

fn decode_record(bytes: &[u8]) -> Result<HashMap<String, RsGroupInfo>> {
    let all: Vec<RsGroupInfo> = serde_json::from_slice(bytes)
        .map_err(|e| Error::InvalidArgument(format!("group record: {e}")))?;
    Ok(all.into_iter().map(|g| (g.name.to_owned(), g)).collect())
}
