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

use std::sync::{Arc, Mutex};

use crate::{
    snapshot::{RegionDesc, ServerDesc},
    Result,
};

/// Read interface over live cluster state. The balancer calls `refresh_all`
/// once at the start of a round and treats the accessors as a point-in-time
/// snapshot source.
#[async_trait::async_trait]
pub trait ClusterSource: Send + Sync {
    async fn refresh_all(&self) -> Result<()>;

    fn regions(&self) -> Vec<RegionDesc>;

    fn servers(&self) -> Vec<ServerDesc>;
}

/// A `ClusterSource` backed by settable in-memory state. Used by tests and by
/// embedders that already collect cluster state elsewhere.
#[derive(Clone, Default)]
pub struct StaticClusterSource {
    regions: Arc<Mutex<Vec<RegionDesc>>>,
    servers: Arc<Mutex<Vec<ServerDesc>>>,
}

impl StaticClusterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_regions(&self, rs: Vec<RegionDesc>) {
        let mut regions = self.regions.lock().unwrap();
        let _ = std::mem::replace(&mut *regions, rs);
    }

    pub fn set_servers(&self, ss: Vec<ServerDesc>) {
        let mut servers = self.servers.lock().unwrap();
        let _ = std::mem::replace(&mut *servers, ss);
    }
}

#[async_trait::async_trait]
impl ClusterSource for StaticClusterSource {
    async fn refresh_all(&self) -> Result<()> {
        Ok(())
    }

    fn regions(&self) -> Vec<RegionDesc> {
        self.regions.lock().unwrap().clone()
    }

    fn servers(&self) -> Vec<ServerDesc> {
        self.servers.lock().unwrap().clone()
    }
}
