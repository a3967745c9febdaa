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

//! Cost-function-driven stochastic region balancer for a distributed storage
//! cluster, with region-server-group (RSGroup) placement constraints.
//!
//! The balancer decides which server should own which region; executing the
//! moves, routing requests, and detecting dead servers belong to the caller.

mod error;
pub use error::{Error, Result};

mod config;
pub use config::{BalancerConfig, CostFunctionConfig, COST_FUNCTION_NAMES};

pub mod metrics;

mod source;
pub use source::{ClusterSource, StaticClusterSource};

mod snapshot;
pub use snapshot::{ClusterSnapshot, RegionDesc, ServerDesc};

pub mod rsgroup;
pub use rsgroup::{GroupStore, MemGroupStore, RsGroupManager, DEFAULT_GROUP};

pub mod balancer;
pub use balancer::{BalanceOutcome, Balancer, RegionMove, StopReason};
