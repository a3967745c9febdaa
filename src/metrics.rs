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

use lazy_static::lazy_static;
use prometheus::*;

// balancing rounds.
lazy_static! {
    pub static ref BALANCE_ROUND_TOTAL: IntCounter = register_int_counter!(
        "balancer_round_total",
        "the count of finished balancing rounds"
    )
    .unwrap();
    pub static ref BALANCE_ROUND_DURATION_SECONDS: Histogram = register_histogram!(
        "balancer_round_duration_seconds",
        "the duration of one balancing round",
        exponential_buckets(0.001, 1.8, 22).unwrap(),
    )
    .unwrap();
    pub static ref BALANCE_ALREADY_BALANCED_INFO: IntGauge = register_int_gauge!(
        "balancer_already_balanced_info",
        "whether the last round found nothing worth moving"
    )
    .unwrap();
}

// optimizer steps.
lazy_static! {
    pub static ref BALANCE_STEP_ACCEPT_TOTAL: IntCounter = register_int_counter!(
        "balancer_step_accept_total",
        "the count of accepted candidate moves"
    )
    .unwrap();
    pub static ref BALANCE_STEP_REJECT_TOTAL: IntCounter = register_int_counter!(
        "balancer_step_reject_total",
        "the count of rejected candidate moves"
    )
    .unwrap();
}

// group store.
lazy_static! {
    pub static ref GROUP_STORE_RETRY_TOTAL: IntCounter = register_int_counter!(
        "balancer_group_store_retry_total",
        "the count of retried group store operations"
    )
    .unwrap();
    pub static ref GROUP_MANAGER_ONLINE_INFO: IntGauge = register_int_gauge!(
        "balancer_group_manager_online_info",
        "whether the group manager has a live connection to its store"
    )
    .unwrap();
}
