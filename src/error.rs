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

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument {0}")]
    InvalidArgument(String),

    #[error("invalid configuration {0}")]
    InvalidConfiguration(String),

    #[error("snapshot inconsistency: {0}")]
    SnapshotInconsistency(String),

    #[error("group {0} already exists")]
    DuplicateGroup(String),

    #[error("group {0} not found")]
    GroupNotFound(String),

    #[error("group {0} not empty")]
    GroupNotEmpty(String),

    #[error("group store unavailable: {0}")]
    GroupStoreUnavailable(String),

    #[error("io {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a retry against the group store may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::GroupStoreUnavailable(_) | Error::Io(_))
    }
}
