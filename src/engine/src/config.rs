// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configurations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default number of collector workers.
const DEFAULT_NUM_WORKERS: usize = 4;
/// Default mailbox bound of the dispatcher and its workers.
const DEFAULT_CHANNEL_SIZE: usize = 128;

/// Configuration for [Engine](crate::engine::Engine).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of rows after which the active partition is sealed
    /// (default 1Mi).
    pub max_partition_size: usize,
    /// Number of sealed partitions kept loaded in memory (default 10).
    pub in_mem_partitions: usize,
    /// Number of partitions scheduled immediately for the first response to
    /// a query (default 5).
    pub taste_partitions: usize,
    /// Number of collector workers (default 4).
    pub num_workers: usize,
    /// Mailbox bound for the dispatcher and worker channels (default 128).
    pub channel_size: usize,
    /// Whether `"time"` predicates match every timestamp column instead of
    /// only columns carrying a `"timestamp"` attribute (default true). The
    /// setting applies to pruning and execution alike.
    pub match_time_by_type: bool,
    /// Root directory for sealed partitions and the meta index image.
    pub data_home: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_partition_size: 1 << 20,
            in_mem_partitions: 10,
            taste_partitions: 5,
            num_workers: DEFAULT_NUM_WORKERS,
            channel_size: DEFAULT_CHANNEL_SIZE,
            match_time_by_type: true,
            data_home: PathBuf::from("./farsight-data"),
        }
    }
}

impl EngineConfig {
    /// Sanitize incorrect configurations.
    pub fn sanitize(&mut self) {
        if self.max_partition_size == 0 {
            warn!("Sanitize max partition size 0 to 1");
            self.max_partition_size = 1;
        }
        if self.in_mem_partitions == 0 {
            warn!("Sanitize in-memory partitions 0 to 1");
            self.in_mem_partitions = 1;
        }
        if self.taste_partitions == 0 {
            warn!("Sanitize taste partitions 0 to 1");
            self.taste_partitions = 1;
        }
        if self.num_workers == 0 {
            warn!("Sanitize worker count 0 to {}", DEFAULT_NUM_WORKERS);
            self.num_workers = DEFAULT_NUM_WORKERS;
        }
        if self.channel_size == 0 {
            warn!("Sanitize channel size 0 to 1");
            self.channel_size = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_clamps_zeroes() {
        let mut config = EngineConfig {
            max_partition_size: 0,
            in_mem_partitions: 0,
            taste_partitions: 0,
            num_workers: 0,
            channel_size: 0,
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(config.max_partition_size, 1);
        assert_eq!(config.in_mem_partitions, 1);
        assert_eq!(config.taste_partitions, 1);
        assert_eq!(config.num_workers, DEFAULT_NUM_WORKERS);
        assert_eq!(config.channel_size, 1);
    }
}
