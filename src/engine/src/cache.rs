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

use moka::sync::Cache;
use uuid::Uuid;

use crate::partition::PartitionRef;

/// A bounded cache of loaded partitions.
///
/// Eviction drops the handles; the partition's indexer actors exit once the
/// last in-flight query releases them.
pub struct PartitionCache {
    cache: Cache<Uuid, PartitionRef>,
}

impl PartitionCache {
    pub fn new(capacity: usize) -> PartitionCache {
        PartitionCache {
            cache: Cache::builder()
                .name("partitions")
                .max_capacity(capacity as u64)
                .build(),
        }
    }

    /// Side-effect-free membership test, used to schedule hot candidates
    /// first.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.cache.contains_key(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<PartitionRef> {
        self.cache.get(id)
    }

    pub fn insert(&self, id: Uuid, partition: PartitionRef) {
        self.cache.insert(id, partition);
    }

    #[cfg(test)]
    fn flush_pending(&self) {
        self.cache.run_pending_tasks();
    }
}
