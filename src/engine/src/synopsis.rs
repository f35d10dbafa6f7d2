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

//! Per-column synopses for partition pruning.
//!
//! A synopsis is a small lossy summary of one column of one partition. Its
//! only contract is soundness: when `lookup` returns `false`, no row of the
//! column can match the probe. False positives are expected.

use std::collections::BTreeMap;
use std::mem::discriminant;

use datatypes::data_type::TypeKind;
use datatypes::{Data, RelOp, Type};
use fastbloom::BloomFilter;
use serde::{Deserialize, Serialize};

/// Default expected item count for bloom synopses, overridden by the
/// `"max-partition-size"` synopsis option.
const DEFAULT_EXPECTED_ITEMS: u64 = 1 << 20;
const BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

/// A bloom filter over string or address cells. Answers equality probes;
/// everything else is unprunable.
#[derive(Clone, Serialize, Deserialize)]
pub struct BloomSynopsis {
    filter: BloomFilter,
    /// Set when a cell could not be summarized; disables pruning.
    tainted: bool,
}

impl std::fmt::Debug for BloomSynopsis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomSynopsis")
            .field("tainted", &self.tainted)
            .finish_non_exhaustive()
    }
}

impl BloomSynopsis {
    fn new(expected_items: u64) -> BloomSynopsis {
        BloomSynopsis {
            filter: BloomFilter::with_false_pos(BLOOM_FALSE_POSITIVE_RATE)
                .expected_items(expected_items.max(1) as usize),
            tainted: false,
        }
    }

    fn add(&mut self, x: &Data) {
        match x {
            Data::None => {}
            Data::String(s) => {
                self.filter.insert(s.as_bytes());
            }
            Data::Address(a) => {
                self.filter.insert(&a.bytes()[..]);
            }
            _ => self.tainted = true,
        }
    }

    fn lookup(&self, op: RelOp, rhs: &Data) -> bool {
        if self.tainted {
            return true;
        }
        match (op, rhs) {
            (RelOp::Equal, Data::String(s)) => self.filter.contains(s.as_bytes()),
            (RelOp::Equal, Data::Address(a)) => self.filter.contains(&a.bytes()[..]),
            _ => true,
        }
    }
}

/// Running minimum and maximum over ordered scalar cells. Answers equality
/// and range probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxSynopsis {
    min: Option<Data>,
    max: Option<Data>,
    tainted: bool,
}

impl MinMaxSynopsis {
    fn new() -> MinMaxSynopsis {
        MinMaxSynopsis {
            min: None,
            max: None,
            tainted: false,
        }
    }

    fn add(&mut self, x: &Data) {
        if x.is_none() {
            return;
        }
        if let Some(min) = &self.min {
            if discriminant(min) != discriminant(x) {
                self.tainted = true;
                return;
            }
        }
        if self.min.as_ref().map(|m| x < m).unwrap_or(true) {
            self.min = Some(x.clone());
        }
        if self.max.as_ref().map(|m| x > m).unwrap_or(true) {
            self.max = Some(x.clone());
        }
    }

    fn lookup(&self, op: RelOp, rhs: &Data) -> bool {
        if self.tainted {
            return true;
        }
        let (Some(min), Some(max)) = (&self.min, &self.max) else {
            // No cell was ever added, so nothing can match.
            return false;
        };
        if discriminant(min) != discriminant(rhs) {
            return true;
        }
        match op {
            RelOp::Equal => min <= rhs && rhs <= max,
            RelOp::NotEqual => !(min == rhs && max == rhs),
            RelOp::Less => min < rhs,
            RelOp::LessEqual => min <= rhs,
            RelOp::Greater => max > rhs,
            RelOp::GreaterEqual => max >= rhs,
            _ => true,
        }
    }
}

/// The synopsis kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Synopsis {
    Bloom(BloomSynopsis),
    MinMax(MinMaxSynopsis),
}

impl Synopsis {
    /// Summarizes one cell.
    pub fn add(&mut self, x: &Data) {
        match self {
            Synopsis::Bloom(s) => s.add(x),
            Synopsis::MinMax(s) => s.add(x),
        }
    }

    /// Whether a row matching `op rhs` may exist. `false` is authoritative.
    pub fn lookup(&self, op: RelOp, rhs: &Data) -> bool {
        match self {
            Synopsis::Bloom(s) => s.lookup(op, rhs),
            Synopsis::MinMax(s) => s.lookup(op, rhs),
        }
    }
}

/// Constructs the synopsis for a column type, or `None` for types without a
/// summary representation.
pub fn make_synopsis(t: &Type, options: &BTreeMap<String, Data>) -> Option<Synopsis> {
    let expected = options
        .get("max-partition-size")
        .and_then(|d| d.as_u64())
        .unwrap_or(DEFAULT_EXPECTED_ITEMS);
    match t.unwrapped().kind() {
        TypeKind::String | TypeKind::Address => {
            Some(Synopsis::Bloom(BloomSynopsis::new(expected)))
        }
        TypeKind::Bool
        | TypeKind::Int64
        | TypeKind::UInt64
        | TypeKind::Double
        | TypeKind::Duration
        | TypeKind::Timestamp => Some(Synopsis::MinMax(MinMaxSynopsis::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BTreeMap<String, Data> {
        BTreeMap::from([("max-partition-size".to_string(), Data::UInt(1024))])
    }

    #[test]
    fn test_bloom_soundness() {
        let mut syn = make_synopsis(&Type::string(), &options()).unwrap();
        syn.add(&Data::from("foo"));
        syn.add(&Data::from("bar"));
        assert!(syn.lookup(RelOp::Equal, &Data::from("foo")));
        assert!(syn.lookup(RelOp::Equal, &Data::from("bar")));
        // Non-equality probes never prune.
        assert!(syn.lookup(RelOp::Ni, &Data::from("zzz")));

        let empty = make_synopsis(&Type::string(), &options()).unwrap();
        assert!(!empty.lookup(RelOp::Equal, &Data::from("foo")));
    }

    #[test]
    fn test_minmax_range() {
        let mut syn = make_synopsis(&Type::timestamp(), &options()).unwrap();
        for ts in [100i64, 200, 150] {
            syn.add(&Data::Timestamp(ts));
        }
        assert!(syn.lookup(RelOp::Equal, &Data::Timestamp(150)));
        assert!(!syn.lookup(RelOp::Equal, &Data::Timestamp(99)));
        assert!(!syn.lookup(RelOp::Greater, &Data::Timestamp(200)));
        assert!(syn.lookup(RelOp::GreaterEqual, &Data::Timestamp(200)));
        assert!(!syn.lookup(RelOp::Less, &Data::Timestamp(100)));
        assert!(syn.lookup(RelOp::LessEqual, &Data::Timestamp(100)));
    }

    #[test]
    fn test_minmax_empty_matches_nothing() {
        let syn = make_synopsis(&Type::uint64(), &options()).unwrap();
        assert!(!syn.lookup(RelOp::Equal, &Data::UInt(1)));
    }

    #[test]
    fn test_minmax_not_equal_prunes_constant_columns() {
        let mut syn = make_synopsis(&Type::uint64(), &options()).unwrap();
        syn.add(&Data::UInt(7));
        syn.add(&Data::UInt(7));
        assert!(!syn.lookup(RelOp::NotEqual, &Data::UInt(7)));
        assert!(syn.lookup(RelOp::NotEqual, &Data::UInt(8)));
    }

    #[test]
    fn test_mismatched_probe_type_never_prunes() {
        let mut syn = make_synopsis(&Type::uint64(), &options()).unwrap();
        syn.add(&Data::UInt(7));
        assert!(syn.lookup(RelOp::Equal, &Data::from("7")));
    }

    #[test]
    fn test_unsupported_types_have_no_synopsis() {
        assert!(make_synopsis(&Type::pattern(), &options()).is_none());
        assert!(make_synopsis(&Type::vector(Type::uint64()), &options()).is_none());
    }
}
