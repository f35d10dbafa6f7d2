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

use datatypes::{Data, RelOp};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

use crate::bitmap::Bitmap;
use crate::bitmap_index::{Base, Binner, Coder, RangeIndex, SingletonCoder};
use crate::error::{Result, TypeClashSnafu, UnsupportedOperatorSnafu};

/// The scalar family an [ArithmeticIndex] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithKind {
    Bool,
    Int,
    UInt,
    Double,
    Duration,
    Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ArithCoder {
    Singleton(SingletonCoder),
    Ranged(RangeIndex),
}

impl ArithCoder {
    fn size(&self) -> u64 {
        match self {
            ArithCoder::Singleton(c) => c.size(),
            ArithCoder::Ranged(c) => c.size(),
        }
    }

    fn skip(&mut self, n: u64) {
        match self {
            ArithCoder::Singleton(c) => c.skip(n),
            ArithCoder::Ranged(c) => c.skip(n),
        }
    }

    fn append(&mut self, key: u64) {
        match self {
            ArithCoder::Singleton(c) => c.append(key),
            ArithCoder::Ranged(c) => c.append(key),
        }
    }

    fn lookup(&self, op: RelOp, key: u64) -> Result<Bitmap> {
        match self {
            ArithCoder::Singleton(c) => c.lookup(op, key),
            ArithCoder::Ranged(c) => c.lookup(op, key),
        }
    }
}

/// An index for booleans, integers, doubles, durations, and timestamps.
///
/// Values are binned (seconds for time types, whole numbers for doubles),
/// mapped to order-preserving `u64` keys, and handed to the coder: a single
/// bitmap for booleans, range-encoded digits for everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArithmeticIndex {
    kind: ArithKind,
    binner: Binner,
    coder: ArithCoder,
}

/// Maps a signed value to an unsigned key such that the order is preserved.
fn order_key(v: i64) -> u64 {
    (v as u64) ^ (1 << 63)
}

impl ArithmeticIndex {
    pub fn new(kind: ArithKind, base: Base) -> ArithmeticIndex {
        let (binner, coder) = match kind {
            ArithKind::Bool => (
                Binner::Identity,
                ArithCoder::Singleton(SingletonCoder::new()),
            ),
            ArithKind::Int | ArithKind::UInt => (
                Binner::Identity,
                ArithCoder::Ranged(RangeIndex::new_range(base)),
            ),
            ArithKind::Double => (
                Binner::Precision,
                ArithCoder::Ranged(RangeIndex::new_range(base)),
            ),
            ArithKind::Duration | ArithKind::Timestamp => (
                Binner::Decimal { power: 9 },
                ArithCoder::Ranged(RangeIndex::new_range(base)),
            ),
        };
        ArithmeticIndex {
            kind,
            binner,
            coder,
        }
    }

    fn key_of(&self, x: &Data) -> Option<u64> {
        match (self.kind, x) {
            (ArithKind::Bool, Data::Bool(v)) => Some(u64::from(*v)),
            (ArithKind::Int, Data::Int(v)) => Some(order_key(self.binner.bin_i64(*v))),
            (ArithKind::UInt, Data::UInt(v)) => Some(self.binner.bin_u64(*v)),
            (ArithKind::Double, Data::Double(v)) => {
                Some(order_key(self.binner.bin_f64(v.into_inner()) as i64))
            }
            (ArithKind::Duration, Data::Duration(v))
            | (ArithKind::Timestamp, Data::Timestamp(v)) => {
                Some(order_key(self.binner.bin_i64(*v)))
            }
            _ => None,
        }
    }

    pub fn append(&mut self, x: &Data, pos: u64) -> Result<()> {
        let key = self.key_of(x).with_context(|| TypeClashSnafu {
            value: x.to_string(),
        })?;
        self.coder.skip(pos - self.coder.size());
        self.coder.append(key);
        Ok(())
    }

    pub fn lookup(&self, op: RelOp, x: &Data) -> Result<Bitmap> {
        snafu::ensure!(
            !matches!(op, RelOp::In | RelOp::NotIn | RelOp::Ni | RelOp::NotNi),
            UnsupportedOperatorSnafu { op }
        );
        let key = self.key_of(x).with_context(|| TypeClashSnafu {
            value: x.to_string(),
        })?;
        self.coder.lookup(op, key)
    }
}

#[cfg(test)]
mod tests {
    use datatypes::value::OrderedFloat;

    use super::*;

    fn index(kind: ArithKind) -> ArithmeticIndex {
        ArithmeticIndex::new(kind, Base::default())
    }

    #[test]
    fn test_signed_ordering() {
        let mut idx = index(ArithKind::Int);
        let values = [-5i64, 0, 3, -1];
        for (i, v) in values.iter().enumerate() {
            idx.append(&Data::Int(*v), i as u64).unwrap();
        }
        let less = idx.lookup(RelOp::Less, &Data::Int(0)).unwrap();
        assert_eq!(less.to_vec(), [0, 3]);
        let ge = idx.lookup(RelOp::GreaterEqual, &Data::Int(-1)).unwrap();
        assert_eq!(ge.to_vec(), [1, 2, 3]);
        let eq = idx.lookup(RelOp::Equal, &Data::Int(-5)).unwrap();
        assert_eq!(eq.to_vec(), [0]);
    }

    #[test]
    fn test_bool_uses_singleton() {
        let mut idx = index(ArithKind::Bool);
        for (i, v) in [true, false, true].iter().enumerate() {
            idx.append(&Data::Bool(*v), i as u64).unwrap();
        }
        let t = idx.lookup(RelOp::Equal, &Data::Bool(true)).unwrap();
        assert_eq!(t.to_vec(), [0, 2]);
        let f = idx.lookup(RelOp::Equal, &Data::Bool(false)).unwrap();
        assert_eq!(f.to_vec(), [1]);
        assert!(idx.lookup(RelOp::Less, &Data::Bool(true)).is_err());
    }

    #[test]
    fn test_timestamp_bins_to_seconds() {
        let mut idx = index(ArithKind::Timestamp);
        let ns = 1_500_000_000i64;
        idx.append(&Data::Timestamp(ns), 0).unwrap();
        // Any timestamp in the same second matches equality.
        let eq = idx
            .lookup(RelOp::Equal, &Data::Timestamp(1_999_999_999))
            .unwrap();
        assert_eq!(eq.to_vec(), [0]);
        let miss = idx
            .lookup(RelOp::Equal, &Data::Timestamp(2_000_000_000))
            .unwrap();
        assert!(miss.all_zero());
    }

    #[test]
    fn test_double_drops_fraction() {
        let mut idx = index(ArithKind::Double);
        idx.append(&Data::Double(OrderedFloat(4.7)), 0).unwrap();
        idx.append(&Data::Double(OrderedFloat(-1.2)), 1).unwrap();
        let eq = idx
            .lookup(RelOp::Equal, &Data::Double(OrderedFloat(4.0)))
            .unwrap();
        assert_eq!(eq.to_vec(), [0]);
        let neg = idx
            .lookup(RelOp::Less, &Data::Double(OrderedFloat(0.0)))
            .unwrap();
        assert_eq!(neg.to_vec(), [1]);
    }

    #[test]
    fn test_type_clash() {
        let mut idx = index(ArithKind::UInt);
        assert!(idx.append(&Data::Int(1), 0).is_err());
        idx.append(&Data::UInt(1), 0).unwrap();
        assert!(idx.lookup(RelOp::Equal, &Data::from("1")).is_err());
    }
}
