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

//! Per-column value indexes.
//!
//! A [ValueIndex] wraps one concrete index kind together with two
//! bookkeeping bitmaps: `mask` marks every position at which an append
//! happened, `none` marks the positions appended as `Data::None`. Lookup
//! results never include `none` positions; querying them requires the
//! explicit `== nil` / `!= nil` forms.

pub mod address;
pub mod arithmetic;
pub mod port;
pub mod sequence;
pub mod string;
pub mod subnet;

use datatypes::data_type::TypeKind;
use datatypes::{Data, RelOp, Type};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::bitmap::Bitmap;
use crate::bitmap_index::Base;
use crate::error::{OutOfOrderAppendSnafu, Result, UnsupportedOperatorSnafu};
use crate::value_index::address::AddressIndex;
use crate::value_index::arithmetic::{ArithKind, ArithmeticIndex};
use crate::value_index::port::PortIndex;
use crate::value_index::sequence::SequenceIndex;
use crate::value_index::string::StringIndex;
use crate::value_index::subnet::SubnetIndex;

/// The concrete index kinds. See the sibling modules for per-kind lookup
/// rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexPayload {
    Arithmetic(ArithmeticIndex),
    String(StringIndex),
    Address(AddressIndex),
    Subnet(SubnetIndex),
    Port(PortIndex),
    Sequence(SequenceIndex),
}

impl IndexPayload {
    fn append(&mut self, x: &Data, pos: u64) -> Result<()> {
        match self {
            IndexPayload::Arithmetic(idx) => idx.append(x, pos),
            IndexPayload::String(idx) => idx.append(x, pos),
            IndexPayload::Address(idx) => idx.append(x, pos),
            IndexPayload::Subnet(idx) => idx.append(x, pos),
            IndexPayload::Port(idx) => idx.append(x, pos),
            IndexPayload::Sequence(idx) => idx.append(x, pos),
        }
    }

    fn lookup(&self, op: RelOp, x: &Data, offset: u64) -> Result<Bitmap> {
        match self {
            IndexPayload::Arithmetic(idx) => idx.lookup(op, x),
            IndexPayload::String(idx) => idx.lookup(op, x, offset),
            IndexPayload::Address(idx) => idx.lookup(op, x, offset),
            IndexPayload::Subnet(idx) => idx.lookup(op, x, offset),
            IndexPayload::Port(idx) => idx.lookup(op, x, offset),
            IndexPayload::Sequence(idx) => idx.lookup(op, x, offset),
        }
    }
}

/// An index over one typed column, mapping values to the row positions that
/// hold them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueIndex {
    mask: Bitmap,
    none: Bitmap,
    payload: IndexPayload,
}

impl ValueIndex {
    /// Constructs the index matching a column type, or `None` for types
    /// without an index representation (`pattern`, `enum`, `map`, `record`)
    /// and for malformed `"base"`/`"max_length"`/`"max_size"` attributes.
    /// Such columns fall back to full scans outside this crate.
    pub fn make(t: &Type) -> Option<ValueIndex> {
        let t = t.unwrapped();
        let payload = match t.kind() {
            TypeKind::Bool => {
                IndexPayload::Arithmetic(ArithmeticIndex::new(ArithKind::Bool, Base::default()))
            }
            TypeKind::Int64 => {
                IndexPayload::Arithmetic(ArithmeticIndex::new(ArithKind::Int, parse_base(t)?))
            }
            TypeKind::UInt64 => {
                IndexPayload::Arithmetic(ArithmeticIndex::new(ArithKind::UInt, parse_base(t)?))
            }
            TypeKind::Double => {
                IndexPayload::Arithmetic(ArithmeticIndex::new(ArithKind::Double, parse_base(t)?))
            }
            TypeKind::Duration => {
                IndexPayload::Arithmetic(ArithmeticIndex::new(ArithKind::Duration, parse_base(t)?))
            }
            TypeKind::Timestamp => IndexPayload::Arithmetic(ArithmeticIndex::new(
                ArithKind::Timestamp,
                parse_base(t)?,
            )),
            TypeKind::String => {
                IndexPayload::String(StringIndex::new(parse_size(t, "max_length", 1024)?))
            }
            TypeKind::Address => IndexPayload::Address(AddressIndex::new()),
            TypeKind::Subnet => IndexPayload::Subnet(SubnetIndex::new()),
            TypeKind::Port => IndexPayload::Port(PortIndex::new()),
            TypeKind::Vector(elem) | TypeKind::Set(elem) => {
                let max_size = parse_size(t, "max_size", 1024)?;
                IndexPayload::Sequence(SequenceIndex::new((**elem).clone(), max_size)?)
            }
            TypeKind::None
            | TypeKind::Pattern
            | TypeKind::Enumeration(_)
            | TypeKind::Map(..)
            | TypeKind::Record(_)
            | TypeKind::Alias(_) => return None,
        };
        Some(ValueIndex {
            mask: Bitmap::new(),
            none: Bitmap::new(),
            payload,
        })
    }

    /// The position of the next append.
    pub fn offset(&self) -> u64 {
        self.mask.size()
    }

    /// The positions holding a non-nil value.
    pub fn valid(&self) -> Bitmap {
        &self.mask - &self.none
    }

    /// Appends a value at `offset()`.
    pub fn append(&mut self, x: &Data) -> Result<()> {
        self.append_at(x, self.offset())
    }

    /// Appends a value at position `pos`, back-filling the gap with absent
    /// positions. Fails when `pos` lies before `offset()`.
    pub fn append_at(&mut self, x: &Data, pos: u64) -> Result<()> {
        let offset = self.mask.size();
        ensure!(pos >= offset, OutOfOrderAppendSnafu { pos, offset });
        if x.is_none() {
            self.none.append_bits(pos - self.none.size(), false);
            self.none.append_bit(true);
        } else {
            self.payload.append(x, pos)?;
        }
        self.mask.append_bits(pos - offset, false);
        self.mask.append_bit(true);
        Ok(())
    }

    /// Looks up the positions matching `op x`.
    ///
    /// `nil` on the right-hand side supports `==`/`!=` only. For every other
    /// value the result excludes `nil` positions and positions never
    /// appended to.
    pub fn lookup(&self, op: RelOp, x: &Data) -> Result<Bitmap> {
        if x.is_none() {
            return match op {
                RelOp::Equal => Ok(&self.none & &self.mask),
                RelOp::NotEqual => {
                    let mut none = self.none.clone();
                    none.extend_to(self.offset());
                    Ok(&none.flipped() & &self.mask)
                }
                _ => UnsupportedOperatorSnafu { op }.fail(),
            };
        }
        if !matches!(self.payload, IndexPayload::Sequence(_)) {
            match x {
                Data::Vector(xs) => return self.container_lookup(op, xs.iter()),
                Data::Set(xs) => return self.container_lookup(op, xs.iter()),
                _ => {}
            }
        }
        let mut result = self.payload.lookup(op, x, self.offset())?;
        result.extend_to(self.offset());
        Ok(&(&result - &self.none) & &self.mask)
    }

    /// `∈`/`∉` against a container folds equality over its elements.
    fn container_lookup<'a>(
        &self,
        op: RelOp,
        xs: impl Iterator<Item = &'a Data>,
    ) -> Result<Bitmap> {
        match op {
            RelOp::In => {
                let mut result = Bitmap::sized(self.offset(), false);
                for x in xs {
                    result |= &self.lookup(RelOp::Equal, x)?;
                    if result.all_one() {
                        break;
                    }
                }
                Ok(result)
            }
            RelOp::NotIn => {
                let mut result = &self.mask - &self.none;
                for x in xs {
                    result -= &self.lookup(RelOp::Equal, x)?;
                    if result.all_zero() {
                        break;
                    }
                }
                Ok(result)
            }
            _ => UnsupportedOperatorSnafu { op }.fail(),
        }
    }
}

fn parse_base(t: &Type) -> Option<Base> {
    match t.attr("base") {
        Some(attr) => Base::parse(attr.value.as_deref()?).ok(),
        None => Some(Base::default()),
    }
}

fn parse_size(t: &Type, key: &str, default: u64) -> Option<u64> {
    match t.attr(key) {
        Some(attr) => attr.value.as_deref()?.trim().parse().ok(),
        None => Some(default),
    }
}

#[cfg(test)]
mod tests {
    use datatypes::data_type::Attribute;
    use datatypes::Field;

    use super::*;

    #[test]
    fn test_factory_dispatch() {
        for ty in [
            Type::boolean(),
            Type::int64(),
            Type::uint64(),
            Type::double(),
            Type::duration(),
            Type::timestamp(),
            Type::string(),
            Type::address(),
            Type::subnet(),
            Type::port(),
            Type::vector(Type::uint64()),
            Type::set(Type::string()),
            Type::alias(Type::uint64()),
        ] {
            assert!(ValueIndex::make(&ty).is_some(), "no index for {ty}");
        }
        for ty in [
            Type::none(),
            Type::pattern(),
            Type::enumeration(vec!["a".into()]),
            Type::map(Type::string(), Type::uint64()),
            Type::record(vec![Field::new("x", Type::uint64())]),
            Type::vector(Type::pattern()),
        ] {
            assert!(ValueIndex::make(&ty).is_none(), "unexpected index for {ty}");
        }
    }

    #[test]
    fn test_factory_rejects_malformed_attributes() {
        let bad_base =
            Type::uint64().with_attrs(vec![Attribute::with_value("base", "not a base")]);
        assert!(ValueIndex::make(&bad_base).is_none());

        let bad_len =
            Type::string().with_attrs(vec![Attribute::with_value("max_length", "many")]);
        assert!(ValueIndex::make(&bad_len).is_none());

        let good_base =
            Type::uint64().with_attrs(vec![Attribute::with_value("base", "uniform(10, 5)")]);
        assert!(ValueIndex::make(&good_base).is_some());
    }

    #[test]
    fn test_append_lookup_roundtrip() {
        let mut idx = ValueIndex::make(&Type::uint64()).unwrap();
        let values = [7u64, 3, 7, 0];
        for v in values {
            idx.append(&Data::UInt(v)).unwrap();
        }
        assert_eq!(idx.offset(), 4);
        for (i, v) in values.iter().enumerate() {
            let eq = idx.lookup(RelOp::Equal, &Data::UInt(*v)).unwrap();
            assert!(eq.get(i as u64));
            let ne = idx.lookup(RelOp::NotEqual, &Data::UInt(*v)).unwrap();
            assert!(!ne.get(i as u64));
        }
    }

    #[test]
    fn test_none_positions_are_excluded() {
        let mut idx = ValueIndex::make(&Type::uint64()).unwrap();
        idx.append(&Data::UInt(1)).unwrap();
        idx.append(&Data::None).unwrap();
        idx.append(&Data::UInt(2)).unwrap();

        let ne = idx.lookup(RelOp::NotEqual, &Data::UInt(1)).unwrap();
        assert_eq!(ne.to_vec(), [2]);

        let is_nil = idx.lookup(RelOp::Equal, &Data::None).unwrap();
        assert_eq!(is_nil.to_vec(), [1]);
        let not_nil = idx.lookup(RelOp::NotEqual, &Data::None).unwrap();
        assert_eq!(not_nil.to_vec(), [0, 2]);
        assert!(idx.lookup(RelOp::Less, &Data::None).is_err());
    }

    #[test]
    fn test_append_at_backfills() {
        let mut idx = ValueIndex::make(&Type::uint64()).unwrap();
        idx.append_at(&Data::UInt(5), 3).unwrap();
        assert_eq!(idx.offset(), 4);
        let eq = idx.lookup(RelOp::Equal, &Data::UInt(5)).unwrap();
        assert_eq!(eq.to_vec(), [3]);
        // Unappended gaps never match.
        let ne = idx.lookup(RelOp::NotEqual, &Data::UInt(9)).unwrap();
        assert_eq!(ne.to_vec(), [3]);
    }

    #[test]
    fn test_out_of_order_append_fails() {
        let mut idx = ValueIndex::make(&Type::uint64()).unwrap();
        idx.append_at(&Data::UInt(1), 2).unwrap();
        let err = idx.append_at(&Data::UInt(1), 1).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::OutOfOrderAppend { pos: 1, offset: 3, .. }
        ));
    }

    #[test]
    fn test_container_rhs_folds() {
        let mut idx = ValueIndex::make(&Type::uint64()).unwrap();
        for v in [1u64, 2, 3, 4] {
            idx.append(&Data::UInt(v)).unwrap();
        }
        let rhs = Data::Vector(vec![Data::UInt(2), Data::UInt(4)]);
        assert_eq!(idx.lookup(RelOp::In, &rhs).unwrap().to_vec(), [1, 3]);
        assert_eq!(idx.lookup(RelOp::NotIn, &rhs).unwrap().to_vec(), [0, 2]);
        assert!(idx.lookup(RelOp::Ni, &rhs).is_err());
    }

    #[test]
    fn test_type_clash() {
        let mut idx = ValueIndex::make(&Type::uint64()).unwrap();
        assert!(idx.append(&Data::from("nope")).is_err());
        idx.append(&Data::UInt(1)).unwrap();
        assert!(idx.lookup(RelOp::Equal, &Data::from("nope")).is_err());
    }

    #[test]
    fn test_serde_roundtrip_every_kind() {
        let cases: Vec<(Type, Data, RelOp, Data)> = vec![
            (Type::boolean(), Data::Bool(true), RelOp::Equal, Data::Bool(true)),
            (Type::int64(), Data::Int(-3), RelOp::Equal, Data::Int(-3)),
            (Type::uint64(), Data::UInt(7), RelOp::Equal, Data::UInt(7)),
            (Type::double(), Data::from(4.0), RelOp::Equal, Data::from(4.0)),
            (
                Type::duration(),
                Data::Duration(5_000_000_000),
                RelOp::Equal,
                Data::Duration(5_000_000_000),
            ),
            (
                Type::timestamp(),
                Data::Timestamp(1_000_000_000),
                RelOp::Equal,
                Data::Timestamp(1_000_000_000),
            ),
            (Type::string(), Data::from("foo"), RelOp::Equal, Data::from("foo")),
            (
                Type::address(),
                Data::Address("10.0.0.1".parse().unwrap()),
                RelOp::Equal,
                Data::Address("10.0.0.1".parse().unwrap()),
            ),
            (
                Type::subnet(),
                Data::Subnet("10.0.0.0/24".parse().unwrap()),
                RelOp::Equal,
                Data::Subnet("10.0.0.0/24".parse().unwrap()),
            ),
            (
                Type::port(),
                Data::Port("22/tcp".parse().unwrap()),
                RelOp::Equal,
                Data::Port("22/tcp".parse().unwrap()),
            ),
            (
                Type::vector(Type::uint64()),
                Data::Vector(vec![Data::UInt(1), Data::UInt(2)]),
                RelOp::Ni,
                Data::UInt(2),
            ),
        ];
        for (ty, value, op, probe) in cases {
            let mut idx = ValueIndex::make(&ty).unwrap();
            idx.append(&value).unwrap();
            let bytes = bincode::serialize(&idx).unwrap();
            let back: ValueIndex = bincode::deserialize(&bytes).unwrap();
            assert_eq!(back.offset(), 1, "{ty}");
            assert_eq!(back.lookup(op, &probe).unwrap().to_vec(), [0], "{ty}");
        }
    }
}
