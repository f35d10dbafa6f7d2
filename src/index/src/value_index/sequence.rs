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

use datatypes::{Data, RelOp, Type};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::bitmap::Bitmap;
use crate::bitmap_index::{Base, Coder, RangeIndex};
use crate::error::{Result, TypeClashSnafu, UnsupportedOperatorSnafu};
use crate::value_index::string::decimal_components;
use crate::value_index::ValueIndex;

/// An index for vectors and sets: a range-coded length index plus one child
/// value index per element position, grown lazily to the longest observed
/// sequence and capped at `max_size`.
///
/// Only `ni`/`not_ni` are answerable: an element is contained iff any
/// positional child matches it with equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceIndex {
    max_size: u64,
    size: RangeIndex,
    elements: Vec<Box<ValueIndex>>,
    prototype: Box<ValueIndex>,
}

impl SequenceIndex {
    /// Builds a sequence index over elements of type `elem`, or `None` when
    /// the element type has no index representation.
    pub fn new(elem: Type, max_size: u64) -> Option<SequenceIndex> {
        let prototype = Box::new(ValueIndex::make(&elem)?);
        Some(SequenceIndex {
            max_size,
            size: RangeIndex::new_range(Base::uniform(10, decimal_components(max_size))),
            elements: Vec::new(),
            prototype,
        })
    }

    pub fn append(&mut self, x: &Data, pos: u64) -> Result<()> {
        let elems: Vec<&Data> = match x {
            Data::Vector(xs) => xs.iter().collect(),
            Data::Set(xs) => xs.iter().collect(),
            _ => {
                return TypeClashSnafu {
                    value: x.to_string(),
                }
                .fail()
            }
        };
        let len = elems.len().min(self.max_size as usize);
        if len > self.elements.len() {
            let prototype = &self.prototype;
            self.elements.resize_with(len, || prototype.clone());
        }
        for (i, elem) in elems.iter().take(len).enumerate() {
            self.elements[i].append_at(elem, pos)?;
        }
        self.size.skip(pos - self.size.size());
        self.size.append(len as u64);
        Ok(())
    }

    pub fn lookup(&self, op: RelOp, x: &Data, offset: u64) -> Result<Bitmap> {
        ensure!(
            matches!(op, RelOp::Ni | RelOp::NotNi),
            UnsupportedOperatorSnafu { op }
        );
        if self.elements.is_empty() {
            return Ok(Bitmap::new());
        }
        let mut result = self.elements[0].lookup(RelOp::Equal, x)?;
        for element in &self.elements[1..] {
            result |= &element.lookup(RelOp::Equal, x)?;
        }
        if op == RelOp::NotNi {
            result.extend_to(offset);
            result.flip();
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(xs: &[u64]) -> Data {
        Data::Vector(xs.iter().map(|&x| Data::UInt(x)).collect())
    }

    fn sample() -> (SequenceIndex, u64) {
        let mut idx = SequenceIndex::new(Type::uint64(), 1024).unwrap();
        let values = [vec![1u64, 2, 3], vec![4], vec![2, 3]];
        for (i, v) in values.iter().enumerate() {
            idx.append(&vec_of(v), i as u64).unwrap();
        }
        (idx, values.len() as u64)
    }

    #[test]
    fn test_membership() {
        let (idx, offset) = sample();
        let ni = idx.lookup(RelOp::Ni, &Data::UInt(2), offset).unwrap();
        assert_eq!(ni.to_vec(), [0, 2]);
        let not_ni = idx.lookup(RelOp::NotNi, &Data::UInt(2), offset).unwrap();
        assert_eq!(not_ni.to_vec(), [1]);
    }

    #[test]
    fn test_absent_element() {
        let (idx, offset) = sample();
        let ni = idx.lookup(RelOp::Ni, &Data::UInt(9), offset).unwrap();
        assert!(ni.all_zero());
        let not_ni = idx.lookup(RelOp::NotNi, &Data::UInt(9), offset).unwrap();
        assert_eq!(not_ni.to_vec(), [0, 1, 2]);
    }

    #[test]
    fn test_sets_index_like_vectors() {
        let mut idx = SequenceIndex::new(Type::string(), 16).unwrap();
        let mut set = std::collections::BTreeSet::new();
        set.insert(Data::from("tcp"));
        set.insert(Data::from("udp"));
        idx.append(&Data::Set(set), 0).unwrap();
        let ni = idx.lookup(RelOp::Ni, &Data::from("udp"), 1).unwrap();
        assert_eq!(ni.to_vec(), [0]);
    }

    #[test]
    fn test_max_size_caps_elements() {
        let mut idx = SequenceIndex::new(Type::uint64(), 2).unwrap();
        idx.append(&vec_of(&[1, 2, 3, 4]), 0).unwrap();
        let within = idx.lookup(RelOp::Ni, &Data::UInt(2), 1).unwrap();
        assert_eq!(within.to_vec(), [0]);
        // Elements past the cap are invisible.
        let chopped = idx.lookup(RelOp::Ni, &Data::UInt(3), 1).unwrap();
        assert!(chopped.all_zero());
    }

    #[test]
    fn test_only_membership_operators() {
        let (idx, offset) = sample();
        assert!(idx.lookup(RelOp::Equal, &Data::UInt(2), offset).is_err());
        assert!(idx.lookup(RelOp::In, &Data::UInt(2), offset).is_err());
    }

    #[test]
    fn test_element_type_clash() {
        let (idx, offset) = sample();
        assert!(idx.lookup(RelOp::Ni, &Data::from("2"), offset).is_err());
    }
}
