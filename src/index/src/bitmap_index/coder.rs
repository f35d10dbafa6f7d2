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

use std::collections::BTreeMap;

use datatypes::RelOp;
use serde::{Deserialize, Serialize};

use crate::bitmap::Bitmap;
use crate::bitmap_index::base::Base;
use crate::error::{Result, UnsupportedOperatorSnafu};

/// Encodes a stream of `u64` keys as bitmaps and answers relational lookups
/// over the appended positions.
///
/// `append` extends the coder by one position, `skip` by `n` positions that
/// hold no key. Lookup results are sized to `[0, size())`; positions without
/// a key never match equality or range operators directly, but may surface
/// through complements. Callers mask those out.
pub trait Coder {
    fn size(&self) -> u64;

    fn append(&mut self, key: u64);

    fn skip(&mut self, n: u64);

    fn lookup(&self, op: RelOp, key: u64) -> Result<Bitmap>;
}

/// One bitmap per distinct key. Range operators fold over the sorted key
/// set, so they are linear in the number of distinct keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EqualityCoder {
    bitmaps: BTreeMap<u64, Bitmap>,
    size: u64,
}

impl EqualityCoder {
    pub fn new() -> EqualityCoder {
        EqualityCoder::default()
    }

    fn union_of(&self, keys: impl Iterator<Item = u64>) -> Bitmap {
        let mut result = Bitmap::sized(self.size, false);
        for key in keys {
            if let Some(bm) = self.bitmaps.get(&key) {
                result |= bm;
            }
        }
        result.extend_to(self.size);
        result
    }
}

impl Coder for EqualityCoder {
    fn size(&self) -> u64 {
        self.size
    }

    fn append(&mut self, key: u64) {
        let bm = self.bitmaps.entry(key).or_default();
        bm.append_bits(self.size - bm.size(), false);
        bm.append_bit(true);
        self.size += 1;
    }

    fn skip(&mut self, n: u64) {
        self.size += n;
    }

    fn lookup(&self, op: RelOp, key: u64) -> Result<Bitmap> {
        let keys = || self.bitmaps.keys().copied();
        let result = match op {
            RelOp::Equal => self.union_of(std::iter::once(key)),
            RelOp::NotEqual => self.union_of(keys().filter(|&k| k != key)),
            RelOp::Less => self.union_of(keys().take_while(|&k| k < key)),
            RelOp::LessEqual => self.union_of(keys().take_while(|&k| k <= key)),
            RelOp::Greater => self.union_of(keys().filter(|&k| k > key)),
            RelOp::GreaterEqual => self.union_of(keys().filter(|&k| k >= key)),
            _ => return UnsupportedOperatorSnafu { op }.fail(),
        };
        Ok(result)
    }
}

/// Range-encoded bitmaps over a fixed key domain `[0, cardinality)`:
/// `bitmaps[i]` holds the positions whose key is at most `i`. Range lookups
/// touch one or two bitmaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeCoder {
    bitmaps: Vec<Bitmap>,
    cardinality: u64,
    size: u64,
}

impl RangeCoder {
    pub fn new(cardinality: u64) -> RangeCoder {
        debug_assert!(cardinality >= 2);
        RangeCoder {
            bitmaps: vec![Bitmap::new(); (cardinality - 1) as usize],
            cardinality,
            size: 0,
        }
    }

    fn all(&self) -> Bitmap {
        Bitmap::sized(self.size, true)
    }

    fn none(&self) -> Bitmap {
        Bitmap::sized(self.size, false)
    }

    fn less_equal(&self, key: u64) -> Bitmap {
        if key >= self.cardinality - 1 {
            self.all()
        } else {
            self.bitmaps[key as usize].clone()
        }
    }

    fn equal(&self, key: u64) -> Bitmap {
        if key >= self.cardinality {
            self.none()
        } else if key == 0 {
            self.less_equal(0)
        } else {
            &self.less_equal(key) - &self.less_equal(key - 1)
        }
    }
}

impl Coder for RangeCoder {
    fn size(&self) -> u64 {
        self.size
    }

    fn append(&mut self, key: u64) {
        let key = key.min(self.cardinality - 1);
        for (i, bm) in self.bitmaps.iter_mut().enumerate() {
            bm.append_bit(i as u64 >= key);
        }
        self.size += 1;
    }

    fn skip(&mut self, n: u64) {
        for bm in &mut self.bitmaps {
            bm.append_bits(n, false);
        }
        self.size += n;
    }

    fn lookup(&self, op: RelOp, key: u64) -> Result<Bitmap> {
        let result = match op {
            RelOp::Equal => self.equal(key),
            RelOp::NotEqual => self.equal(key).flipped(),
            RelOp::Less => {
                if key == 0 {
                    self.none()
                } else {
                    self.less_equal(key - 1)
                }
            }
            RelOp::LessEqual => self.less_equal(key),
            RelOp::Greater => self.less_equal(key).flipped(),
            RelOp::GreaterEqual => {
                if key == 0 {
                    self.all()
                } else {
                    self.less_equal(key - 1).flipped()
                }
            }
            _ => return UnsupportedOperatorSnafu { op }.fail(),
        };
        Ok(result)
    }
}

/// A single bitmap, used for boolean columns and flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SingletonCoder {
    bits: Bitmap,
    size: u64,
}

impl SingletonCoder {
    pub fn new() -> SingletonCoder {
        SingletonCoder::default()
    }

    /// The positions appended with a non-zero key.
    pub fn ones(&self) -> &Bitmap {
        &self.bits
    }
}

impl Coder for SingletonCoder {
    fn size(&self) -> u64 {
        self.size
    }

    fn append(&mut self, key: u64) {
        self.bits.append_bit(key != 0);
        self.size += 1;
    }

    fn skip(&mut self, n: u64) {
        self.bits.append_bits(n, false);
        self.size += n;
    }

    fn lookup(&self, op: RelOp, key: u64) -> Result<Bitmap> {
        let result = match (op, key != 0) {
            (RelOp::Equal, true) | (RelOp::NotEqual, false) => self.bits.clone(),
            (RelOp::Equal, false) | (RelOp::NotEqual, true) => self.bits.flipped(),
            _ => return UnsupportedOperatorSnafu { op }.fail(),
        };
        Ok(result)
    }
}

/// One bitmap per bit position of a fixed-width key. Equality is the AND of
/// per-bit matches; the raw slices serve the address index's prefix
/// matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitsliceCoder {
    slices: Vec<Bitmap>,
    size: u64,
}

impl BitsliceCoder {
    pub fn new(width: u32) -> BitsliceCoder {
        BitsliceCoder {
            slices: vec![Bitmap::new(); width as usize],
            size: 0,
        }
    }

    /// The positions whose key has bit `bit` set.
    pub fn slice(&self, bit: u32) -> &Bitmap {
        &self.slices[bit as usize]
    }
}

impl Coder for BitsliceCoder {
    fn size(&self) -> u64 {
        self.size
    }

    fn append(&mut self, key: u64) {
        for (b, slice) in self.slices.iter_mut().enumerate() {
            slice.append_bit((key >> b) & 1 == 1);
        }
        self.size += 1;
    }

    fn skip(&mut self, n: u64) {
        for slice in &mut self.slices {
            slice.append_bits(n, false);
        }
        self.size += n;
    }

    fn lookup(&self, op: RelOp, key: u64) -> Result<Bitmap> {
        let mut result = Bitmap::sized(self.size, true);
        for (b, slice) in self.slices.iter().enumerate() {
            if (key >> b) & 1 == 1 {
                result &= slice;
            } else {
                result &= &slice.flipped();
            }
            if result.all_zero() {
                break;
            }
        }
        match op {
            RelOp::Equal => Ok(result),
            RelOp::NotEqual => Ok(result.flipped()),
            _ => UnsupportedOperatorSnafu { op }.fail(),
        }
    }
}

/// Decomposes keys into digits under a [Base] and applies the inner coder
/// per digit. Range lookups combine digits most-significant-first:
/// `v <= x` iff the top digit is smaller, or equal and the rest is `<=`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLevelCoder<C> {
    base: Base,
    levels: Vec<C>,
    size: u64,
}

impl<C: Coder> MultiLevelCoder<C> {
    pub fn new_with(base: Base, make: impl Fn(u64) -> C) -> MultiLevelCoder<C> {
        let levels = base.digits().iter().map(|&b| make(b)).collect();
        MultiLevelCoder {
            base,
            levels,
            size: 0,
        }
    }

    pub fn base(&self) -> &Base {
        &self.base
    }

    fn overflows(&self, key: u64) -> bool {
        u128::from(key) >= self.base.capacity()
    }

    fn equal(&self, key: u64) -> Result<Bitmap> {
        let digits = self.base.decompose(key);
        let mut result = Bitmap::sized(self.size, true);
        for (level, digit) in self.levels.iter().zip(digits) {
            result &= &level.lookup(RelOp::Equal, digit)?;
            if result.all_zero() {
                break;
            }
        }
        Ok(result)
    }

    /// The digit-wise comparison chain. With `strict` the empty suffix
    /// compares false (`<`), otherwise true (`<=`).
    fn less_chain(&self, key: u64, strict: bool) -> Result<Bitmap> {
        let digits = self.base.decompose(key);
        let mut acc = Bitmap::sized(self.size, !strict);
        for (level, digit) in self.levels.iter().zip(digits) {
            let lt = level.lookup(RelOp::Less, digit)?;
            let eq = level.lookup(RelOp::Equal, digit)?;
            acc = &lt | &(&eq & &acc);
        }
        Ok(acc)
    }
}

impl MultiLevelCoder<RangeCoder> {
    /// Range-encoded digits under `base`.
    pub fn new_range(base: Base) -> MultiLevelCoder<RangeCoder> {
        MultiLevelCoder::new_with(base, RangeCoder::new)
    }
}

impl<C: Coder> Coder for MultiLevelCoder<C> {
    fn size(&self) -> u64 {
        self.size
    }

    fn append(&mut self, key: u64) {
        let digits = self.base.decompose(key);
        for (level, digit) in self.levels.iter_mut().zip(digits) {
            level.append(digit);
        }
        self.size += 1;
    }

    fn skip(&mut self, n: u64) {
        for level in &mut self.levels {
            level.skip(n);
        }
        self.size += n;
    }

    fn lookup(&self, op: RelOp, key: u64) -> Result<Bitmap> {
        if self.overflows(key) {
            let result = match op {
                RelOp::Equal | RelOp::Greater | RelOp::GreaterEqual => {
                    Bitmap::sized(self.size, false)
                }
                RelOp::NotEqual | RelOp::Less | RelOp::LessEqual => Bitmap::sized(self.size, true),
                _ => return UnsupportedOperatorSnafu { op }.fail(),
            };
            return Ok(result);
        }
        let result = match op {
            RelOp::Equal => self.equal(key)?,
            RelOp::NotEqual => self.equal(key)?.flipped(),
            RelOp::Less => self.less_chain(key, true)?,
            RelOp::LessEqual => self.less_chain(key, false)?,
            RelOp::Greater => self.less_chain(key, false)?.flipped(),
            RelOp::GreaterEqual => self.less_chain(key, true)?.flipped(),
            _ => return UnsupportedOperatorSnafu { op }.fail(),
        };
        Ok(result)
    }
}
