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

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Sub, SubAssign};

use roaring::RoaringTreemap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An append-only compressed boolean vector.
///
/// The bitmap tracks a logical length separate from the set positions, so a
/// vector of `n` zero bits is distinguishable from an empty one. Set algebra
/// widens the logical length to the longer operand; [flip](Bitmap::flip)
/// complements within `[0, size())`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bitmap {
    bits: RoaringTreemap,
    len: u64,
}

impl Bitmap {
    pub fn new() -> Bitmap {
        Bitmap::default()
    }

    /// A bitmap of `len` identical bits.
    pub fn sized(len: u64, bit: bool) -> Bitmap {
        let mut bm = Bitmap::new();
        bm.append_bits(len, bit);
        bm
    }

    /// The logical length.
    pub fn size(&self) -> u64 {
        self.len
    }

    /// The number of set bits.
    pub fn count(&self) -> u64 {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether no bit is set.
    pub fn all_zero(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether every position in `[0, size())` is set.
    pub fn all_one(&self) -> bool {
        self.bits.len() == self.len
    }

    pub fn append_bit(&mut self, bit: bool) {
        if bit {
            self.bits.insert(self.len);
        }
        self.len += 1;
    }

    pub fn append_bits(&mut self, n: u64, bit: bool) {
        if bit && n > 0 {
            self.bits.insert_range(self.len..self.len + n);
        }
        self.len += n;
    }

    /// Grows the logical length to `size` with zero bits. A no-op when the
    /// bitmap is already at least that long.
    pub fn extend_to(&mut self, size: u64) {
        if size > self.len {
            self.len = size;
        }
    }

    /// Random-access test. Positions past the logical length read as zero.
    pub fn get(&self, pos: u64) -> bool {
        self.bits.contains(pos)
    }

    /// The number of set bits in `[0, pos]`.
    pub fn rank(&self, pos: u64) -> u64 {
        self.bits.rank(pos)
    }

    /// The position of the `n`-th set bit (zero-based).
    pub fn select(&self, n: u64) -> Option<u64> {
        self.bits.select(n)
    }

    /// Complements every bit in `[0, size())`.
    pub fn flip(&mut self) {
        if self.len == 0 {
            self.bits = RoaringTreemap::new();
            return;
        }
        let mut full = RoaringTreemap::new();
        full.insert_range(0..self.len);
        self.bits = full - &self.bits;
    }

    /// A flipped copy, complemented within `[0, size())`.
    pub fn flipped(&self) -> Bitmap {
        let mut bm = self.clone();
        bm.flip();
        bm
    }

    /// Iterates over the set positions in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.bits.iter()
    }

    /// Collects the set positions, mostly for assertions.
    pub fn to_vec(&self) -> Vec<u64> {
        self.bits.iter().collect()
    }
}

impl fmt::Display for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.to_vec(), self.len)
    }
}

impl FromIterator<u64> for Bitmap {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Bitmap {
        let bits: RoaringTreemap = iter.into_iter().collect();
        let len = bits.max().map(|m| m + 1).unwrap_or(0);
        Bitmap { bits, len }
    }
}

impl BitAnd for &Bitmap {
    type Output = Bitmap;

    fn bitand(self, rhs: &Bitmap) -> Bitmap {
        Bitmap {
            bits: &self.bits & &rhs.bits,
            len: self.len.max(rhs.len),
        }
    }
}

impl BitOr for &Bitmap {
    type Output = Bitmap;

    fn bitor(self, rhs: &Bitmap) -> Bitmap {
        Bitmap {
            bits: &self.bits | &rhs.bits,
            len: self.len.max(rhs.len),
        }
    }
}

impl Sub for &Bitmap {
    type Output = Bitmap;

    fn sub(self, rhs: &Bitmap) -> Bitmap {
        Bitmap {
            bits: &self.bits - &rhs.bits,
            len: self.len.max(rhs.len),
        }
    }
}

impl BitAndAssign<&Bitmap> for Bitmap {
    fn bitand_assign(&mut self, rhs: &Bitmap) {
        self.bits &= &rhs.bits;
        self.len = self.len.max(rhs.len);
    }
}

impl BitOrAssign<&Bitmap> for Bitmap {
    fn bitor_assign(&mut self, rhs: &Bitmap) {
        self.bits |= &rhs.bits;
        self.len = self.len.max(rhs.len);
    }
}

impl SubAssign<&Bitmap> for Bitmap {
    fn sub_assign(&mut self, rhs: &Bitmap) {
        self.bits -= &rhs.bits;
        self.len = self.len.max(rhs.len);
    }
}

#[derive(Serialize, Deserialize)]
struct BitmapRepr {
    len: u64,
    bits: Vec<u8>,
}

impl Serialize for Bitmap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut bytes = Vec::with_capacity(self.bits.serialized_size() as usize);
        self.bits
            .serialize_into(&mut bytes)
            .map_err(serde::ser::Error::custom)?;
        BitmapRepr {
            len: self.len,
            bits: bytes,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Bitmap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Bitmap, D::Error> {
        let repr = BitmapRepr::deserialize(deserializer)?;
        let bits = RoaringTreemap::deserialize_from(&repr.bits[..]).map_err(D::Error::custom)?;
        Ok(Bitmap {
            bits,
            len: repr.len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bm(positions: &[u64], len: u64) -> Bitmap {
        let mut b: Bitmap = positions.iter().copied().collect();
        b.extend_to(len);
        b
    }

    #[test]
    fn test_append() {
        let mut b = Bitmap::new();
        b.append_bit(true);
        b.append_bit(false);
        b.append_bits(3, true);
        assert_eq!(b.size(), 5);
        assert_eq!(b.count(), 4);
        assert_eq!(b.to_vec(), [0, 2, 3, 4]);
        assert!(b.get(0));
        assert!(!b.get(1));
        assert!(!b.get(5));
    }

    #[test]
    fn test_set_algebra() {
        let a = bm(&[0, 1, 4], 5);
        let b = bm(&[1, 2], 5);
        assert_eq!((&a & &b).to_vec(), [1]);
        assert_eq!((&a | &b).to_vec(), [0, 1, 2, 4]);
        assert_eq!((&a - &b).to_vec(), [0, 4]);
    }

    #[test]
    fn test_flip_is_bounded() {
        let mut b = bm(&[1, 3], 4);
        b.flip();
        assert_eq!(b.to_vec(), [0, 2]);
        assert_eq!(b.size(), 4);
        b.flip();
        assert_eq!(b.to_vec(), [1, 3]);
    }

    #[test]
    fn test_rank_select() {
        let b = bm(&[2, 3, 7], 8);
        assert_eq!(b.rank(3), 2);
        assert_eq!(b.rank(7), 3);
        assert_eq!(b.select(0), Some(2));
        assert_eq!(b.select(2), Some(7));
        assert_eq!(b.select(3), None);
    }

    #[test]
    fn test_all_one_all_zero() {
        assert!(Bitmap::sized(4, true).all_one());
        assert!(Bitmap::sized(4, false).all_zero());
        assert!(!bm(&[0], 2).all_one());
    }

    #[test]
    fn test_serde_roundtrip() {
        let b = bm(&[0, 5, 1_000_000], 2_000_000);
        let bytes = bincode::serialize(&b).unwrap();
        let back: Bitmap = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, b);
    }
}
