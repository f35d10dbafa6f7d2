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

use datatypes::{Address, Data, RelOp, Subnet};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::bitmap::Bitmap;
use crate::bitmap_index::{BitsliceCoder, Coder, SingletonCoder};
use crate::error::{InvalidPrefixLengthSnafu, Result, TypeClashSnafu, UnsupportedOperatorSnafu};

/// An index for IP addresses: sixteen bit-sliced byte indexes plus a bitmap
/// of the v4-embedded positions.
///
/// Equality matches bytes; v4 probes skip the first twelve bytes and
/// restrict to the v4 bitmap. Subnet membership matches whole bytes down to
/// the prefix and the remaining bits through the stored slices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressIndex {
    bytes: Vec<BitsliceCoder>,
    v4: SingletonCoder,
}

impl Default for AddressIndex {
    fn default() -> AddressIndex {
        AddressIndex::new()
    }
}

impl AddressIndex {
    pub fn new() -> AddressIndex {
        AddressIndex {
            bytes: (0..16).map(|_| BitsliceCoder::new(8)).collect(),
            v4: SingletonCoder::new(),
        }
    }

    pub(crate) fn append_addr(&mut self, addr: &Address, pos: u64) {
        for (i, coder) in self.bytes.iter_mut().enumerate() {
            coder.skip(pos - coder.size());
            coder.append(u64::from(addr.bytes()[i]));
        }
        self.v4.skip(pos - self.v4.size());
        self.v4.append(u64::from(addr.is_v4()));
    }

    pub(crate) fn lookup_addr(&self, op: RelOp, x: &Address, offset: u64) -> Result<Bitmap> {
        ensure!(
            matches!(op, RelOp::Equal | RelOp::NotEqual),
            UnsupportedOperatorSnafu { op }
        );
        let negated = op == RelOp::NotEqual;
        let mut result = if x.is_v4() {
            let mut v4 = self.v4.ones().clone();
            v4.extend_to(offset);
            v4
        } else {
            Bitmap::sized(offset, true)
        };
        let start = if x.is_v4() { 12 } else { 0 };
        for i in start..16 {
            result &= &self.bytes[i].lookup(RelOp::Equal, u64::from(x.bytes()[i]))?;
            if result.all_zero() {
                return Ok(Bitmap::sized(offset, negated));
            }
        }
        result.extend_to(offset);
        if negated {
            result.flip();
        }
        Ok(result)
    }

    pub(crate) fn lookup_subnet(&self, op: RelOp, x: &Subnet, offset: u64) -> Result<Bitmap> {
        ensure!(
            matches!(op, RelOp::In | RelOp::NotIn),
            UnsupportedOperatorSnafu { op }
        );
        let mut prefix = u32::from(x.length());
        ensure!(prefix > 0, InvalidPrefixLengthSnafu { length: 0u8 });
        let network = x.network();
        let is_v4 = network.is_v4();
        if (if is_v4 { prefix + 96 } else { prefix }) == 128 {
            // A host subnet degenerates to an equality lookup.
            let eq = if op == RelOp::In {
                RelOp::Equal
            } else {
                RelOp::NotEqual
            };
            return self.lookup_addr(eq, &network, offset);
        }
        let negated = op == RelOp::NotIn;
        let mut result = if is_v4 {
            let mut v4 = self.v4.ones().clone();
            v4.extend_to(offset);
            v4
        } else {
            Bitmap::sized(offset, true)
        };
        let mut i = if is_v4 { 12 } else { 0 };
        while i < 16 && prefix >= 8 {
            result &= &self.bytes[i].lookup(RelOp::Equal, u64::from(network.bytes()[i]))?;
            i += 1;
            prefix -= 8;
        }
        for j in 0..prefix {
            let bit = 7 - j;
            let slice = self.bytes[i].slice(bit);
            if (network.bytes()[i] >> bit) & 1 == 1 {
                result &= slice;
            } else {
                let mut complement = slice.clone();
                complement.extend_to(offset);
                complement.flip();
                result &= &complement;
            }
        }
        result.extend_to(offset);
        if negated {
            result.flip();
        }
        Ok(result)
    }

    pub fn append(&mut self, x: &Data, pos: u64) -> Result<()> {
        match x {
            Data::Address(addr) => {
                self.append_addr(addr, pos);
                Ok(())
            }
            _ => TypeClashSnafu {
                value: x.to_string(),
            }
            .fail(),
        }
    }

    pub fn lookup(&self, op: RelOp, x: &Data, offset: u64) -> Result<Bitmap> {
        match x {
            Data::Address(addr) => self.lookup_addr(op, addr, offset),
            Data::Subnet(subnet) => self.lookup_subnet(op, subnet, offset),
            _ => TypeClashSnafu {
                value: x.to_string(),
            }
            .fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Data {
        Data::Address(s.parse().unwrap())
    }

    fn subnet(s: &str) -> Data {
        Data::Subnet(s.parse().unwrap())
    }

    fn sample() -> (AddressIndex, u64) {
        let mut idx = AddressIndex::new();
        let values = ["10.0.0.1", "10.0.0.2", "192.168.1.1", "::1"];
        for (i, v) in values.iter().enumerate() {
            idx.append(&addr(v), i as u64).unwrap();
        }
        (idx, values.len() as u64)
    }

    #[test]
    fn test_equality() {
        let (idx, offset) = sample();
        let eq = idx.lookup(RelOp::Equal, &addr("10.0.0.1"), offset).unwrap();
        assert_eq!(eq.to_vec(), [0]);
        let ne = idx
            .lookup(RelOp::NotEqual, &addr("10.0.0.1"), offset)
            .unwrap();
        assert_eq!(ne.to_vec(), [1, 2, 3]);
        let v6 = idx.lookup(RelOp::Equal, &addr("::1"), offset).unwrap();
        assert_eq!(v6.to_vec(), [3]);
    }

    #[test]
    fn test_subnet_membership() {
        let (idx, offset) = sample();
        let in24 = idx
            .lookup(RelOp::In, &subnet("10.0.0.0/24"), offset)
            .unwrap();
        assert_eq!(in24.to_vec(), [0, 1]);
        let host = idx.lookup(RelOp::In, &subnet("::1/128"), offset).unwrap();
        assert_eq!(host.to_vec(), [3]);
        let not_in = idx
            .lookup(RelOp::NotIn, &subnet("10.0.0.0/24"), offset)
            .unwrap();
        assert_eq!(not_in.to_vec(), [2, 3]);
    }

    #[test]
    fn test_subnet_with_unaligned_prefix() {
        let (idx, offset) = sample();
        // 10.0.0.0/30 covers .0 through .3.
        let in30 = idx
            .lookup(RelOp::In, &subnet("10.0.0.0/30"), offset)
            .unwrap();
        assert_eq!(in30.to_vec(), [0, 1]);
        // 192.168.0.0/23 covers 192.168.0.x and 192.168.1.x.
        let in23 = idx
            .lookup(RelOp::In, &subnet("192.168.0.0/23"), offset)
            .unwrap();
        assert_eq!(in23.to_vec(), [2]);
    }

    #[test]
    fn test_v4_query_misses_v6_rows() {
        let mut idx = AddressIndex::new();
        idx.append(&addr("10.0.0.1"), 0).unwrap();
        idx.append(&addr("fe80::1"), 1).unwrap();
        let eq = idx.lookup(RelOp::Equal, &addr("10.0.0.1"), 2).unwrap();
        assert_eq!(eq.to_vec(), [0]);
    }

    #[test]
    fn test_zero_prefix_is_invalid() {
        let (idx, offset) = sample();
        let sn = Subnet::new("0.0.0.0".parse().unwrap(), 0).unwrap();
        assert!(idx.lookup(RelOp::In, &Data::Subnet(sn), offset).is_err());
    }

    #[test]
    fn test_unsupported_operator() {
        let (idx, offset) = sample();
        assert!(idx.lookup(RelOp::Less, &addr("10.0.0.1"), offset).is_err());
        assert!(idx
            .lookup(RelOp::Equal, &subnet("10.0.0.0/24"), offset)
            .is_err());
    }
}
