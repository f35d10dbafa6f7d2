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

use datatypes::{Data, RelOp, Subnet};
use serde::{Deserialize, Serialize};

use crate::bitmap::Bitmap;
use crate::bitmap_index::{Coder, EqualityCoder};
use crate::error::{Result, TypeClashSnafu, UnsupportedOperatorSnafu};
use crate::value_index::address::AddressIndex;

/// An index for subnets: an [AddressIndex] over the network addresses plus
/// an equality index over the prefix lengths.
///
/// `U in x` reads as U ⊆ x (all stored subnets inside the query), `U ni x`
/// as U ⊇ x (all stored subnets covering the query).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetIndex {
    network: AddressIndex,
    length: EqualityCoder,
}

impl Default for SubnetIndex {
    fn default() -> SubnetIndex {
        SubnetIndex::new()
    }
}

impl SubnetIndex {
    pub fn new() -> SubnetIndex {
        SubnetIndex {
            network: AddressIndex::new(),
            length: EqualityCoder::new(),
        }
    }

    pub fn append(&mut self, x: &Data, pos: u64) -> Result<()> {
        match x {
            Data::Subnet(sn) => {
                self.length.skip(pos - self.length.size());
                self.length.append(u64::from(sn.length()));
                self.network.append_addr(&sn.network(), pos);
                Ok(())
            }
            _ => TypeClashSnafu {
                value: x.to_string(),
            }
            .fail(),
        }
    }

    pub fn lookup(&self, op: RelOp, x: &Data, offset: u64) -> Result<Bitmap> {
        let sn = match x {
            Data::Subnet(sn) => sn,
            _ => {
                return TypeClashSnafu {
                    value: x.to_string(),
                }
                .fail()
            }
        };
        match op {
            RelOp::Equal | RelOp::NotEqual => {
                let mut result = self.network.lookup_addr(RelOp::Equal, &sn.network(), offset)?;
                result &= &self.length.lookup(RelOp::Equal, u64::from(sn.length()))?;
                result.extend_to(offset);
                if op == RelOp::NotEqual {
                    result.flip();
                }
                Ok(result)
            }
            RelOp::In | RelOp::NotIn => {
                let mut result = self.network.lookup_subnet(RelOp::In, sn, offset)?;
                result &= &self
                    .length
                    .lookup(RelOp::GreaterEqual, u64::from(sn.length()))?;
                result.extend_to(offset);
                if op == RelOp::NotIn {
                    result.flip();
                }
                Ok(result)
            }
            RelOp::Ni | RelOp::NotNi => {
                let mut result = Bitmap::sized(offset, false);
                for i in 1..=sn.length() {
                    let Ok(wider) = Subnet::new(sn.network(), i) else {
                        continue;
                    };
                    let mut xs = self.network.lookup_subnet(RelOp::In, &wider, offset)?;
                    xs &= &self.length.lookup(RelOp::Equal, u64::from(i))?;
                    result |= &xs;
                }
                if op == RelOp::NotNi {
                    result.flip();
                }
                Ok(result)
            }
            _ => UnsupportedOperatorSnafu { op }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(s: &str) -> Data {
        Data::Subnet(s.parse().unwrap())
    }

    fn sample() -> (SubnetIndex, u64) {
        let mut idx = SubnetIndex::new();
        let values = ["10.0.0.0/24", "10.0.0.0/16", "192.168.0.0/16", "fe80::/10"];
        for (i, v) in values.iter().enumerate() {
            idx.append(&subnet(v), i as u64).unwrap();
        }
        (idx, values.len() as u64)
    }

    #[test]
    fn test_equality() {
        let (idx, offset) = sample();
        let eq = idx
            .lookup(RelOp::Equal, &subnet("10.0.0.0/24"), offset)
            .unwrap();
        assert_eq!(eq.to_vec(), [0]);
        let ne = idx
            .lookup(RelOp::NotEqual, &subnet("10.0.0.0/24"), offset)
            .unwrap();
        assert_eq!(ne.to_vec(), [1, 2, 3]);
    }

    #[test]
    fn test_subset_of_query() {
        let (idx, offset) = sample();
        // Stored subnets contained in 10.0.0.0/8: both 10.0.0.0/24 and
        // 10.0.0.0/16.
        let within = idx
            .lookup(RelOp::In, &subnet("10.0.0.0/8"), offset)
            .unwrap();
        assert_eq!(within.to_vec(), [0, 1]);
        let within16 = idx
            .lookup(RelOp::In, &subnet("10.0.0.0/16"), offset)
            .unwrap();
        assert_eq!(within16.to_vec(), [0, 1]);
    }

    #[test]
    fn test_superset_of_query() {
        let (idx, offset) = sample();
        // Stored subnets covering 10.0.0.0/24: itself and the wider /16.
        let covering = idx
            .lookup(RelOp::Ni, &subnet("10.0.0.0/24"), offset)
            .unwrap();
        assert_eq!(covering.to_vec(), [0, 1]);
        let covering_host = idx
            .lookup(RelOp::Ni, &subnet("10.0.0.42/32"), offset)
            .unwrap();
        assert_eq!(covering_host.to_vec(), [0, 1]);
        let none = idx
            .lookup(RelOp::Ni, &subnet("172.16.0.0/12"), offset)
            .unwrap();
        assert!(none.all_zero());
    }

    #[test]
    fn test_type_clash() {
        let (idx, offset) = sample();
        assert!(idx
            .lookup(RelOp::Equal, &Data::from("10.0.0.0/24"), offset)
            .is_err());
    }
}
