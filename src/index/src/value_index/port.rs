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

use datatypes::{Data, Protocol, RelOp};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::bitmap::Bitmap;
use crate::bitmap_index::{Base, Coder, EqualityCoder, RangeIndex};
use crate::error::{Result, TypeClashSnafu, UnsupportedOperatorSnafu};

/// An index for transport-layer ports: a range-coded number index over
/// `[0, 2^16)` plus an equality index over the protocol.
///
/// A query port with a known protocol restricts the number match to that
/// protocol; the unknown protocol matches any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortIndex {
    num: RangeIndex,
    proto: EqualityCoder,
}

impl Default for PortIndex {
    fn default() -> PortIndex {
        PortIndex::new()
    }
}

impl PortIndex {
    pub fn new() -> PortIndex {
        PortIndex {
            num: RangeIndex::new_range(Base::uniform(10, 5)),
            proto: EqualityCoder::new(),
        }
    }

    pub fn append(&mut self, x: &Data, pos: u64) -> Result<()> {
        match x {
            Data::Port(p) => {
                self.num.skip(pos - self.num.size());
                self.num.append(u64::from(p.number()));
                self.proto.skip(pos - self.proto.size());
                self.proto.append(u64::from(p.protocol().as_u8()));
                Ok(())
            }
            _ => TypeClashSnafu {
                value: x.to_string(),
            }
            .fail(),
        }
    }

    pub fn lookup(&self, op: RelOp, x: &Data, offset: u64) -> Result<Bitmap> {
        // An empty index answers any query with an empty bitmap.
        if offset == 0 {
            return Ok(Bitmap::new());
        }
        ensure!(
            !matches!(op, RelOp::In | RelOp::NotIn | RelOp::Ni | RelOp::NotNi),
            UnsupportedOperatorSnafu { op }
        );
        let p = match x {
            Data::Port(p) => p,
            _ => {
                return TypeClashSnafu {
                    value: x.to_string(),
                }
                .fail()
            }
        };
        let mut result = self.num.lookup(op, u64::from(p.number()))?;
        if result.all_zero() {
            return Ok(Bitmap::sized(offset, false));
        }
        if p.protocol() != Protocol::Unknown {
            result &= &self
                .proto
                .lookup(RelOp::Equal, u64::from(p.protocol().as_u8()))?;
        }
        Ok(result)
    }
}
