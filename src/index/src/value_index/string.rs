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
use crate::bitmap_index::{Base, BitsliceCoder, Coder, RangeIndex};
use crate::error::{Result, TypeClashSnafu, UnsupportedOperatorSnafu};

/// The number of base-10 digits needed to range-encode lengths up to `max`.
pub(crate) fn decimal_components(max: u64) -> usize {
    let mut components = 0;
    let mut m = max;
    while m >= 10 {
        m /= 10;
        components += 1;
    }
    if max % 10 != 0 {
        components += 1;
    }
    components.max(1)
}

/// An index for strings: a range-coded length index plus one bit-sliced
/// index per character position, up to `max_length`. Longer strings are
/// chopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StringIndex {
    max_length: u64,
    length: RangeIndex,
    chars: Vec<BitsliceCoder>,
}

impl StringIndex {
    pub fn new(max_length: u64) -> StringIndex {
        let length = RangeIndex::new_range(Base::uniform(10, decimal_components(max_length)));
        StringIndex {
            max_length,
            length,
            chars: Vec::new(),
        }
    }

    pub fn append(&mut self, x: &Data, pos: u64) -> Result<()> {
        let s = x.as_str().with_context(|| TypeClashSnafu {
            value: x.to_string(),
        })?;
        let bytes = &s.as_bytes()[..s.len().min(self.max_length as usize)];
        if bytes.len() > self.chars.len() {
            self.chars.resize_with(bytes.len(), || BitsliceCoder::new(8));
        }
        for (i, &byte) in bytes.iter().enumerate() {
            let size = self.chars[i].size();
            self.chars[i].skip(pos - size);
            self.chars[i].append(u64::from(byte));
        }
        self.length.skip(pos - self.length.size());
        self.length.append(bytes.len() as u64);
        Ok(())
    }

    pub fn lookup(&self, op: RelOp, x: &Data, offset: u64) -> Result<Bitmap> {
        let s = x.as_str().with_context(|| TypeClashSnafu {
            value: x.to_string(),
        })?;
        let needle = &s.as_bytes()[..s.len().min(self.max_length as usize)];
        match op {
            RelOp::Equal | RelOp::NotEqual => {
                let negated = op == RelOp::NotEqual;
                if needle.is_empty() {
                    let mut result = self.length.lookup(RelOp::Equal, 0)?;
                    result.extend_to(offset);
                    if negated {
                        result.flip();
                    }
                    return Ok(result);
                }
                if needle.len() > self.chars.len() {
                    return Ok(Bitmap::sized(offset, negated));
                }
                let mut result = self.length.lookup(RelOp::LessEqual, needle.len() as u64)?;
                for (i, &byte) in needle.iter().enumerate() {
                    if result.all_zero() {
                        break;
                    }
                    result &= &self.chars[i].lookup(RelOp::Equal, u64::from(byte))?;
                }
                if result.all_zero() {
                    return Ok(Bitmap::sized(offset, negated));
                }
                result.extend_to(offset);
                if negated {
                    result.flip();
                }
                Ok(result)
            }
            RelOp::Ni | RelOp::NotNi => {
                let negated = op == RelOp::NotNi;
                if needle.is_empty() {
                    return Ok(Bitmap::sized(offset, !negated));
                }
                if needle.len() > self.chars.len() {
                    return Ok(Bitmap::sized(offset, negated));
                }
                let mut result = Bitmap::sized(offset, false);
                for start in 0..=(self.chars.len() - needle.len()) {
                    let mut substr = Bitmap::sized(offset, true);
                    let mut dead = false;
                    for (j, &byte) in needle.iter().enumerate() {
                        let bm = self.chars[start + j].lookup(RelOp::Equal, u64::from(byte))?;
                        if bm.all_zero() {
                            dead = true;
                            break;
                        }
                        substr &= &bm;
                    }
                    if !dead {
                        result |= &substr;
                    }
                }
                if negated {
                    result.flip();
                }
                Ok(result)
            }
            _ => UnsupportedOperatorSnafu { op }.fail(),
        }
    }
}
