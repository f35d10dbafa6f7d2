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

//! Bitmap indexes map column values to bitmaps of matching row positions.
//!
//! An index is the composition of a [binner](binner::Binner), which buckets
//! raw values, and a [coder](coder::Coder), which encodes bucket keys as
//! bitmaps. The [base](base::Base) controls the digit decomposition of the
//! multi-level coder.

pub mod base;
pub mod binner;
pub mod coder;

pub use base::Base;
pub use binner::Binner;
pub use coder::{
    BitsliceCoder, Coder, EqualityCoder, MultiLevelCoder, RangeCoder, SingletonCoder,
};

/// The workhorse coder stack for arithmetic and length columns: digits under
/// a [Base], each digit range-encoded.
pub type RangeIndex = MultiLevelCoder<RangeCoder>;
