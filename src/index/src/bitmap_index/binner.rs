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

use serde::{Deserialize, Serialize};

/// Buckets raw values before they reach a coder. Binning is lossy: all
/// values of a bucket share one key, so lookups match at bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Binner {
    /// Every value is its own bucket.
    #[default]
    Identity,
    /// Divides by `10^power`, e.g. `power: 9` truncates nanoseconds to
    /// seconds.
    Decimal { power: u32 },
    /// Drops the fractional part of a double.
    Precision,
}

impl Binner {
    pub fn bin_i64(&self, v: i64) -> i64 {
        match self {
            Binner::Identity | Binner::Precision => v,
            Binner::Decimal { power } => v.div_euclid(10i64.saturating_pow(*power)),
        }
    }

    pub fn bin_u64(&self, v: u64) -> u64 {
        match self {
            Binner::Identity | Binner::Precision => v,
            Binner::Decimal { power } => v / 10u64.saturating_pow(*power),
        }
    }

    pub fn bin_f64(&self, v: f64) -> f64 {
        match self {
            Binner::Identity => v,
            Binner::Precision => v.trunc(),
            Binner::Decimal { power } => (v / 10f64.powi(*power as i32)).trunc(),
        }
    }
}
