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
use snafu::OptionExt;

use crate::error::{ParseBaseSnafu, Result};

/// Per-digit bases for value decomposition, least significant digit first.
/// Every digit base is at least 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base(Vec<u64>);

impl Base {
    /// `n` digits of base `b`.
    pub fn uniform(b: u64, n: usize) -> Base {
        debug_assert!(b >= 2 && n > 0);
        Base(vec![b; n])
    }

    /// Parses a base specification from a type attribute. Accepted forms are
    /// `uniform(b, n)` and an explicit digit list `[b0, b1, ...]`.
    pub fn parse(input: &str) -> Result<Base> {
        let s = input.trim();
        let fail = || ParseBaseSnafu { input };
        if let Some(args) = s
            .strip_prefix("uniform(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let (b, n) = args.split_once(',').with_context(fail)?;
            let b: u64 = b.trim().parse().ok().with_context(fail)?;
            let n: usize = n.trim().parse().ok().with_context(fail)?;
            snafu::ensure!(b >= 2 && n > 0, fail());
            return Ok(Base::uniform(b, n));
        }
        if let Some(list) = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            let digits = list
                .split(',')
                .map(|d| d.trim().parse::<u64>().ok())
                .collect::<Option<Vec<_>>>()
                .with_context(fail)?;
            snafu::ensure!(
                !digits.is_empty() && digits.iter().all(|&d| d >= 2),
                fail()
            );
            return Ok(Base(digits));
        }
        fail().fail()
    }

    pub fn digits(&self) -> &[u64] {
        &self.0
    }

    /// The number of representable values.
    pub fn capacity(&self) -> u128 {
        self.0
            .iter()
            .fold(1u128, |acc, &b| acc.saturating_mul(u128::from(b)))
    }

    /// Decomposes `x` into digits, least significant first. Values past the
    /// capacity are clamped to the largest representable value.
    pub fn decompose(&self, x: u64) -> Vec<u64> {
        let clamped = if u128::from(x) >= self.capacity() {
            (self.capacity() - 1) as u64
        } else {
            x
        };
        let mut rest = clamped;
        self.0
            .iter()
            .map(|&b| {
                let digit = rest % b;
                rest /= b;
                digit
            })
            .collect()
    }
}

impl Default for Base {
    /// Twenty digits of base 10 cover `[0, 10^20)`, the full `u64` domain.
    fn default() -> Base {
        Base::uniform(10, 20)
    }
}
