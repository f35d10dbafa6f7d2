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

use serde::{Deserialize, Serialize};

/// Relational operator of a predicate.
///
/// `In`/`NotIn` test element-of-container (`x ∈ xs`), `Ni`/`NotNi` test
/// contains-element (`xs ∋ x`, e.g. substring and sequence membership).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    NotIn,
    Ni,
    NotNi,
}

impl RelOp {
    /// Returns the logical complement, e.g. `==` becomes `!=` and `<`
    /// becomes `>=`. Applying `negate` twice yields the original operator.
    pub fn negate(self) -> RelOp {
        match self {
            RelOp::Equal => RelOp::NotEqual,
            RelOp::NotEqual => RelOp::Equal,
            RelOp::Less => RelOp::GreaterEqual,
            RelOp::LessEqual => RelOp::Greater,
            RelOp::Greater => RelOp::LessEqual,
            RelOp::GreaterEqual => RelOp::Less,
            RelOp::In => RelOp::NotIn,
            RelOp::NotIn => RelOp::In,
            RelOp::Ni => RelOp::NotNi,
            RelOp::NotNi => RelOp::Ni,
        }
    }

    /// Whether the operator is one of the negated forms.
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            RelOp::NotEqual | RelOp::NotIn | RelOp::NotNi
        )
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelOp::Equal => "==",
            RelOp::NotEqual => "!=",
            RelOp::Less => "<",
            RelOp::LessEqual => "<=",
            RelOp::Greater => ">",
            RelOp::GreaterEqual => ">=",
            RelOp::In => "in",
            RelOp::NotIn => "!in",
            RelOp::Ni => "ni",
            RelOp::NotNi => "!ni",
        };
        write!(f, "{s}")
    }
}
