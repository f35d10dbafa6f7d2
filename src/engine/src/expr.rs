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

//! Boolean predicate expressions over event columns.

use std::fmt::{self, Display, Formatter};

use datatypes::{Data, RelOp, Type};
use serde::{Deserialize, Serialize};

/// Selects the columns a predicate applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Extractor {
    /// A meta attribute of the event, e.g. `"time"`.
    Attribute(String),
    /// Columns whose flattened name ends with the key.
    Key(String),
    /// Columns of exactly this type.
    Type(Type),
}

/// One relational predicate: extractor, operator, literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub lhs: Extractor,
    pub op: RelOp,
    pub rhs: Data,
}

impl Predicate {
    pub fn new(lhs: Extractor, op: RelOp, rhs: impl Into<Data>) -> Predicate {
        Predicate {
            lhs,
            op,
            rhs: rhs.into(),
        }
    }
}

/// The expression AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Conjunction(Vec<Expr>),
    Disjunction(Vec<Expr>),
    Negation(Box<Expr>),
    Predicate(Predicate),
}

impl Expr {
    /// Shorthand for a key-extractor predicate.
    pub fn key(key: impl Into<String>, op: RelOp, rhs: impl Into<Data>) -> Expr {
        Expr::Predicate(Predicate::new(Extractor::Key(key.into()), op, rhs))
    }

    /// Shorthand for a type-extractor predicate.
    pub fn typed(ty: Type, op: RelOp, rhs: impl Into<Data>) -> Expr {
        Expr::Predicate(Predicate::new(Extractor::Type(ty), op, rhs))
    }

    /// Shorthand for an attribute-extractor predicate.
    pub fn attribute(name: impl Into<String>, op: RelOp, rhs: impl Into<Data>) -> Expr {
        Expr::Predicate(Predicate::new(Extractor::Attribute(name.into()), op, rhs))
    }

    /// Rewrites the expression into negation normal form: negations are
    /// pushed down through De Morgan's laws and folded into the predicate
    /// operators. Normalization is idempotent.
    pub fn normalize(self) -> Expr {
        self.into_nnf(false)
    }

    fn into_nnf(self, negate: bool) -> Expr {
        match self {
            Expr::Conjunction(xs) => {
                let ys = xs.into_iter().map(|x| x.into_nnf(negate)).collect();
                if negate {
                    Expr::Disjunction(ys)
                } else {
                    Expr::Conjunction(ys)
                }
            }
            Expr::Disjunction(xs) => {
                let ys = xs.into_iter().map(|x| x.into_nnf(negate)).collect();
                if negate {
                    Expr::Conjunction(ys)
                } else {
                    Expr::Disjunction(ys)
                }
            }
            Expr::Negation(x) => x.into_nnf(!negate),
            Expr::Predicate(mut p) => {
                if negate {
                    p.op = p.op.negate();
                }
                Expr::Predicate(p)
            }
        }
    }

    /// Calls `f` for every predicate in the expression.
    pub fn for_each_predicate(&self, f: &mut impl FnMut(&Predicate)) {
        match self {
            Expr::Conjunction(xs) | Expr::Disjunction(xs) => {
                for x in xs {
                    x.for_each_predicate(f);
                }
            }
            Expr::Negation(x) => x.for_each_predicate(f),
            Expr::Predicate(p) => f(p),
        }
    }

    /// An expression is well-formed iff it contains no empty conjunction or
    /// disjunction.
    pub fn is_well_formed(&self) -> bool {
        match self {
            Expr::Conjunction(xs) | Expr::Disjunction(xs) => {
                !xs.is_empty() && xs.iter().all(Expr::is_well_formed)
            }
            Expr::Negation(x) => x.is_well_formed(),
            Expr::Predicate(_) => true,
        }
    }
}

impl Display for Extractor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Extractor::Attribute(name) => write!(f, "&{name}"),
            Extractor::Key(key) => write!(f, "{key}"),
            Extractor::Type(ty) => write!(f, ":{ty}"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Conjunction(xs) => {
                let items = xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
                write!(f, "({})", items.join(" && "))
            }
            Expr::Disjunction(xs) => {
                let items = xs.iter().map(|x| x.to_string()).collect::<Vec<_>>();
                write!(f, "({})", items.join(" || "))
            }
            Expr::Negation(x) => write!(f, "!{x}"),
            Expr::Predicate(p) => write!(f, "{} {} {}", p.lhs, p.op, p.rhs),
        }
    }
}
