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

//! Type system and runtime values for semistructured telemetry events.
//!
//! A [Type](crate::data_type::Type) describes the shape of an event column,
//! a [Data](crate::value::Data) holds a runtime value of that shape, and a
//! [RelOp](crate::op::RelOp) names the relational operator of a predicate.

pub mod data_type;
pub mod error;
pub mod op;
pub mod schema;
pub mod value;

pub use data_type::{congruent, type_check, Attribute, Field, Type, TypeKind};
pub use op::RelOp;
pub use value::{Address, Data, Port, Protocol, Subnet};
