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

use datatypes::RelOp;
use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Value does not match the column type: {value}"))]
    TypeClash { value: String, location: Location },

    #[snafu(display("Unsupported operator: {op}"))]
    UnsupportedOperator { op: RelOp, location: Location },

    #[snafu(display("Out of order append, position: {pos}, offset: {offset}"))]
    OutOfOrderAppend {
        pos: u64,
        offset: u64,
        location: Location,
    },

    #[snafu(display("Invalid subnet prefix length: {length}"))]
    InvalidPrefixLength { length: u8, location: Location },

    #[snafu(display("Failed to parse base specification: {input}"))]
    ParseBase { input: String, location: Location },
}

pub type Result<T> = std::result::Result<T, Error>;
