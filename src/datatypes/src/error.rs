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

use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to parse address: {input}"))]
    ParseAddress { input: String, location: Location },

    #[snafu(display("Failed to parse subnet: {input}"))]
    ParseSubnet { input: String, location: Location },

    #[snafu(display("Failed to parse port: {input}"))]
    ParsePort { input: String, location: Location },

    #[snafu(display("Invalid subnet prefix length: {length}"))]
    InvalidPrefixLength { length: u16, location: Location },

    #[snafu(display("Duplicate record field: {name}"))]
    DuplicateField { name: String, location: Location },
}

pub type Result<T> = std::result::Result<T, Error>;
