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

use std::path::PathBuf;

use snafu::{Location, Snafu};
use uuid::Uuid;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid expression: {reason}"))]
    InvalidExpression { reason: String, location: Location },

    #[snafu(display("Value does not type-check against column {column}: {value}"))]
    TypeCheck {
        column: String,
        value: String,
        location: Location,
    },

    #[snafu(display("Index operation failed"))]
    Index {
        source: index::error::Error,
        location: Location,
    },

    #[snafu(display("Failed to access {}", path.display()))]
    Io {
        path: PathBuf,
        #[snafu(source)]
        error: std::io::Error,
        location: Location,
    },

    #[snafu(display("Failed to serialize {what}"))]
    Serialize {
        what: String,
        #[snafu(source)]
        error: bincode::Error,
        location: Location,
    },

    #[snafu(display("Failed to deserialize {what}"))]
    Deserialize {
        what: String,
        #[snafu(source)]
        error: bincode::Error,
        location: Location,
    },

    #[snafu(display("Partition {id} not found in the store"))]
    PartitionNotFound { id: Uuid, location: Location },

    #[snafu(display("Indexer for column {column} is gone"))]
    IndexerGone { column: String, location: Location },

    #[snafu(display("The engine has stopped"))]
    EngineClosed { location: Location },

    #[snafu(display("Failed to join a background task"))]
    Join {
        #[snafu(source)]
        error: tokio::task::JoinError,
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
