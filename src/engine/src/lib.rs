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

//! The telemetry query engine.
//!
//! Events arrive as [TableSlice](slice::TableSlice)s, land in columnar
//! partitions with per-column bitmap indexes, and are summarized in a
//! [MetaIndex](meta::MetaIndex) of per-column synopses. Queries are boolean
//! [expressions](expr::Expr): the meta index prunes the candidate partition
//! set, the [dispatcher](dispatcher) schedules an initial taste of
//! partitions on collector workers, and clients pull the rest through
//! continuations.

pub mod cache;
pub mod collector;
pub mod config;
pub mod dispatcher;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod error;
pub mod expr;
pub mod indexer;
pub mod meta;
pub mod partition;
pub mod slice;
pub mod store;
pub mod synopsis;

pub use collector::{QueryClient, QueryHit};
pub use config::EngineConfig;
pub use dispatcher::QueryResponse;
pub use engine::Engine;
pub use expr::{Expr, Extractor, Predicate};
pub use indexer::IndexerOptions;
pub use slice::{SliceBuilder, TableSlice};
pub use store::{FsStore, PartitionStore};
