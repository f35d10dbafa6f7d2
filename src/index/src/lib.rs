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

//! Bitmap indexes for telemetry columns.
//!
//! The building blocks are a compressed append-only [Bitmap](bitmap::Bitmap)
//! and a family of [coders](bitmap_index::coder) that map column values to
//! bitmaps. A [ValueIndex](value_index::ValueIndex) ties one coder stack to
//! one typed column and answers relational predicates with bitmaps of
//! matching row positions.

pub mod bitmap;
pub mod bitmap_index;
pub mod error;
pub mod value_index;

pub use bitmap::Bitmap;
pub use value_index::ValueIndex;
