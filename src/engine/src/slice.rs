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

//! Table slices: the unit of ingest.

use datatypes::{type_check, Data, Type};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{Result, TypeCheckSnafu};

/// A batch of rows sharing one flat layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSlice {
    layout: Type,
    rows: Vec<Vec<Data>>,
}

impl TableSlice {
    pub fn layout(&self) -> &Type {
        &self.layout
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> usize {
        self.layout.fields().map(|f| f.len()).unwrap_or(0)
    }

    pub fn at(&self, row: usize, col: usize) -> &Data {
        &self.rows[row][col]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[Data]> {
        self.rows.iter().map(|r| r.as_slice())
    }
}

/// Builds a [TableSlice] cell by cell, column-major within each row.
///
/// Every appended cell is type-checked against the column under the cursor;
/// a full row commits and resets the cursor.
#[derive(Debug)]
pub struct SliceBuilder {
    layout: Type,
    rows: Vec<Vec<Data>>,
    row: Vec<Data>,
}

impl SliceBuilder {
    /// Creates a builder over the flattened form of `layout`.
    pub fn new(layout: Type) -> SliceBuilder {
        let layout = layout.flatten();
        SliceBuilder {
            layout,
            rows: Vec::new(),
            row: Vec::new(),
        }
    }

    pub fn layout(&self) -> &Type {
        &self.layout
    }

    /// The number of committed rows.
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Hints the expected number of rows.
    pub fn reserve(&mut self, rows: usize) {
        self.rows.reserve(rows);
    }

    /// Appends one cell at the column cursor.
    pub fn append(&mut self, x: Data) -> Result<()> {
        let fields = self.layout.fields().unwrap_or(&[]);
        let col = self.row.len();
        debug_assert!(col < fields.len());
        let field = &fields[col];
        ensure!(
            type_check(&field.ty, &x),
            TypeCheckSnafu {
                column: field.name.clone(),
                value: x.to_string(),
            }
        );
        self.row.push(x);
        if self.row.len() == fields.len() {
            let row = std::mem::take(&mut self.row);
            self.rows.push(row);
        }
        Ok(())
    }

    /// Finishes the slice. An incomplete row is committed padded with nil
    /// values rather than dropped.
    pub fn finish(mut self) -> TableSlice {
        let columns = self.layout.fields().map(|f| f.len()).unwrap_or(0);
        if !self.row.is_empty() {
            self.row.resize(columns, Data::None);
            self.rows.push(self.row);
        }
        TableSlice {
            layout: self.layout,
            rows: self.rows,
        }
    }
}
