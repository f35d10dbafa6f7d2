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

//! Partitions: sealed, append-only column stores.
//!
//! A partition owns one indexer actor per indexed column, grouped by
//! layout. Row ids are global: the partition covers the dense id range
//! starting at its base offset.

use std::collections::BTreeMap;
use std::sync::Arc;

use datatypes::Type;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::expr::Expr;
use crate::indexer::{matches_column, spawn_indexer, IndexerHandle, IndexerOptions};
use crate::slice::TableSlice;

pub type PartitionRef = Arc<Partition>;

/// Per-column indexers of one layout. Columns with a `"skip"` attribute or
/// an unindexable type hold no indexer and are searchable only via scan.
#[derive(Debug)]
pub struct TableIndex {
    layout: Type,
    indexers: Vec<Option<IndexerHandle>>,
}

impl TableIndex {
    fn new(layout: &Type, options: IndexerOptions) -> TableIndex {
        let fields = layout.fields().unwrap_or(&[]);
        let indexers = fields
            .iter()
            .map(|field| {
                if field.ty.attr("skip").is_some() {
                    return None;
                }
                match index::ValueIndex::make(&field.ty) {
                    Some(index) => Some(spawn_indexer(
                        field.name.clone(),
                        field.ty.clone(),
                        index,
                        options,
                    )),
                    None => {
                        warn!(column = %field.name, ty = %field.ty, "column has no index");
                        None
                    }
                }
            })
            .collect();
        TableIndex {
            layout: layout.clone(),
            indexers,
        }
    }

    pub fn layout(&self) -> &Type {
        &self.layout
    }

    pub fn indexers(&self) -> &[Option<IndexerHandle>] {
        &self.indexers
    }
}

/// The durable description of a partition, sans index payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionManifest {
    pub id: Uuid,
    pub offset: u64,
    pub rows: u64,
    pub tables: Vec<TableManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableManifest {
    pub layout: Type,
    /// Whether each column carries an index payload on disk.
    pub columns: Vec<bool>,
}

#[derive(Debug)]
pub struct Partition {
    id: Uuid,
    /// Base row id; the partition covers `[offset, offset + rows)`.
    offset: u64,
    rows: u64,
    tables: BTreeMap<Type, TableIndex>,
    options: IndexerOptions,
}

impl Partition {
    pub fn new(id: Uuid, offset: u64, options: IndexerOptions) -> Partition {
        Partition {
            id,
            offset,
            rows: 0,
            tables: BTreeMap::new(),
            options,
        }
    }

    /// Reassembles a loaded partition from its manifest and column indexes.
    pub(crate) fn from_parts(
        manifest: PartitionManifest,
        mut columns: Vec<Vec<Option<index::ValueIndex>>>,
        options: IndexerOptions,
    ) -> Partition {
        let mut tables = BTreeMap::new();
        for (table, loaded) in manifest.tables.into_iter().zip(columns.drain(..)) {
            let fields = table.layout.fields().unwrap_or(&[]);
            let indexers = fields
                .iter()
                .zip(loaded)
                .map(|(field, index)| {
                    index.map(|index| {
                        spawn_indexer(field.name.clone(), field.ty.clone(), index, options)
                    })
                })
                .collect();
            tables.insert(
                table.layout.clone(),
                TableIndex {
                    layout: table.layout,
                    indexers,
                },
            );
        }
        Partition {
            id: manifest.id,
            offset: manifest.offset,
            rows: manifest.rows,
            tables,
            options,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableIndex> {
        self.tables.values()
    }

    /// The number of live indexer actors.
    pub fn indexer_count(&self) -> usize {
        self.tables
            .values()
            .flat_map(|t| t.indexers.iter())
            .filter(|i| i.is_some())
            .count()
    }

    /// Appends all rows of a slice, assigning consecutive global row ids.
    pub async fn append_slice(&mut self, slice: &TableSlice) -> Result<()> {
        let layout = slice.layout();
        if !self.tables.contains_key(layout) {
            self.tables
                .insert(layout.clone(), TableIndex::new(layout, self.options));
        }
        let Some(table) = self.tables.get(layout) else {
            return Ok(());
        };
        for row in 0..slice.rows() {
            let pos = self.offset + self.rows;
            for (col, indexer) in table.indexers.iter().enumerate() {
                if let Some(indexer) = indexer {
                    indexer.append(slice.at(row, col).clone(), pos).await?;
                }
            }
            self.rows += 1;
        }
        Ok(())
    }

    /// The indexers of all columns the expression touches.
    pub fn relevant_indexers(&self, expr: &Expr) -> Vec<IndexerHandle> {
        let mut result = Vec::new();
        for table in self.tables.values() {
            for indexer in table.indexers.iter().flatten() {
                let mut touched = false;
                expr.for_each_predicate(&mut |p| {
                    touched = touched
                        || matches_column(
                            indexer.column(),
                            indexer.ty(),
                            &p.lhs,
                            self.options.match_time_by_type,
                        );
                });
                if touched {
                    result.push(indexer.clone());
                }
            }
        }
        result
    }

    pub fn manifest(&self) -> PartitionManifest {
        PartitionManifest {
            id: self.id,
            offset: self.offset,
            rows: self.rows,
            tables: self
                .tables
                .values()
                .map(|t| TableManifest {
                    layout: t.layout.clone(),
                    columns: t.indexers.iter().map(Option::is_some).collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use datatypes::data_type::Attribute;
    use datatypes::{Data, Field, RelOp};

    use super::*;
    use crate::slice::SliceBuilder;

    fn layout() -> Type {
        Type::record(vec![
            Field::new("host", Type::string()),
            Field::new("bytes", Type::uint64()),
            Field::new(
                "note",
                Type::string().with_attrs(vec![Attribute::new("skip")]),
            ),
        ])
        .with_name("flow")
    }

    fn slice(rows: &[(&str, u64)]) -> TableSlice {
        let mut builder = SliceBuilder::new(layout());
        for (host, bytes) in rows {
            builder.append(Data::from(*host)).unwrap();
            builder.append(Data::UInt(*bytes)).unwrap();
            builder.append(Data::from("ignored")).unwrap();
        }
        builder.finish()
    }

    fn options() -> IndexerOptions {
        IndexerOptions {
            mailbox: 8,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_append_and_query() {
        let mut part = Partition::new(Uuid::new_v4(), 0, options());
        part.append_slice(&slice(&[("a", 1), ("b", 2)])).await.unwrap();
        part.append_slice(&slice(&[("a", 3)])).await.unwrap();
        assert_eq!(part.rows(), 3);
        // Skip-attributed columns get no indexer.
        assert_eq!(part.indexer_count(), 2);

        let expr = Expr::key("host", RelOp::Equal, "a");
        let indexers = part.relevant_indexers(&expr);
        assert_eq!(indexers.len(), 1);
        let hits = indexers[0].lookup(expr).await.unwrap();
        assert_eq!(hits.to_vec(), [0, 2]);
    }

    #[tokio::test]
    async fn test_global_row_ids_start_at_offset() {
        let mut part = Partition::new(Uuid::new_v4(), 100, options());
        part.append_slice(&slice(&[("a", 1)])).await.unwrap();
        let expr = Expr::key("bytes", RelOp::Equal, 1u64);
        let indexers = part.relevant_indexers(&expr);
        let hits = indexers[0].lookup(expr).await.unwrap();
        assert_eq!(hits.to_vec(), [100]);
    }

    #[tokio::test]
    async fn test_time_selection_follows_toggle() {
        let timed = Type::record(vec![
            Field::new("ts", Type::timestamp()),
            Field::new(
                "written",
                Type::timestamp().with_attrs(vec![Attribute::new("timestamp")]),
            ),
        ])
        .with_name("log");
        let mut builder = SliceBuilder::new(timed.clone());
        builder.append(Data::Timestamp(1)).unwrap();
        builder.append(Data::Timestamp(2)).unwrap();
        let slice = builder.finish();
        let expr = Expr::attribute("time", RelOp::Equal, Data::Timestamp(1));

        let mut widened = Partition::new(Uuid::new_v4(), 0, options());
        widened.append_slice(&slice).await.unwrap();
        assert_eq!(widened.relevant_indexers(&expr).len(), 2);

        let mut tightened = Partition::new(
            Uuid::new_v4(),
            0,
            IndexerOptions {
                match_time_by_type: false,
                ..options()
            },
        );
        tightened.append_slice(&slice).await.unwrap();
        let indexers = tightened.relevant_indexers(&expr);
        assert_eq!(indexers.len(), 1);
        assert_eq!(indexers[0].column(), "written");
    }

    #[tokio::test]
    async fn test_manifest_reflects_columns() {
        let mut part = Partition::new(Uuid::new_v4(), 0, options());
        part.append_slice(&slice(&[("a", 1)])).await.unwrap();
        let manifest = part.manifest();
        assert_eq!(manifest.rows, 1);
        assert_eq!(manifest.tables.len(), 1);
        assert_eq!(manifest.tables[0].columns, vec![true, true, false]);
    }
}
