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

//! The meta index prunes the candidate partition set of a query.
//!
//! It keeps one [Synopsis] per (partition, layout, column) and evaluates an
//! expression to a sorted list of partition ids that may contain matches.
//! Soundness: a partition holding a matching event is always in the result;
//! partitions without matches may be, too.

use std::collections::{BTreeMap, BTreeSet};

use datatypes::data_type::TypeKind;
use datatypes::{Data, Field, Type};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::expr::{Expr, Extractor, Predicate};
use crate::slice::TableSlice;
use crate::synopsis::{make_synopsis, Synopsis};

/// Per-column synopses of one layout, `None` for unsummarizable columns.
pub type TableSynopsis = Vec<Option<Synopsis>>;

/// Identifies the synopsis factory that produced an image.
pub const DEFAULT_FACTORY_ID: [u8; 4] = *b"SyDf";

/// The serialized form: factory id, options, then the synopsis map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaImage {
    factory_id: [u8; 4],
    options: BTreeMap<String, Data>,
    partition_synopses: BTreeMap<Uuid, BTreeMap<Type, TableSynopsis>>,
}

#[derive(Debug)]
pub struct MetaIndex {
    factory_id: [u8; 4],
    options: BTreeMap<String, Data>,
    partition_synopses: BTreeMap<Uuid, BTreeMap<Type, TableSynopsis>>,
    /// Layouts for which no column synopsis could be constructed; skipped on
    /// further inserts.
    blacklist: BTreeSet<Type>,
    /// When set, the `"time"` attribute extractor matches every column of
    /// type timestamp instead of only columns carrying a `"timestamp"`
    /// attribute. Must agree with the
    /// [IndexerOptions](crate::indexer::IndexerOptions) of the partitions,
    /// or pruning could drop partitions the indexers would match; the
    /// engine wires both from its config.
    pub match_time_by_type: bool,
}

impl Default for MetaIndex {
    fn default() -> MetaIndex {
        MetaIndex {
            factory_id: DEFAULT_FACTORY_ID,
            options: BTreeMap::new(),
            partition_synopses: BTreeMap::new(),
            blacklist: BTreeSet::new(),
            match_time_by_type: true,
        }
    }
}

impl MetaIndex {
    pub fn new() -> MetaIndex {
        MetaIndex::default()
    }

    /// Sets a synopsis option, e.g. `"max-partition-size"`.
    pub fn set_option(&mut self, key: impl Into<String>, value: Data) {
        self.options.insert(key.into(), value);
    }

    pub fn num_partitions(&self) -> usize {
        self.partition_synopses.len()
    }

    /// All partition ids the index knows about, sorted.
    pub fn partition_ids(&self) -> Vec<Uuid> {
        self.all_partitions()
    }

    /// Routes every cell of the slice into the synopses of its partition.
    /// Layouts whose columns are all unsummarizable are blacklisted once.
    pub fn add(&mut self, partition: Uuid, slice: &TableSlice) {
        let layout = slice.layout();
        if self.blacklist.contains(layout) {
            return;
        }
        let tables = self.partition_synopses.entry(partition).or_default();
        if !tables.contains_key(layout) {
            let fields = layout.fields().unwrap_or(&[]);
            let table: TableSynopsis = fields
                .iter()
                .map(|f| {
                    let syn = make_synopsis(&f.ty, &self.options);
                    if syn.is_some() {
                        debug!(column = %f.name, ty = %f.ty, "created synopsis");
                    }
                    syn
                })
                .collect();
            if table.iter().all(Option::is_none) {
                debug!(layout = %layout, "no synopsis for layout, blacklisting");
                self.blacklist.insert(layout.clone());
            }
            tables.insert(layout.clone(), table);
        }
        let Some(table) = tables.get_mut(layout) else {
            return;
        };
        for (col, syn) in table.iter_mut().enumerate() {
            if let Some(syn) = syn {
                for row in 0..slice.rows() {
                    syn.add(slice.at(row, col));
                }
            }
        }
    }

    /// Evaluates an expression to the sorted, deduplicated candidate
    /// partition list.
    pub fn lookup(&self, expr: &Expr) -> Vec<Uuid> {
        match expr {
            Expr::Conjunction(xs) => {
                let mut iter = xs.iter();
                let Some(first) = iter.next() else {
                    debug_assert!(false, "empty conjunction");
                    return self.all_partitions();
                };
                let mut result = self.lookup(first);
                for x in iter {
                    if result.is_empty() {
                        break;
                    }
                    let other = self.lookup(x);
                    if other.is_empty() {
                        return other;
                    }
                    result = intersect_sorted(&result, &other);
                }
                result
            }
            Expr::Disjunction(xs) => {
                let mut result = Vec::new();
                for x in xs {
                    let other = self.lookup(x);
                    if other.len() == self.partition_synopses.len() {
                        return other;
                    }
                    result = union_sorted(&result, &other);
                }
                result
            }
            // A synopsis may produce false positives, so negating its result
            // could produce false negatives. Fall back to the universe.
            Expr::Negation(_) => self.all_partitions(),
            Expr::Predicate(p) => self.search(p),
        }
    }

    fn search(&self, p: &Predicate) -> Vec<Uuid> {
        let matcher: Box<dyn Fn(&Field) -> bool> = match &p.lhs {
            Extractor::Attribute(name) if name == "time" => {
                if self.match_time_by_type {
                    Box::new(|f| matches!(f.ty.unwrapped().kind(), TypeKind::Timestamp))
                } else {
                    Box::new(|f| f.ty.attr("timestamp").is_some())
                }
            }
            Extractor::Attribute(name) => {
                warn!(attribute = %name, "cannot process attribute extractor");
                return self.all_partitions();
            }
            Extractor::Key(key) => {
                let key = key.clone();
                Box::new(move |f| f.name.ends_with(&key))
            }
            Extractor::Type(t) => {
                let t = t.clone();
                Box::new(move |f| f.ty == t)
            }
        };
        let mut result = Vec::new();
        let mut found_matching_synopsis = false;
        for (partition, tables) in &self.partition_synopses {
            for (layout, table) in tables {
                let fields = layout.fields().unwrap_or(&[]);
                for (field, syn) in fields.iter().zip(table) {
                    let Some(syn) = syn else { continue };
                    if !matcher(field) {
                        continue;
                    }
                    found_matching_synopsis = true;
                    if syn.lookup(p.op, &p.rhs) && result.last() != Some(partition) {
                        result.push(*partition);
                    }
                }
            }
        }
        if !found_matching_synopsis {
            // Nothing could rule the predicate out; every partition remains
            // a candidate.
            return self.all_partitions();
        }
        result.sort_unstable();
        result.dedup();
        result
    }

    fn all_partitions(&self) -> Vec<Uuid> {
        self.partition_synopses.keys().copied().collect()
    }

    pub fn to_image(&self) -> MetaImage {
        MetaImage {
            factory_id: self.factory_id,
            options: self.options.clone(),
            partition_synopses: self.partition_synopses.clone(),
        }
    }

    /// Restores an index from its serialized image, rebuilding the layout
    /// blacklist.
    pub fn from_image(image: MetaImage) -> MetaIndex {
        let mut blacklist = BTreeSet::new();
        for tables in image.partition_synopses.values() {
            for (layout, table) in tables {
                if table.iter().all(Option::is_none) {
                    blacklist.insert(layout.clone());
                }
            }
        }
        MetaIndex {
            factory_id: image.factory_id,
            options: image.options,
            partition_synopses: image.partition_synopses,
            blacklist,
            match_time_by_type: true,
        }
    }
}

fn intersect_sorted(a: &[Uuid], b: &[Uuid]) -> Vec<Uuid> {
    let mut result = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

fn union_sorted(a: &[Uuid], b: &[Uuid]) -> Vec<Uuid> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = match (a.get(i), b.get(j)) {
            (Some(x), Some(y)) if x == y => {
                i += 1;
                j += 1;
                *x
            }
            (Some(x), Some(y)) if x < y => {
                i += 1;
                *x
            }
            (Some(_), Some(y)) => {
                j += 1;
                *y
            }
            (Some(x), None) => {
                i += 1;
                *x
            }
            (None, Some(y)) => {
                j += 1;
                *y
            }
            (None, None) => break,
        };
        result.push(next);
    }
    result
}
