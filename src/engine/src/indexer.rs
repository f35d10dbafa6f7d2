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

//! Per-column indexer actors.
//!
//! An indexer owns the [ValueIndex] of one column and serves appends,
//! expression lookups, and persistence requests over its mailbox. The task
//! exits when the last handle is dropped.

use std::path::PathBuf;

use datatypes::data_type::TypeKind;
use datatypes::{Data, Type};
use index::{Bitmap, ValueIndex};
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{IndexerGoneSnafu, IndexSnafu, Result, SerializeSnafu};
use crate::expr::{Expr, Extractor};

/// Knobs a partition passes on to every indexer actor it spawns.
///
/// `match_time_by_type` must agree with the meta index's setting, otherwise
/// pruning and execution would select different columns for the `"time"`
/// attribute and real matches could be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerOptions {
    /// Mailbox bound of each indexer actor.
    pub mailbox: usize,
    /// When set, the `"time"` attribute extractor selects every column of
    /// type timestamp instead of only columns carrying a `"timestamp"`
    /// attribute.
    pub match_time_by_type: bool,
}

impl Default for IndexerOptions {
    fn default() -> IndexerOptions {
        IndexerOptions {
            mailbox: 128,
            match_time_by_type: true,
        }
    }
}

impl From<&EngineConfig> for IndexerOptions {
    fn from(config: &EngineConfig) -> IndexerOptions {
        IndexerOptions {
            mailbox: config.channel_size,
            match_time_by_type: config.match_time_by_type,
        }
    }
}

/// Whether a predicate extractor selects a column of the given flattened
/// name and type.
pub(crate) fn matches_column(
    column: &str,
    ty: &Type,
    extractor: &Extractor,
    match_time_by_type: bool,
) -> bool {
    match extractor {
        Extractor::Attribute(name) => {
            name == "time"
                && if match_time_by_type {
                    matches!(ty.unwrapped().kind(), TypeKind::Timestamp)
                } else {
                    ty.attr("timestamp").is_some()
                }
        }
        Extractor::Key(key) => column.ends_with(key.as_str()),
        Extractor::Type(t) => ty == t,
    }
}

pub(crate) enum IndexerRequest {
    Append {
        data: Data,
        pos: u64,
    },
    Lookup {
        expr: Expr,
        reply: oneshot::Sender<Result<Bitmap>>,
    },
    Persist {
        path: PathBuf,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// A cloneable handle to one indexer actor.
#[derive(Debug, Clone)]
pub struct IndexerHandle {
    column: String,
    ty: Type,
    options: IndexerOptions,
    sender: mpsc::Sender<IndexerRequest>,
}

impl IndexerHandle {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn options(&self) -> IndexerOptions {
        self.options
    }

    pub(crate) async fn append(&self, data: Data, pos: u64) -> Result<()> {
        self.sender
            .send(IndexerRequest::Append { data, pos })
            .await
            .map_err(|_| {
                IndexerGoneSnafu {
                    column: self.column.clone(),
                }
                .build()
            })
    }

    /// Evaluates the expression over this column.
    pub async fn lookup(&self, expr: Expr) -> Result<Bitmap> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(IndexerRequest::Lookup { expr, reply })
            .await
            .map_err(|_| {
                IndexerGoneSnafu {
                    column: self.column.clone(),
                }
                .build()
            })?;
        rx.await.map_err(|_| {
            IndexerGoneSnafu {
                column: self.column.clone(),
            }
            .build()
        })?
    }

    pub(crate) async fn persist(&self, path: PathBuf, reply: oneshot::Sender<Result<()>>) {
        if self
            .sender
            .send(IndexerRequest::Persist { path, reply })
            .await
            .is_err()
        {
            warn!(column = %self.column, "indexer is gone, dropping persist request");
        }
    }
}

/// Spawns the indexer task for one column. The task exits when the last
/// handle is dropped.
pub(crate) fn spawn_indexer(
    column: String,
    ty: Type,
    index: ValueIndex,
    options: IndexerOptions,
) -> IndexerHandle {
    let (sender, receiver) = mpsc::channel(options.mailbox);
    let handle = IndexerHandle {
        column: column.clone(),
        ty: ty.clone(),
        options,
        sender,
    };
    let indexer = Indexer {
        column,
        ty,
        options,
        index,
    };
    tokio::spawn(indexer.run(receiver));
    handle
}

struct Indexer {
    column: String,
    ty: Type,
    options: IndexerOptions,
    index: ValueIndex,
}

impl Indexer {
    async fn run(mut self, mut receiver: mpsc::Receiver<IndexerRequest>) {
        while let Some(request) = receiver.recv().await {
            match request {
                IndexerRequest::Append { data, pos } => {
                    if let Err(e) = self.index.append_at(&data, pos) {
                        // An append error affects this column only.
                        warn!(column = %self.column, error = %e, "failed to append");
                    }
                }
                IndexerRequest::Lookup { expr, reply } => {
                    let _ = reply.send(self.evaluate(&expr));
                }
                IndexerRequest::Persist { path, reply } => {
                    let _ = reply.send(self.persist(&path).await);
                }
            }
        }
        debug!(column = %self.column, "indexer exits");
    }

    /// Evaluates the parts of the expression that concern this column; an
    /// expression with no such part yields the empty bitmap.
    fn evaluate(&self, expr: &Expr) -> Result<Bitmap> {
        let result = self.eval(expr)?;
        Ok(result.unwrap_or_else(|| Bitmap::sized(self.index.offset(), false)))
    }

    fn eval(&self, expr: &Expr) -> Result<Option<Bitmap>> {
        match expr {
            Expr::Conjunction(xs) => {
                let mut acc: Option<Bitmap> = None;
                for x in xs {
                    if let Some(bm) = self.eval(x)? {
                        acc = Some(match acc {
                            Some(prev) => &prev & &bm,
                            None => bm,
                        });
                    }
                }
                Ok(acc)
            }
            Expr::Disjunction(xs) => {
                let mut acc: Option<Bitmap> = None;
                for x in xs {
                    if let Some(bm) = self.eval(x)? {
                        acc = Some(match acc {
                            Some(prev) => &prev | &bm,
                            None => bm,
                        });
                    }
                }
                Ok(acc)
            }
            Expr::Negation(x) => {
                let Some(mut bm) = self.eval(x)? else {
                    return Ok(None);
                };
                bm.extend_to(self.index.offset());
                bm.flip();
                Ok(Some(&bm & &self.index.valid()))
            }
            Expr::Predicate(p) => {
                if matches_column(
                    &self.column,
                    &self.ty,
                    &p.lhs,
                    self.options.match_time_by_type,
                ) {
                    let bm = self.index.lookup(p.op, &p.rhs).context(IndexSnafu)?;
                    Ok(Some(bm))
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn persist(&self, path: &std::path::Path) -> Result<()> {
        let bytes = bincode::serialize(&self.index).with_context(|_| SerializeSnafu {
            what: format!("index of column {}", self.column),
        })?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|_| crate::error::IoSnafu {
                path: path.to_path_buf(),
            })
    }
}
