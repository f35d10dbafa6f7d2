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

//! Collector workers.
//!
//! A collector fans one expression out to the column indexers of a batch of
//! partitions, OR-merges the per-column bitmaps of each partition, streams
//! one result message per finished partition to the client, and returns
//! itself to the dispatcher's idle pool.

use std::collections::HashMap;

use futures::stream::{FuturesUnordered, StreamExt};
use index::Bitmap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::expr::Expr;
use crate::indexer::IndexerHandle;

/// Messages streamed back to the query client.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryHit {
    /// All sub-results of one partition, OR-merged. Row ids are global.
    Partition { id: Uuid, hits: Bitmap },
    /// The scheduled batch is exhausted.
    Done,
}

pub type QueryClient = mpsc::Sender<QueryHit>;

/// One batch of work for a collector.
pub(crate) struct CollectorTask {
    pub expr: Expr,
    pub queries: Vec<(Uuid, Vec<IndexerHandle>)>,
    pub client: QueryClient,
}

#[derive(Debug, Clone)]
pub(crate) struct CollectorHandle {
    pub id: usize,
    sender: mpsc::Sender<CollectorTask>,
}

impl CollectorHandle {
    pub(crate) async fn run_task(&self, task: CollectorTask) -> bool {
        self.sender.send(task).await.is_ok()
    }
}

/// The dispatcher-facing half of the idle-worker notification.
pub(crate) type WorkerPool = mpsc::Sender<CollectorHandle>;

/// Spawns one collector; it announces itself idle before taking work.
pub(crate) fn spawn_collector(id: usize, pool: WorkerPool, mailbox: usize) -> tokio::task::JoinHandle<()> {
    let (sender, receiver) = mpsc::channel(mailbox);
    let handle = CollectorHandle { id, sender };
    tokio::spawn(collect(handle, pool, receiver))
}

async fn collect(
    handle: CollectorHandle,
    pool: WorkerPool,
    mut receiver: mpsc::Receiver<CollectorTask>,
) {
    debug!(collector = handle.id, "collector starts");
    if pool.send(handle.clone()).await.is_err() {
        return;
    }
    while let Some(task) = receiver.recv().await {
        run(&handle, task).await;
        // Ask for more work after delivering the last sub result.
        if pool.send(handle.clone()).await.is_err() {
            break;
        }
    }
    debug!(collector = handle.id, "collector exits");
}

async fn run(handle: &CollectorHandle, task: CollectorTask) {
    let CollectorTask {
        expr,
        queries,
        client,
    } = task;
    debug!(
        collector = handle.id,
        partitions = queries.len(),
        expr = %expr,
        "got a new query"
    );
    let mut open: HashMap<Uuid, (usize, Bitmap)> = HashMap::new();
    let mut lookups = FuturesUnordered::new();
    for (id, indexers) in queries {
        if indexers.is_empty() {
            // No column of this partition can answer the expression.
            let _ = client
                .send(QueryHit::Partition {
                    id,
                    hits: Bitmap::new(),
                })
                .await;
            continue;
        }
        open.insert(id, (indexers.len(), Bitmap::new()));
        for indexer in indexers {
            let expr = expr.clone();
            lookups.push(async move { (id, indexer.column().to_string(), indexer.lookup(expr).await) });
        }
    }
    while let Some((id, column, result)) = lookups.next().await {
        let Some((remaining, acc)) = open.get_mut(&id) else {
            continue;
        };
        match result {
            Ok(bitmap) => *acc |= &bitmap,
            // A failing column contributes nothing; the partition result
            // stays a sound superset of the other columns.
            Err(e) => warn!(partition = %id, column = %column, error = %e, "indexer lookup failed"),
        }
        *remaining -= 1;
        if *remaining == 0 {
            let (_, hits) = open.remove(&id).unwrap_or((0, Bitmap::new()));
            debug!(partition = %id, "collected all sub results");
            let _ = client.send(QueryHit::Partition { id, hits }).await;
        }
    }
    let _ = client.send(QueryHit::Done).await;
}
