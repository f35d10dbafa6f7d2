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

//! The engine facade.

use std::sync::Arc;

use datatypes::Data;
use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collector::{spawn_collector, QueryClient};
use crate::config::EngineConfig;
use crate::dispatcher::{Dispatcher, EngineRequest, QueryResponse};
use crate::error::{EngineClosedSnafu, Result};
use crate::expr::Expr;
use crate::meta::MetaIndex;
use crate::slice::TableSlice;
use crate::store::PartitionStore;

/// The public face of the telemetry engine.
///
/// All state lives on the dispatcher task; this handle only forwards
/// messages. Clones are cheap and share the same engine.
#[derive(Clone)]
pub struct Engine {
    sender: mpsc::Sender<EngineRequest>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Engine {
    /// Starts the dispatcher and its collector workers, restoring the meta
    /// index from the store.
    pub async fn start(mut config: EngineConfig, store: Arc<dyn PartitionStore>) -> Result<Engine> {
        config.sanitize();
        let mut meta = match store.load_meta().await? {
            Some(image) => {
                info!("loaded meta index");
                MetaIndex::from_image(image)
            }
            None => MetaIndex::new(),
        };
        meta.set_option(
            "max-partition-size",
            Data::UInt(config.max_partition_size as u64),
        );
        // Pruning and indexer execution must agree on how `"time"`
        // predicates select columns.
        meta.match_time_by_type = config.match_time_by_type;
        // Resume the global row id sequence after the persisted partitions.
        let mut next_row_id = 0;
        for id in meta.partition_ids() {
            match store.load_manifest(id).await {
                Ok(manifest) => next_row_id = next_row_id.max(manifest.offset + manifest.rows),
                Err(e) => warn!(partition = %id, error = %e, "failed to read manifest"),
            }
        }

        let (sender, receiver) = mpsc::channel(config.channel_size);
        let (pool_sender, pool_receiver) = mpsc::channel(config.num_workers.max(1));
        for id in 0..config.num_workers {
            spawn_collector(id, pool_sender.clone(), config.channel_size);
        }
        let dispatcher = Dispatcher::new(
            config,
            meta,
            store,
            next_row_id,
            receiver,
            pool_receiver,
            sender.clone(),
        );
        let handle = tokio::spawn(dispatcher.run());
        Ok(Engine {
            sender,
            handle: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Submits an expression. The immediate response carries the candidate
    /// count and the size of the first scheduled batch; per-partition
    /// bitmaps arrive on `client`.
    pub async fn query(&self, expr: Expr, client: QueryClient) -> Result<QueryResponse> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(EngineRequest::Query {
                expr,
                client,
                reply,
            })
            .await
            .map_err(|_| EngineClosedSnafu.build())?;
        rx.await.map_err(|_| EngineClosedSnafu.build())?
    }

    /// Requests `n` more partitions for a running query; `n == 0` cancels
    /// the remainder.
    pub async fn continue_query(&self, query_id: Uuid, n: u64) -> Result<()> {
        self.sender
            .send(EngineRequest::ContinueQuery { query_id, n })
            .await
            .map_err(|_| EngineClosedSnafu.build())
    }

    /// Ingests one table slice into the active partition.
    pub async fn ingest(&self, slice: TableSlice) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(EngineRequest::Ingest { slice, reply })
            .await
            .map_err(|_| EngineClosedSnafu.build())?;
        rx.await.map_err(|_| EngineClosedSnafu.build())?
    }

    /// Seals the active partition and writes the meta index image.
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(EngineRequest::Flush { reply })
            .await
            .map_err(|_| EngineClosedSnafu.build())?;
        rx.await.map_err(|_| EngineClosedSnafu.build())?
    }

    /// Flushes and stops the dispatcher.
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(EngineRequest::Stop { reply })
            .await
            .map_err(|_| EngineClosedSnafu.build())?;
        let result = rx.await.map_err(|_| EngineClosedSnafu.build())?;
        if let Some(handle) = self.handle.lock().await.take() {
            handle.await.context(crate::error::JoinSnafu)?;
        }
        result
    }
}
