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

//! The query dispatcher.
//!
//! The dispatcher owns all mutable engine state: the meta index, the
//! partition cache, the active write-side partition, the set of partitions
//! whose seal is in flight, and the continuation state of running queries.
//! Queries are pruned through the meta index, the first `taste_partitions`
//! candidates are scheduled immediately on an idle collector, and the rest
//! waits for client continuations. When no collector is idle, query traffic
//! is deferred until one returns; ingest and bookkeeping keep flowing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::PartitionCache;
use crate::collector::{CollectorHandle, CollectorTask, QueryClient};
use crate::config::EngineConfig;
use crate::error::{IndexerGoneSnafu, InvalidExpressionSnafu, Result};
use crate::expr::Expr;
use crate::indexer::{IndexerHandle, IndexerOptions};
use crate::meta::MetaIndex;
use crate::partition::{Partition, PartitionRef};
use crate::slice::TableSlice;
use crate::store::PartitionStore;

/// The immediate answer to a new query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    /// Nil when no continuation state was created.
    pub query_id: Uuid,
    /// Number of candidate partitions after pruning.
    pub hits: u64,
    /// Number of partitions scheduled for the initial taste.
    pub scheduled: u64,
}

pub(crate) enum EngineRequest {
    Query {
        expr: Expr,
        client: QueryClient,
        reply: oneshot::Sender<Result<QueryResponse>>,
    },
    ContinueQuery {
        query_id: Uuid,
        n: u64,
    },
    Ingest {
        slice: TableSlice,
        reply: oneshot::Sender<Result<()>>,
    },
    Flush {
        reply: oneshot::Sender<Result<()>>,
    },
    SealAck {
        id: Uuid,
        result: Result<()>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Ack count of a partition whose seal cannot make progress anymore.
const STUCK: usize = usize::MAX;

struct LookupState {
    expr: Expr,
    client: QueryClient,
    partitions: Vec<Uuid>,
}

enum Deferred {
    Query {
        expr: Expr,
        client: QueryClient,
        reply: oneshot::Sender<Result<QueryResponse>>,
    },
    Continue {
        query_id: Uuid,
        n: u64,
    },
}

pub(crate) struct Dispatcher {
    config: EngineConfig,
    meta: MetaIndex,
    cache: PartitionCache,
    store: Arc<dyn PartitionStore>,
    active: Option<Partition>,
    next_row_id: u64,
    unpersisted: Vec<(PartitionRef, usize)>,
    pending: HashMap<Uuid, LookupState>,
    idle_workers: VecDeque<CollectorHandle>,
    deferred: VecDeque<Deferred>,
    receiver: mpsc::Receiver<EngineRequest>,
    workers: mpsc::Receiver<CollectorHandle>,
    self_sender: mpsc::Sender<EngineRequest>,
}

impl Dispatcher {
    pub(crate) fn new(
        config: EngineConfig,
        meta: MetaIndex,
        store: Arc<dyn PartitionStore>,
        next_row_id: u64,
        receiver: mpsc::Receiver<EngineRequest>,
        workers: mpsc::Receiver<CollectorHandle>,
        self_sender: mpsc::Sender<EngineRequest>,
    ) -> Dispatcher {
        let cache = PartitionCache::new(config.in_mem_partitions);
        Dispatcher {
            config,
            meta,
            cache,
            store,
            active: None,
            next_row_id,
            unpersisted: Vec::new(),
            pending: HashMap::new(),
            idle_workers: VecDeque::new(),
            deferred: VecDeque::new(),
            receiver,
            workers,
            self_sender,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            taste_partitions = self.config.taste_partitions,
            in_mem_partitions = self.config.in_mem_partitions,
            "dispatcher starts"
        );
        loop {
            tokio::select! {
                biased;
                worker = self.workers.recv() => {
                    let Some(worker) = worker else { break };
                    debug!(collector = worker.id, "worker ready");
                    self.idle_workers.push_back(worker);
                    self.drain_deferred().await;
                }
                request = self.receiver.recv() => {
                    let Some(request) = request else { break };
                    if !self.handle_request(request).await {
                        break;
                    }
                }
            }
        }
        info!("dispatcher exits");
    }

    /// Returns `false` when the dispatcher should stop.
    async fn handle_request(&mut self, request: EngineRequest) -> bool {
        match request {
            EngineRequest::Query { expr, client, reply } => {
                if self.idle_workers.is_empty() {
                    debug!("no idle worker, deferring query");
                    self.deferred.push_back(Deferred::Query { expr, client, reply });
                } else {
                    self.handle_query(expr, client, reply).await;
                }
            }
            EngineRequest::ContinueQuery { query_id, n } => {
                if self.idle_workers.is_empty() {
                    self.deferred.push_back(Deferred::Continue { query_id, n });
                } else {
                    self.handle_continue(query_id, n).await;
                }
            }
            EngineRequest::Ingest { slice, reply } => {
                let result = self.handle_ingest(slice).await;
                let _ = reply.send(result);
            }
            EngineRequest::Flush { reply } => {
                let _ = reply.send(self.handle_flush().await);
            }
            EngineRequest::SealAck { id, result } => self.handle_seal_ack(id, result),
            EngineRequest::Stop { reply } => {
                let result = self.handle_flush().await;
                self.drain_unpersisted().await;
                let _ = reply.send(result);
                return false;
            }
        }
        true
    }

    async fn drain_deferred(&mut self) {
        while !self.idle_workers.is_empty() {
            let Some(task) = self.deferred.pop_front() else {
                break;
            };
            match task {
                Deferred::Query { expr, client, reply } => {
                    self.handle_query(expr, client, reply).await
                }
                Deferred::Continue { query_id, n } => self.handle_continue(query_id, n).await,
            }
        }
    }

    async fn handle_query(
        &mut self,
        expr: Expr,
        client: QueryClient,
        reply: oneshot::Sender<Result<QueryResponse>>,
    ) {
        if !expr.is_well_formed() {
            let _ = reply.send(
                InvalidExpressionSnafu {
                    reason: "empty conjunction or disjunction".to_string(),
                }
                .fail(),
            );
            return;
        }
        let expr = expr.normalize();
        let mut candidates = self.meta.lookup(&expr);
        debug!(candidates = candidates.len(), expr = %expr, "pruned candidate partitions");
        if candidates.is_empty() {
            let _ = reply.send(Ok(QueryResponse {
                query_id: Uuid::nil(),
                hits: 0,
                scheduled: 0,
            }));
            return;
        }
        let hits = candidates.len() as u64;
        let taste = self.config.taste_partitions;
        if candidates.len() <= taste {
            debug!("can schedule all partitions immediately");
            match self.locate_indexers(&expr, &candidates).await {
                Ok(queries) => {
                    self.schedule(expr, queries, client).await;
                    let _ = reply.send(Ok(QueryResponse {
                        query_id: Uuid::nil(),
                        hits,
                        scheduled: hits,
                    }));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            }
            return;
        }
        let query_id = Uuid::new_v4();
        // Prefer partitions that are currently cached.
        let cache = &self.cache;
        candidates.sort_by_key(|id| !cache.contains(id));
        let first: Vec<Uuid> = candidates.drain(..taste).collect();
        match self.locate_indexers(&expr, &first).await {
            Ok(queries) => {
                debug!(
                    query = %query_id,
                    scheduled = taste,
                    remaining = candidates.len(),
                    "schedules the first taste"
                );
                self.pending.insert(
                    query_id,
                    LookupState {
                        expr: expr.clone(),
                        client: client.clone(),
                        partitions: candidates,
                    },
                );
                self.schedule(expr, queries, client).await;
                let _ = reply.send(Ok(QueryResponse {
                    query_id,
                    hits,
                    scheduled: taste as u64,
                }));
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    async fn handle_continue(&mut self, query_id: Uuid, n: u64) {
        if n == 0 {
            debug!(query = %query_id, "dropped remaining results");
            self.pending.remove(&query_id);
            return;
        }
        let Some(mut state) = self.pending.remove(&query_id) else {
            warn!(query = %query_id, "got a request for an unknown query");
            return;
        };
        let cache = &self.cache;
        state.partitions.sort_by_key(|id| !cache.contains(id));
        let take = (n as usize).min(state.partitions.len());
        let batch: Vec<Uuid> = state.partitions.drain(..take).collect();
        debug!(query = %query_id, scheduled = take, "schedules more partitions");
        match self.locate_indexers(&state.expr, &batch).await {
            Ok(queries) => {
                self.schedule(state.expr.clone(), queries, state.client.clone())
                    .await;
            }
            Err(e) => {
                error!(query = %query_id, error = %e, "failed to locate indexers");
            }
        }
        if state.partitions.is_empty() {
            debug!(query = %query_id, "exhausted all partitions");
        } else {
            self.pending.insert(query_id, state);
        }
    }

    async fn schedule(
        &mut self,
        expr: Expr,
        queries: Vec<(Uuid, Vec<IndexerHandle>)>,
        client: QueryClient,
    ) {
        let Some(worker) = self.idle_workers.pop_back() else {
            error!("scheduling without an idle worker");
            return;
        };
        if !worker
            .run_task(CollectorTask {
                expr,
                queries,
                client,
            })
            .await
        {
            warn!(collector = worker.id, "collector is gone");
        }
    }

    async fn locate_indexers(
        &mut self,
        expr: &Expr,
        ids: &[Uuid],
    ) -> Result<Vec<(Uuid, Vec<IndexerHandle>)>> {
        let mut queries = Vec::with_capacity(ids.len());
        for id in ids {
            let indexers = self.partition_indexers(expr, *id).await?;
            queries.push((*id, indexers));
        }
        Ok(queries)
    }

    /// Resolves a partition to its indexers: the active partition first,
    /// then unpersisted ones, then the cache, and finally the store.
    async fn partition_indexers(&mut self, expr: &Expr, id: Uuid) -> Result<Vec<IndexerHandle>> {
        if let Some(active) = &self.active {
            if active.id() == id {
                return Ok(active.relevant_indexers(expr));
            }
        }
        if let Some((part, _)) = self.unpersisted.iter().find(|(p, _)| p.id() == id) {
            return Ok(part.relevant_indexers(expr));
        }
        if let Some(part) = self.cache.get(&id) {
            return Ok(part.relevant_indexers(expr));
        }
        debug!(partition = %id, "loads partition");
        let part = Arc::new(self.store.load(id).await?);
        let indexers = part.relevant_indexers(expr);
        self.cache.insert(id, part);
        Ok(indexers)
    }

    async fn handle_ingest(&mut self, slice: TableSlice) -> Result<()> {
        if slice.rows() == 0 {
            return Ok(());
        }
        if self.active.is_none() {
            let id = Uuid::new_v4();
            info!(partition = %id, offset = self.next_row_id, "starts a new partition");
            self.active = Some(Partition::new(
                id,
                self.next_row_id,
                IndexerOptions::from(&self.config),
            ));
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        self.meta.add(active.id(), &slice);
        active.append_slice(&slice).await?;
        self.next_row_id = active.offset() + active.rows();
        if active.rows() >= self.config.max_partition_size as u64 {
            self.seal_active().await;
        }
        Ok(())
    }

    /// Freezes the active partition: its manifest is written, every indexer
    /// is asked to persist itself, and the partition counts as unpersisted
    /// until all acks arrived. It stays queryable throughout.
    async fn seal_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if active.rows() == 0 {
            return;
        }
        let id = active.id();
        info!(partition = %id, rows = active.rows(), "seals the active partition");
        let part: PartitionRef = Arc::new(active);
        self.cache.insert(id, part.clone());
        let count = part.indexer_count();
        if let Err(e) = self.store.save_manifest(&part).await {
            // No acks will arrive, so the partition stays unpersisted and
            // queryable.
            error!(partition = %id, error = %e, "failed to write the partition manifest");
            self.unpersisted.push((part, STUCK));
            return;
        }
        if count > 0 {
            self.unpersisted.push((part.clone(), count));
        }
        for (t, table) in part.tables().enumerate() {
            for (c, indexer) in table.indexers().iter().enumerate() {
                if let Some(indexer) = indexer {
                    let path = self.store.column_path(id, t, c);
                    let column = indexer.column().to_string();
                    let (tx, rx) = oneshot::channel();
                    indexer.persist(path, tx).await;
                    let sender = self.self_sender.clone();
                    tokio::spawn(async move {
                        let result = match rx.await {
                            Ok(result) => result,
                            Err(_) => IndexerGoneSnafu { column }.fail(),
                        };
                        let _ = sender.send(EngineRequest::SealAck { id, result }).await;
                    });
                }
            }
        }
        if let Err(e) = self.store.save_meta(&self.meta.to_image()).await {
            error!(error = %e, "failed to save the meta index");
        }
    }

    fn handle_seal_ack(&mut self, id: Uuid, result: Result<()>) {
        let Some(pos) = self.unpersisted.iter().position(|(p, _)| p.id() == id) else {
            warn!(partition = %id, "got an invalid response to a persist request");
            return;
        };
        match result {
            Ok(()) => {
                let entry = &mut self.unpersisted[pos];
                entry.1 = entry.1.saturating_sub(1);
                if entry.1 == 0 {
                    debug!(partition = %id, "successfully persisted");
                    self.unpersisted.remove(pos);
                }
            }
            Err(e) => {
                // The partition stays unpersisted and queryable.
                error!(partition = %id, error = %e, "failed to persist an indexer");
            }
        }
    }

    async fn handle_flush(&mut self) -> Result<()> {
        self.seal_active().await;
        self.store.save_meta(&self.meta.to_image()).await
    }

    /// Waits at shutdown until every in-flight persist acked. Partitions
    /// that can no longer make progress were logged and are given up on.
    async fn drain_unpersisted(&mut self) {
        self.unpersisted.retain(|(_, acks)| *acks != STUCK);
        while !self.unpersisted.is_empty() {
            let Some(request) = self.receiver.recv().await else {
                break;
            };
            if let EngineRequest::SealAck { id, result } = request {
                let failed = result.is_err();
                self.handle_seal_ack(id, result);
                if failed {
                    self.unpersisted.retain(|(p, _)| p.id() != id);
                }
            }
        }
    }
}
