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

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use datatypes::data_type::Attribute;
use datatypes::{Data, Field, RelOp, Type};
use engine::{Engine, EngineConfig, Expr, FsStore, IndexerOptions, QueryHit, SliceBuilder};
use tokio::sync::mpsc;
use uuid::Uuid;

fn layout() -> Type {
    Type::record(vec![
        Field::new("ts", Type::timestamp()),
        Field::new("host", Type::string()),
        Field::new("orig", Type::address()),
        Field::new("resp_p", Type::port()),
        Field::new("bytes", Type::uint64()),
        Field::new("tags", Type::vector(Type::uint64())),
    ])
    .with_name("conn")
}

fn slice(rows: &[(i64, &str, &str, &str, u64, &[u64])]) -> engine::TableSlice {
    let mut builder = SliceBuilder::new(layout());
    for (ts, host, orig, resp_p, bytes, tags) in rows {
        builder.append(Data::Timestamp(*ts)).unwrap();
        builder.append(Data::from(*host)).unwrap();
        builder
            .append(Data::Address(orig.parse().unwrap()))
            .unwrap();
        builder.append(Data::Port(resp_p.parse().unwrap())).unwrap();
        builder.append(Data::UInt(*bytes)).unwrap();
        builder
            .append(Data::Vector(tags.iter().map(|t| Data::UInt(*t)).collect()))
            .unwrap();
    }
    builder.finish()
}

async fn start_with(dir: &std::path::Path, config: EngineConfig) -> Engine {
    let store = Arc::new(FsStore::new(dir, IndexerOptions::from(&config)));
    Engine::start(config, store).await.unwrap()
}

async fn start(dir: &std::path::Path, taste: usize, max_rows: usize) -> Engine {
    let config = EngineConfig {
        max_partition_size: max_rows,
        taste_partitions: taste,
        num_workers: 2,
        data_home: dir.to_path_buf(),
        ..Default::default()
    };
    start_with(dir, config).await
}

/// Drains hit messages until the batch sentinel, returning per-partition
/// row ids.
async fn collect_batch(rx: &mut mpsc::Receiver<QueryHit>) -> HashMap<Uuid, Vec<u64>> {
    let mut result = HashMap::new();
    loop {
        match rx.recv().await.expect("client channel closed") {
            QueryHit::Partition { id, hits } => {
                result.insert(id, hits.to_vec());
            }
            QueryHit::Done => return result,
        }
    }
}

#[tokio::test]
async fn test_ingest_then_query_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path(), 5, 1024).await;
    engine
        .ingest(slice(&[
            (1_000_000_000, "a", "10.0.0.1", "22/tcp", 42, &[1, 2]),
            (2_000_000_000, "b", "192.168.1.1", "80/tcp", 7, &[3]),
        ]))
        .await
        .unwrap();

    let cases: Vec<(Expr, Vec<u64>)> = vec![
        (Expr::key("host", RelOp::Equal, "a"), vec![0]),
        (
            Expr::key(
                "orig",
                RelOp::In,
                Data::Subnet("10.0.0.0/8".parse().unwrap()),
            ),
            vec![0],
        ),
        (
            Expr::key("resp_p", RelOp::Equal, Data::Port("80/?".parse().unwrap())),
            vec![1],
        ),
        (Expr::key("bytes", RelOp::Greater, 10u64), vec![0]),
        (Expr::key("tags", RelOp::Ni, 3u64), vec![1]),
        // Time predicates bin to second granularity.
        (
            Expr::attribute("time", RelOp::Less, Data::Timestamp(2_000_000_000)),
            vec![0],
        ),
        (
            Expr::Conjunction(vec![
                Expr::key("host", RelOp::Equal, "a"),
                Expr::key("bytes", RelOp::Equal, 42u64),
            ]),
            vec![0],
        ),
    ];
    for (expr, want) in cases {
        let (tx, mut rx) = mpsc::channel(64);
        let response = engine.query(expr.clone(), tx).await.unwrap();
        assert_eq!(response.query_id, Uuid::nil());
        assert_eq!(response.hits, 1, "{expr}");
        assert_eq!(response.scheduled, 1);
        let batch = collect_batch(&mut rx).await;
        let all: Vec<u64> = batch.values().flatten().copied().collect();
        assert_eq!(all, want, "{expr}");
    }
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_pruned_query_returns_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path(), 5, 1024).await;
    engine
        .ingest(slice(&[(1, "a", "10.0.0.1", "22/tcp", 42, &[])]))
        .await
        .unwrap();

    let (tx, _rx) = mpsc::channel(8);
    let response = engine
        .query(Expr::key("bytes", RelOp::Equal, 999u64), tx)
        .await
        .unwrap();
    assert_eq!(response.query_id, Uuid::nil());
    assert_eq!(response.hits, 0);
    assert_eq!(response.scheduled, 0);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_expression_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = start(dir.path(), 5, 1024).await;
    let (tx, _rx) = mpsc::channel(8);
    let result = engine.query(Expr::Conjunction(vec![]), tx).await;
    assert!(result.is_err());
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_taste_and_continuation_fan_out() {
    let dir = tempfile::tempdir().unwrap();
    // Two rows per partition: every ingest seals one partition.
    let engine = start(dir.path(), 3, 2).await;
    for i in 0..10i64 {
        engine
            .ingest(slice(&[
                (i, "h", "10.0.0.1", "22/tcp", i as u64, &[]),
                (i, "h", "10.0.0.2", "53/udp", i as u64, &[]),
            ]))
            .await
            .unwrap();
    }

    let (tx, mut rx) = mpsc::channel(64);
    let response = engine
        .query(Expr::key("host", RelOp::Equal, "h"), tx)
        .await
        .unwrap();
    assert_ne!(response.query_id, Uuid::nil());
    assert_eq!(response.hits, 10);
    assert_eq!(response.scheduled, 3);

    let taste = collect_batch(&mut rx).await;
    assert_eq!(taste.len(), 3);

    // Pull five more; seven remained, so five arrive and two stay pending.
    engine.continue_query(response.query_id, 5).await.unwrap();
    let more = collect_batch(&mut rx).await;
    assert_eq!(more.len(), 5);
    assert!(more.keys().all(|id| !taste.contains_key(id)));

    // Cancel the rest; no further results may arrive.
    engine.continue_query(response.query_id, 0).await.unwrap();
    engine.continue_query(response.query_id, 2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    // Every row id is global and appears exactly once across batches.
    let mut ids: Vec<u64> = taste
        .values()
        .chain(more.values())
        .flatten()
        .copied()
        .collect();
    ids.sort_unstable();
    assert_eq!(ids.len(), 16);
    ids.dedup();
    assert_eq!(ids.len(), 16);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_tightened_time_matching_is_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        match_time_by_type: false,
        num_workers: 2,
        data_home: dir.path().to_path_buf(),
        ..Default::default()
    };
    let engine = start_with(dir.path(), config).await;

    let timed = Type::record(vec![
        Field::new("ts", Type::timestamp()),
        Field::new(
            "written",
            Type::timestamp().with_attrs(vec![Attribute::new("timestamp")]),
        ),
    ])
    .with_name("log");
    let mut builder = SliceBuilder::new(timed);
    builder.append(Data::Timestamp(100)).unwrap();
    builder.append(Data::Timestamp(7_000_000_000)).unwrap();
    engine.ingest(builder.finish()).await.unwrap();

    // Only the attribute-tagged column answers time predicates, so a value
    // present solely in the untagged column is pruned and never executed.
    let (tx, _rx) = mpsc::channel(8);
    let response = engine
        .query(
            Expr::attribute("time", RelOp::Equal, Data::Timestamp(100)),
            tx,
        )
        .await
        .unwrap();
    assert_eq!(response.hits, 0);

    let (tx, mut rx) = mpsc::channel(8);
    let response = engine
        .query(
            Expr::attribute("time", RelOp::Equal, Data::Timestamp(7_000_000_000)),
            tx,
        )
        .await
        .unwrap();
    assert_eq!(response.hits, 1);
    let batch = collect_batch(&mut rx).await;
    let ids: Vec<u64> = batch.values().flatten().copied().collect();
    assert_eq!(ids, [0]);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_restart_recovers_sealed_partitions() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = start(dir.path(), 3, 2).await;
        for i in 0..4i64 {
            engine
                .ingest(slice(&[
                    (i, "h", "10.0.0.1", "22/tcp", 1, &[]),
                    (i, "h", "10.0.0.1", "22/tcp", 2, &[]),
                ]))
                .await
                .unwrap();
        }
        engine.stop().await.unwrap();
    }

    let engine = start(dir.path(), 5, 2).await;
    let (tx, mut rx) = mpsc::channel(64);
    let response = engine
        .query(Expr::key("bytes", RelOp::Equal, 2u64), tx)
        .await
        .unwrap();
    assert_eq!(response.hits, 4);
    let batch = collect_batch(&mut rx).await;
    let mut ids: Vec<u64> = batch.values().flatten().copied().collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 3, 5, 7]);

    // The row id sequence resumes after the recovered partitions.
    engine
        .ingest(slice(&[(9, "h", "10.0.0.1", "22/tcp", 2, &[])]))
        .await
        .unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    engine
        .query(Expr::key("bytes", RelOp::Equal, 2u64), tx)
        .await
        .unwrap();
    let batch = collect_batch(&mut rx).await;
    let mut ids: Vec<u64> = batch.values().flatten().copied().collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 3, 5, 7, 8]);
    engine.stop().await.unwrap();
}
