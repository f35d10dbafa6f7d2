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

//! Durable storage of partitions and the meta index image.
//!
//! The engine depends only on the [PartitionStore] capability; the on-disk
//! layout is an implementation detail of [FsStore]:
//!
//! ```text
//! <root>/meta                     # meta index image
//! <root>/<partition-uuid>/manifest
//! <root>/<partition-uuid>/<t>_<c>.idx
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use snafu::ResultExt;
use uuid::Uuid;

use crate::error::{
    DeserializeSnafu, IoSnafu, PartitionNotFoundSnafu, Result, SerializeSnafu,
};
use crate::indexer::IndexerOptions;
use crate::meta::MetaImage;
use crate::partition::{Partition, PartitionManifest};

/// Loads and saves partitions by id.
#[async_trait]
pub trait PartitionStore: Send + Sync + 'static {
    /// Loads a sealed partition, respawning its indexer actors.
    async fn load(&self, id: Uuid) -> Result<Partition>;

    /// Loads only the manifest of a sealed partition.
    async fn load_manifest(&self, id: Uuid) -> Result<PartitionManifest>;

    /// Writes the manifest of a partition about to be sealed and prepares
    /// its directory.
    async fn save_manifest(&self, partition: &Partition) -> Result<()>;

    /// The file that the indexer of column `col` of table `table` persists
    /// itself to.
    fn column_path(&self, id: Uuid, table: usize, col: usize) -> PathBuf;

    async fn save_meta(&self, image: &MetaImage) -> Result<()>;

    async fn load_meta(&self) -> Result<Option<MetaImage>>;
}

/// Filesystem-backed store.
pub struct FsStore {
    root: PathBuf,
    /// Settings for respawned indexer actors.
    options: IndexerOptions,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, options: IndexerOptions) -> FsStore {
        FsStore {
            root: root.into(),
            options,
        }
    }

    fn partition_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn meta_path(&self) -> PathBuf {
        self.root.join("meta")
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.with_context(|_| IoSnafu {
            path: path.to_path_buf(),
        })
    }

    async fn write(&self, path: &Path, bytes: Vec<u8>) -> Result<()> {
        tokio::fs::write(path, bytes).await.with_context(|_| IoSnafu {
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl PartitionStore for FsStore {
    async fn load(&self, id: Uuid) -> Result<Partition> {
        let manifest = self.load_manifest(id).await?;
        let mut columns = Vec::with_capacity(manifest.tables.len());
        for (t, table) in manifest.tables.iter().enumerate() {
            let mut loaded = Vec::with_capacity(table.columns.len());
            for (c, present) in table.columns.iter().enumerate() {
                if !present {
                    loaded.push(None);
                    continue;
                }
                let bytes = self.read(&self.column_path(id, t, c)).await?;
                let index =
                    bincode::deserialize(&bytes).with_context(|_| DeserializeSnafu {
                        what: format!("index {t}_{c} of partition {id}"),
                    })?;
                loaded.push(Some(index));
            }
            columns.push(loaded);
        }
        Ok(Partition::from_parts(manifest, columns, self.options))
    }

    async fn load_manifest(&self, id: Uuid) -> Result<PartitionManifest> {
        let manifest_path = self.partition_dir(id).join("manifest");
        if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
            return PartitionNotFoundSnafu { id }.fail();
        }
        let bytes = self.read(&manifest_path).await?;
        bincode::deserialize(&bytes).with_context(|_| DeserializeSnafu {
            what: format!("manifest of partition {id}"),
        })
    }

    async fn save_manifest(&self, partition: &Partition) -> Result<()> {
        let dir = self.partition_dir(partition.id());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|_| IoSnafu { path: dir.clone() })?;
        let manifest = partition.manifest();
        let bytes = bincode::serialize(&manifest).with_context(|_| SerializeSnafu {
            what: format!("manifest of partition {}", partition.id()),
        })?;
        self.write(&dir.join("manifest"), bytes).await
    }

    fn column_path(&self, id: Uuid, table: usize, col: usize) -> PathBuf {
        self.partition_dir(id).join(format!("{table}_{col}.idx"))
    }

    async fn save_meta(&self, image: &MetaImage) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|_| IoSnafu {
                path: self.root.clone(),
            })?;
        let bytes = bincode::serialize(image).with_context(|_| SerializeSnafu {
            what: "meta index image".to_string(),
        })?;
        self.write(&self.meta_path(), bytes).await
    }

    async fn load_meta(&self) -> Result<Option<MetaImage>> {
        let path = self.meta_path();
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        let bytes = self.read(&path).await?;
        let image = bincode::deserialize(&bytes).with_context(|_| DeserializeSnafu {
            what: "meta index image".to_string(),
        })?;
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use datatypes::{Data, Field, RelOp, Type};
    use tokio::sync::oneshot;

    use super::*;
    use crate::expr::Expr;
    use crate::slice::SliceBuilder;

    fn layout() -> Type {
        Type::record(vec![
            Field::new("host", Type::string()),
            Field::new("bytes", Type::uint64()),
        ])
        .with_name("flow")
    }

    #[tokio::test]
    async fn test_partition_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), IndexerOptions::default());

        let id = Uuid::new_v4();
        let mut part = Partition::new(id, 0, IndexerOptions::default());
        let mut builder = SliceBuilder::new(layout());
        for (host, bytes) in [("a", 1u64), ("b", 2)] {
            builder.append(Data::from(host)).unwrap();
            builder.append(Data::UInt(bytes)).unwrap();
        }
        part.append_slice(&builder.finish()).await.unwrap();

        store.save_manifest(&part).await.unwrap();
        for (t, table) in part.tables().enumerate() {
            for (c, indexer) in table.indexers().iter().enumerate() {
                if let Some(indexer) = indexer {
                    let (tx, rx) = oneshot::channel();
                    indexer.persist(store.column_path(id, t, c), tx).await;
                    rx.await.unwrap().unwrap();
                }
            }
        }

        let loaded = store.load(id).await.unwrap();
        assert_eq!(loaded.id(), id);
        assert_eq!(loaded.rows(), 2);
        let expr = Expr::key("host", RelOp::Equal, "b");
        let indexers = loaded.relevant_indexers(&expr);
        let hits = indexers[0].lookup(expr).await.unwrap();
        assert_eq!(hits.to_vec(), [1]);
    }

    #[tokio::test]
    async fn test_load_missing_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), IndexerOptions::default());
        let err = store.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::PartitionNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), IndexerOptions::default());
        assert!(store.load_meta().await.unwrap().is_none());

        let meta = crate::meta::MetaIndex::new();
        store.save_meta(&meta.to_image()).await.unwrap();
        assert!(store.load_meta().await.unwrap().is_some());
    }
}
