//! Embedded key-value store backed by RocksDB.

use crate::config::{EmbeddedStoreOptions, StoreLocation};
use crate::error::{ResourceKind, Result, ServiceError};
use rocksdb::{DB, Env, Options};
use std::path::PathBuf;
use std::sync::Arc;

const KIND: ResourceKind = ResourceKind::EmbeddedStore;
const PROBE_KEY: &[u8] = b"__keystone_liveness_probe";
const IN_MEMORY_PATH: &str = "keystone-embedded";

/// Handle to the embedded store. Clones share the same database.
#[derive(Clone)]
pub struct EmbeddedStore {
    db: Arc<DB>,
}

impl EmbeddedStore {
    /// Open a store with no on-disk footprint. The options keep the memory
    /// environment alive for as long as the database is open.
    pub fn open_in_memory() -> Result<Self> {
        let env = Env::mem_env().map_err(|e| ServiceError::setup(KIND, e))?;
        let mut opts = base_options();
        opts.set_env(&env);
        let db = DB::open(&opts, IN_MEMORY_PATH).map_err(|e| ServiceError::setup(KIND, e))?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        let db = DB::open(&base_options(), &path).map_err(|e| ServiceError::setup(KIND, e))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Open an existing store without write access. Writes and flushes fail.
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        let db = DB::open_for_read_only(&base_options(), &path, false)
            .map_err(|e| ServiceError::setup(KIND, e))?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(key).map_err(|e| ServiceError::setup(KIND, e))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value).map_err(|e| ServiceError::setup(KIND, e))
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key).map_err(|e| ServiceError::setup(KIND, e))
    }

    /// Direct access for operations this wrapper does not cover.
    pub fn inner(&self) -> &Arc<DB> {
        &self.db
    }

    /// Liveness check: write, read back and remove a probe key.
    pub fn ping(&self) -> Result<()> {
        self.put(PROBE_KEY, b"ok")?;
        let read = self.get(PROBE_KEY)?;
        self.delete(PROBE_KEY)?;
        match read.as_deref() {
            Some(b"ok") => Ok(()),
            _ => Err(ServiceError::setup(KIND, "liveness probe read back a different value")),
        }
    }

    /// Flush memtables. The database itself closes when the last handle drops.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| ServiceError::setup(KIND, e))
    }
}

fn base_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
    opts
}

/// Adopt the injected store, or open one and probe it.
pub(crate) async fn open(options: &EmbeddedStoreOptions) -> Result<EmbeddedStore> {
    if let Some(store) = options.injected_store() {
        tracing::debug!("Using injected embedded store");
        return Ok(store.clone());
    }

    let location = options.location.clone();
    tokio::task::spawn_blocking(move || -> Result<EmbeddedStore> {
        let store = match location {
            StoreLocation::InMemory => EmbeddedStore::open_in_memory()?,
            StoreLocation::Path(path) => EmbeddedStore::open_at(path)?,
        };
        store.ping()?;
        Ok(store)
    })
    .await
    .map_err(|e| ServiceError::setup(KIND, e))?
}

pub(crate) async fn close(store: &EmbeddedStore) -> Result<()> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.flush())
        .await
        .map_err(|e| ServiceError::setup(KIND, e))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_round_trip() {
        let store = EmbeddedStore::open_in_memory().unwrap();
        store.put(b"user:1", b"ada").unwrap();
        assert_eq!(store.get(b"user:1").unwrap().as_deref(), Some(&b"ada"[..]));
        store.delete(b"user:1").unwrap();
        assert!(store.get(b"user:1").unwrap().is_none());
    }

    #[test]
    fn test_ping_leaves_no_probe_behind() {
        let store = EmbeddedStore::open_in_memory().unwrap();
        store.ping().unwrap();
        assert!(store.get(PROBE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let options = EmbeddedStoreOptions::at_path(dir.path().join("store"));
        let store = open(&options).await.unwrap();
        store.put(b"k", b"v").unwrap();
        close(&store).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only_store_reads_but_cannot_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");
        let writer = EmbeddedStore::open_at(path.clone()).unwrap();
        writer.put(b"k", b"v").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let reader = EmbeddedStore::open_read_only(path).unwrap();
        assert_eq!(reader.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));
        let err = close(&reader).await.err().unwrap();
        assert!(err.is(KIND, crate::error::Condition::SetupFailed));
    }
}
