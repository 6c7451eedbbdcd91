//! RocksDB wrapper shared by every persistence-backed component.

use crate::otel::db::{db_span, record_db_metrics, DbOperation};
use crate::storage::keys::*;
use crate::types::{OrchestratorError, Result};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// RocksDB storage wrapper, cheaply clonable (the inner handle is an `Arc`).
#[derive(Clone)]
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_level_compaction_dynamic_level_bytes(true);
        opts.set_max_background_jobs(4);

        let cf_descriptors = [
            CF_CONVERSATIONS,
            CF_TURNS,
            CF_EXAMPLES,
            CF_FEEDBACK,
            CF_ANNOTATIONS,
            CF_EXAMPLE_VECTORS,
        ]
        .iter()
        .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf_handle(&self, cf_name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(cf_name)
            .ok_or_else(|| OrchestratorError::Internal(format!("column family not found: {cf_name}")))
    }

    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let span = db_span(DbOperation::Get, Some(cf_name), None);
        let _guard = span.entered();
        let cf = self.cf_handle(cf_name)?;
        let value = self.db.get_cf(cf, key)?;
        record_db_metrics(value.as_ref().map(|_| 1), None);
        Ok(value)
    }

    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let span = db_span(DbOperation::Put, Some(cf_name), None);
        let _guard = span.entered();
        let cf = self.cf_handle(cf_name)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let span = db_span(DbOperation::Delete, Some(cf_name), None);
        let _guard = span.entered();
        let cf = self.cf_handle(cf_name)?;
        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    /// Iterate entries whose key starts with `prefix`, in key order.
    pub fn iter_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let span = db_span(DbOperation::Scan, Some(cf_name), None);
        let _guard = span.entered();
        let cf = self.cf_handle(cf_name)?;
        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        record_db_metrics(Some(out.len()), None);
        Ok(out)
    }

    pub fn batch(&self) -> StorageBatch {
        StorageBatch { inner: WriteBatch::default() }
    }

    pub fn write_batch(&self, batch: StorageBatch) -> Result<()> {
        let span = db_span(DbOperation::BatchWrite, None, None);
        let _guard = span.entered();
        self.db.write(batch.inner)?;
        Ok(())
    }

    /// Resolve a column-family handle for use inside a `StorageBatch`.
    pub fn cf(&self, cf_name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.cf_handle(cf_name)
    }
}

/// Atomic multi-key write, used to keep a Turn append and its Conversation
/// update atomic with respect to concurrent turns on the same conversation
/// (§5 ordering guarantees).
pub struct StorageBatch {
    inner: WriteBatch,
}

impl StorageBatch {
    pub fn put_cf(&mut self, cf: &rocksdb::ColumnFamily, key: &[u8], value: &[u8]) {
        self.inner.put_cf(cf, key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage.put(CF_EXAMPLES, b"example:1", b"hello").unwrap();
        assert_eq!(storage.get(CF_EXAMPLES, b"example:1").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn iter_prefix_stops_at_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        storage.put(CF_TURNS, b"turn:a:0000000001", b"1").unwrap();
        storage.put(CF_TURNS, b"turn:a:0000000002", b"2").unwrap();
        storage.put(CF_TURNS, b"turn:b:0000000001", b"other").unwrap();

        let results = storage.iter_prefix(CF_TURNS, b"turn:a:").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1, b"1");
        assert_eq!(results[1].1, b"2");
    }

    #[test]
    fn batch_write_is_atomic_across_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let mut batch = storage.batch();
        let cf = storage.cf(CF_CONVERSATIONS).unwrap();
        batch.put_cf(cf, b"conversation:1", b"a");
        let cf_turns = storage.cf(CF_TURNS).unwrap();
        batch.put_cf(cf_turns, b"turn:1:0000000001", b"b");
        storage.write_batch(batch).unwrap();

        assert_eq!(storage.get(CF_CONVERSATIONS, b"conversation:1").unwrap(), Some(b"a".to_vec()));
        assert_eq!(storage.get(CF_TURNS, b"turn:1:0000000001").unwrap(), Some(b"b".to_vec()));
    }
}
