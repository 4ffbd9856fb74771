//! RocksDB wrapper with dynamically configured column families.
//!
//! The teacher's EVM-era store had one column family per account/storage/
//! code/etc. concern, fixed at compile time. The ledger store instead opens
//! one `"main"` column family for the primary block keyspace plus one column
//! family per configured secondary index key (spec §4.3), so the set of
//! column families is only known once configuration has been read.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, WriteBatch};

use crate::error::{StoreError, StoreResult};

/// Column family holding the primary index-ordered block keyspace.
pub const MAIN_CF: &str = "main";

type RocksDB = DBWithThreadMode<MultiThreaded>;

/// Database configuration.
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Create database if missing.
    pub create_if_missing: bool,
    /// Maximum number of open files.
    pub max_open_files: i32,
    /// Write buffer size.
    pub write_buffer_size: usize,
    /// Maximum write buffers.
    pub max_write_buffer_number: i32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024,
            max_write_buffer_number: 3,
        }
    }
}

/// RocksDB wrapper with dynamic column family support.
pub struct Database {
    db: Arc<RwLock<Option<RocksDB>>>,
    path: String,
    cf_names: Vec<String>,
}

impl Database {
    /// Create a new database instance (not yet opened). `cf_names` must
    /// include every column family that will be read or written; `"main"`
    /// is added automatically if absent.
    pub fn new(path: impl AsRef<Path>, cf_names: impl IntoIterator<Item = String>) -> Self {
        let mut cf_names: Vec<String> = cf_names.into_iter().collect();
        if !cf_names.iter().any(|n| n == MAIN_CF) {
            cf_names.push(MAIN_CF.to_string());
        }
        Self {
            db: Arc::new(RwLock::new(None)),
            path: path.as_ref().to_string_lossy().to_string(),
            cf_names,
        }
    }

    /// Open the database with default config.
    pub fn open(&self) -> StoreResult<()> {
        self.open_with_config(DbConfig::default())
    }

    /// Open the database with custom config.
    pub fn open_with_config(&self, config: DbConfig) -> StoreResult<()> {
        let mut db_guard = self.db.write();
        if db_guard.is_some() {
            return Err(StoreError::AlreadyOpen);
        }

        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = self
            .cf_names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = RocksDB::open_cf_descriptors(&opts, &self.path, cf_descriptors)?;
        *db_guard = Some(db);
        Ok(())
    }

    /// Close the database.
    pub fn close(&self) {
        let mut db_guard = self.db.write();
        *db_guard = None;
    }

    /// Check if database is open.
    pub fn is_open(&self) -> bool {
        self.db.read().is_some()
    }

    /// Column families this database was configured with (includes `"main"`).
    pub fn cf_names(&self) -> &[String] {
        &self.cf_names
    }

    /// Get a value from a column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StoreError::NotOpen)?;
        let cf = self.get_cf(db, cf_name)?;
        Ok(db.get_cf(&cf, key)?)
    }

    /// Put a value to a column family.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StoreError::NotOpen)?;
        let cf = self.get_cf(db, cf_name)?;
        db.put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Delete a value from a column family.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> StoreResult<()> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StoreError::NotOpen)?;
        let cf = self.get_cf(db, cf_name)?;
        db.delete_cf(&cf, key)?;
        Ok(())
    }

    /// Iterate a column family's key/value pairs, ascending or descending by
    /// key. Collected eagerly: acceptable for this crate's scan sizes (block
    /// counts per node), and keeps the `Option<RocksDB>` guard's lifetime out
    /// of the public API.
    pub fn scan(&self, cf_name: &str, ascending: bool) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StoreError::NotOpen)?;
        let cf = self.get_cf(db, cf_name)?;
        let mode = if ascending {
            rocksdb::IteratorMode::Start
        } else {
            rocksdb::IteratorMode::End
        };
        let mut out = Vec::new();
        for item in db.iterator_cf(&cf, mode) {
            let (k, v) = item?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    /// The last (highest-key) entry in a column family, if any.
    pub fn last(&self, cf_name: &str) -> StoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StoreError::NotOpen)?;
        let cf = self.get_cf(db, cf_name)?;
        let mut iter = db.iterator_cf(&cf, rocksdb::IteratorMode::End);
        match iter.next() {
            Some(item) => {
                let (k, v) = item?;
                Ok(Some((k.to_vec(), v.to_vec())))
            }
            None => Ok(None),
        }
    }

    /// Create a write batch.
    pub fn batch(&self) -> WriteBatchWrapper {
        WriteBatchWrapper::new()
    }

    /// Execute a write batch.
    pub fn write_batch(&self, batch: WriteBatchWrapper) -> StoreResult<()> {
        let db_guard = self.db.read();
        let db = db_guard.as_ref().ok_or(StoreError::NotOpen)?;

        let mut rocks_batch = WriteBatch::default();
        for op in batch.operations {
            match op {
                BatchOp::Put { cf_name, key, value } => {
                    let cf = self.get_cf(db, &cf_name)?;
                    rocks_batch.put_cf(&cf, &key, &value);
                }
                BatchOp::Delete { cf_name, key } => {
                    let cf = self.get_cf(db, &cf_name)?;
                    rocks_batch.delete_cf(&cf, &key);
                }
            }
        }

        db.write(rocks_batch)?;
        Ok(())
    }

    fn get_cf<'a>(&self, db: &'a RocksDB, name: &str) -> StoreResult<Arc<BoundColumnFamily<'a>>> {
        db.cf_handle(name)
            .ok_or_else(|| StoreError::InvalidColumnFamily(name.to_string()))
    }

    /// Database path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            path: self.path.clone(),
            cf_names: self.cf_names.clone(),
        }
    }
}

enum BatchOp {
    Put { cf_name: String, key: Vec<u8>, value: Vec<u8> },
    Delete { cf_name: String, key: Vec<u8> },
}

/// Write batch wrapper.
pub struct WriteBatchWrapper {
    operations: Vec<BatchOp>,
}

impl WriteBatchWrapper {
    /// Create a new write batch.
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Add a put operation.
    pub fn put(&mut self, cf_name: &str, key: &[u8], value: &[u8]) {
        self.operations.push(BatchOp::Put {
            cf_name: cf_name.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Add a delete operation.
    pub fn delete(&mut self, cf_name: &str, key: &[u8]) {
        self.operations.push(BatchOp::Delete {
            cf_name: cf_name.to_string(),
            key: key.to_vec(),
        });
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the batch has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for WriteBatchWrapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_db_path() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let cnt = COUNTER.fetch_add(1, Ordering::SeqCst);
        format!("/tmp/ledger_store_test_db_{id}_{cnt}")
    }

    fn cleanup(path: &str) {
        let _ = fs::remove_dir_all(path);
    }

    fn db_with_indexes(path: &str, indexes: &[&str]) -> Database {
        Database::new(path, indexes.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_open_close() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &[]);

        assert!(!db.is_open());
        db.open().unwrap();
        assert!(db.is_open());
        db.close();
        assert!(!db.is_open());

        cleanup(&path);
    }

    #[test]
    fn test_main_cf_always_present() {
        let db = Database::new("/tmp/unused", ["articleCode".to_string()]);
        assert!(db.cf_names().iter().any(|n| n == MAIN_CF));
        assert!(db.cf_names().iter().any(|n| n == "articleCode"));
    }

    #[test]
    fn test_put_get() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &["articleCode"]);
        db.open().unwrap();

        db.put(MAIN_CF, b"key1", b"value1").unwrap();
        assert_eq!(db.get(MAIN_CF, b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(db.get(MAIN_CF, b"missing").unwrap(), None);

        db.close();
        cleanup(&path);
    }

    #[test]
    fn test_delete() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &[]);
        db.open().unwrap();

        db.put(MAIN_CF, b"code1", b"bytecode").unwrap();
        db.delete(MAIN_CF, b"code1").unwrap();
        assert!(db.get(MAIN_CF, b"code1").unwrap().is_none());

        db.close();
        cleanup(&path);
    }

    #[test]
    fn test_scan_ascending_and_descending() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &[]);
        db.open().unwrap();

        for i in 0u64..5 {
            db.put(MAIN_CF, &i.to_be_bytes(), &i.to_be_bytes()).unwrap();
        }

        let asc = db.scan(MAIN_CF, true).unwrap();
        assert_eq!(asc.first().unwrap().0, 0u64.to_be_bytes());
        assert_eq!(asc.last().unwrap().0, 4u64.to_be_bytes());

        let desc = db.scan(MAIN_CF, false).unwrap();
        assert_eq!(desc.first().unwrap().0, 4u64.to_be_bytes());
        assert_eq!(desc.last().unwrap().0, 0u64.to_be_bytes());

        db.close();
        cleanup(&path);
    }

    #[test]
    fn test_last() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &[]);
        db.open().unwrap();

        assert!(db.last(MAIN_CF).unwrap().is_none());
        db.put(MAIN_CF, &0u64.to_be_bytes(), b"genesis").unwrap();
        db.put(MAIN_CF, &1u64.to_be_bytes(), b"block-1").unwrap();

        let (k, v) = db.last(MAIN_CF).unwrap().unwrap();
        assert_eq!(k, 1u64.to_be_bytes());
        assert_eq!(v, b"block-1");

        db.close();
        cleanup(&path);
    }

    #[test]
    fn test_write_batch() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &["articleCode"]);
        db.open().unwrap();

        let mut batch = db.batch();
        batch.put(MAIN_CF, b"blk1", b"data1");
        batch.put("articleCode", b"4900000000004", b"[1]");
        assert_eq!(batch.len(), 2);
        db.write_batch(batch).unwrap();

        assert_eq!(db.get(MAIN_CF, b"blk1").unwrap(), Some(b"data1".to_vec()));
        assert_eq!(db.get("articleCode", b"4900000000004").unwrap(), Some(b"[1]".to_vec()));

        db.close();
        cleanup(&path);
    }

    #[test]
    fn test_not_open_error() {
        let db = db_with_indexes("/tmp/not_opened", &[]);
        assert!(matches!(db.get(MAIN_CF, b"key"), Err(StoreError::NotOpen)));
    }

    #[test]
    fn test_already_open_error() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &[]);
        db.open().unwrap();
        assert!(matches!(db.open(), Err(StoreError::AlreadyOpen)));
        db.close();
        cleanup(&path);
    }

    #[test]
    fn test_reopen_database_persists_data() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &[]);

        db.open().unwrap();
        db.put(MAIN_CF, b"key1", b"value1").unwrap();
        db.close();

        db.open().unwrap();
        assert_eq!(db.get(MAIN_CF, b"key1").unwrap(), Some(b"value1".to_vec()));

        db.close();
        cleanup(&path);
    }

    #[test]
    fn test_column_family_isolation() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &["articleCode", "cocCertificateCode"]);
        db.open().unwrap();

        db.put(MAIN_CF, b"same_key", b"main_value").unwrap();
        db.put("articleCode", b"same_key", b"article_value").unwrap();

        assert_eq!(db.get(MAIN_CF, b"same_key").unwrap(), Some(b"main_value".to_vec()));
        assert_eq!(db.get("articleCode", b"same_key").unwrap(), Some(b"article_value".to_vec()));

        db.delete(MAIN_CF, b"same_key").unwrap();
        assert!(db.get(MAIN_CF, b"same_key").unwrap().is_none());
        assert!(db.get("articleCode", b"same_key").unwrap().is_some());

        db.close();
        cleanup(&path);
    }

    #[test]
    fn test_invalid_column_family() {
        let path = temp_db_path();
        let db = db_with_indexes(&path, &[]);
        db.open().unwrap();

        let err = db.get("not-configured", b"key").unwrap_err();
        assert!(matches!(err, StoreError::InvalidColumnFamily(name) if name == "not-configured"));

        db.close();
        cleanup(&path);
    }
}
