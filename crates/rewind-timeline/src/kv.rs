//! Bucketed key-value store over LevelDB with write-overlay transactions.
//!
//! LevelDB has no native transactions, so a transaction here is an in-memory
//! overlay of pending writes committed atomically through a `WriteBatch`.
//! Reads inside a transaction see its own writes. A mutex held for the
//! transaction's lifetime keeps writers single-file; plain reads go through
//! the store lock and never wait on a writer's overlay.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusty_leveldb::{LdbIterator, Options, WriteBatch, DB};

use crate::error::TimelineError;

/// Tuning options for opening a timeline database.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbOptions {
    /// Skip the truncate-on-growth sync. Accepted for option compatibility;
    /// the LevelDB backend has no mmap growth step, so it changes nothing.
    pub no_grow_sync: bool,
    /// Skip fsync on commit. UNSAFE: a crash can lose the latest commits.
    /// Only sensible for bulk loads that can be repeated.
    pub no_sync: bool,
}

/// The two key namespaces of a timeline database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Per-chunk records (headers, snapshots, delta updates).
    Root,
    /// Chunk existence sentinels plus the `ChunkCount` counter.
    ChunkIndex,
}

impl Bucket {
    fn prefix(self) -> u8 {
        match self {
            Bucket::Root => b'r',
            Bucket::ChunkIndex => b'c',
        }
    }
}

fn namespaced(bucket: Bucket, key: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(1 + key.len());
    full.push(bucket.prefix());
    full.extend_from_slice(key);
    full
}

fn store_err(e: rusty_leveldb::Status) -> TimelineError {
    TimelineError::Kv(e.to_string())
}

/// A LevelDB-backed store with two buckets and single-writer transactions.
pub struct LevelKv {
    db: Mutex<DB>,
    writer: Mutex<()>,
    sync: bool,
}

impl LevelKv {
    /// Open or create the store at `path`.
    pub fn open(path: &Path, opts: DbOptions) -> Result<Self, TimelineError> {
        let level_opts = Options {
            create_if_missing: true,
            ..Options::default()
        };
        let db = DB::open(path, level_opts).map_err(store_err)?;
        Ok(Self {
            db: Mutex::new(db),
            writer: Mutex::new(()),
            sync: !opts.no_sync,
        })
    }

    /// Read a value. `None` when the key is absent.
    pub fn get(&self, bucket: Bucket, key: &[u8]) -> Option<Vec<u8>> {
        let mut db = self.db.lock().expect("kv lock poisoned");
        db.get(&namespaced(bucket, key))
    }

    /// Whether the key is present.
    pub fn has(&self, bucket: Bucket, key: &[u8]) -> bool {
        self.get(bucket, key).is_some()
    }

    /// Write a value outside any transaction.
    pub fn put(&self, bucket: Bucket, key: &[u8], value: &[u8]) -> Result<(), TimelineError> {
        let _writer = self.writer.lock().expect("kv writer lock poisoned");
        let mut db = self.db.lock().expect("kv lock poisoned");
        db.put(&namespaced(bucket, key), value).map_err(store_err)
    }

    /// Delete a key outside any transaction. Absent keys are a no-op.
    pub fn delete(&self, bucket: Bucket, key: &[u8]) -> Result<(), TimelineError> {
        let _writer = self.writer.lock().expect("kv writer lock poisoned");
        let mut db = self.db.lock().expect("kv lock poisoned");
        db.delete(&namespaced(bucket, key)).map_err(store_err)
    }

    /// Begin a transaction. Blocks while another transaction is open.
    pub fn open_transaction(&self) -> Transaction<'_> {
        Transaction {
            kv: self,
            _writer: self.writer.lock().expect("kv writer lock poisoned"),
            pending: HashMap::new(),
        }
    }

    /// Visit every key/value pair of a bucket.
    pub fn for_each(
        &self,
        bucket: Bucket,
        mut f: impl FnMut(&[u8], &[u8]),
    ) -> Result<(), TimelineError> {
        let mut db = self.db.lock().expect("kv lock poisoned");
        let mut iter = db.new_iter().map_err(store_err)?;
        let (mut key, mut value) = (Vec::new(), Vec::new());
        while iter.advance() {
            if !iter.current(&mut key, &mut value) {
                break;
            }
            if key.first() == Some(&bucket.prefix()) {
                f(&key[1..], &value);
            }
        }
        Ok(())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), TimelineError> {
        let mut db = self.db.lock().expect("kv lock poisoned");
        db.flush().map_err(store_err)
    }
}

/// A single-writer transaction: reads see the overlay, `commit` applies it
/// atomically, dropping discards it.
pub struct Transaction<'db> {
    kv: &'db LevelKv,
    _writer: MutexGuard<'db, ()>,
    pending: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl Transaction<'_> {
    /// Read through the overlay: pending writes win over stored state.
    pub fn get(&self, bucket: Bucket, key: &[u8]) -> Option<Vec<u8>> {
        let full = namespaced(bucket, key);
        match self.pending.get(&full) {
            Some(pending) => pending.clone(),
            None => {
                let mut db = self.kv.db.lock().expect("kv lock poisoned");
                db.get(&full)
            }
        }
    }

    pub fn has(&self, bucket: Bucket, key: &[u8]) -> bool {
        self.get(bucket, key).is_some()
    }

    pub fn put(&mut self, bucket: Bucket, key: &[u8], value: &[u8]) {
        self.pending.insert(namespaced(bucket, key), Some(value.to_vec()));
    }

    pub fn delete(&mut self, bucket: Bucket, key: &[u8]) {
        self.pending.insert(namespaced(bucket, key), None);
    }

    /// Apply every pending write in one atomic batch.
    pub fn commit(self) -> Result<(), TimelineError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for (key, value) in &self.pending {
            match value {
                Some(value) => batch.put(key, value),
                None => batch.delete(key),
            }
        }
        let mut db = self.kv.db.lock().expect("kv lock poisoned");
        db.write(batch, self.kv.sync).map_err(store_err)
    }

    /// Drop every pending write.
    pub fn discard(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_kv() -> (LevelKv, PathBuf) {
        let dir = std::env::temp_dir().join(format!("rewind_kv_test_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        (LevelKv::open(&dir, DbOptions::default()).unwrap(), dir)
    }

    #[test]
    fn put_get_delete() {
        let (kv, dir) = temp_kv();
        assert_eq!(kv.get(Bucket::Root, b"k"), None);
        kv.put(Bucket::Root, b"k", b"v").unwrap();
        assert_eq!(kv.get(Bucket::Root, b"k"), Some(b"v".to_vec()));
        assert!(kv.has(Bucket::Root, b"k"));
        kv.delete(Bucket::Root, b"k").unwrap();
        assert_eq!(kv.get(Bucket::Root, b"k"), None);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn buckets_do_not_alias() {
        let (kv, dir) = temp_kv();
        kv.put(Bucket::Root, b"k", b"root").unwrap();
        kv.put(Bucket::ChunkIndex, b"k", b"index").unwrap();
        assert_eq!(kv.get(Bucket::Root, b"k"), Some(b"root".to_vec()));
        assert_eq!(kv.get(Bucket::ChunkIndex, b"k"), Some(b"index".to_vec()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn transaction_reads_its_own_writes() {
        let (kv, dir) = temp_kv();
        kv.put(Bucket::Root, b"a", b"old").unwrap();

        let mut txn = kv.open_transaction();
        assert_eq!(txn.get(Bucket::Root, b"a"), Some(b"old".to_vec()));
        txn.put(Bucket::Root, b"a", b"new");
        txn.delete(Bucket::Root, b"b");
        assert_eq!(txn.get(Bucket::Root, b"a"), Some(b"new".to_vec()));
        assert!(!txn.has(Bucket::Root, b"b"));
        txn.commit().unwrap();

        assert_eq!(kv.get(Bucket::Root, b"a"), Some(b"new".to_vec()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn discarded_transaction_changes_nothing() {
        let (kv, dir) = temp_kv();
        kv.put(Bucket::Root, b"a", b"old").unwrap();

        let mut txn = kv.open_transaction();
        txn.put(Bucket::Root, b"a", b"new");
        txn.put(Bucket::Root, b"c", b"created");
        txn.discard();

        assert_eq!(kv.get(Bucket::Root, b"a"), Some(b"old".to_vec()));
        assert_eq!(kv.get(Bucket::Root, b"c"), None);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn for_each_visits_only_the_bucket() {
        let (kv, dir) = temp_kv();
        kv.put(Bucket::Root, b"r1", b"1").unwrap();
        kv.put(Bucket::ChunkIndex, b"c1", b"2").unwrap();
        kv.put(Bucket::ChunkIndex, b"c2", b"3").unwrap();

        let mut seen = Vec::new();
        kv.for_each(Bucket::ChunkIndex, |k, _| seen.push(k.to_vec()))
            .unwrap();
        seen.sort();
        assert_eq!(seen, vec![b"c1".to_vec(), b"c2".to_vec()]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reopen_sees_committed_state() {
        let dir = std::env::temp_dir().join(format!("rewind_kv_test_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        {
            let kv = LevelKv::open(&dir, DbOptions::default()).unwrap();
            let mut txn = kv.open_transaction();
            txn.put(Bucket::Root, b"persist", b"yes");
            txn.commit().unwrap();
            kv.flush().unwrap();
        }
        {
            let kv = LevelKv::open(&dir, DbOptions::default()).unwrap();
            assert_eq!(kv.get(Bucket::Root, b"persist"), Some(b"yes".to_vec()));
        }
        std::fs::remove_dir_all(&dir).ok();
    }
}
