//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `facts` - Append-only fact log (key: big-endian sequence number)
//! - `snapshots` - Periodic full-state snapshots (key: sequence number)
//! - `meta` - Log metadata (last applied sequence)
//!
//! The fact log is the source of truth: replaying it from sequence 1
//! through `LedgerState::apply_fact` reproduces the state exactly.
//! Snapshots only shorten startup.

use crate::{
    error::{Error, Result},
    state::LedgerState,
    types::Fact,
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_FACTS: &str = "facts";
const CF_SNAPSHOTS: &str = "snapshots";
const CF_META: &str = "meta";

const META_LAST_SEQ: &[u8] = b"last_seq";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Append-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_FACTS, Self::cf_options_facts()),
            ColumnFamilyDescriptor::new(CF_SNAPSHOTS, Self::cf_options_snapshots()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened RocksDB fact log");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_facts() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_snapshots() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Fact log operations

    /// Append the facts of one committed transition, atomically with the
    /// sequence-counter update. `first_seq` must be `last_sequence() + 1`.
    pub fn append_facts(&self, first_seq: u64, facts: &[Fact]) -> Result<()> {
        if facts.is_empty() {
            return Ok(());
        }
        let last = self.last_sequence()?;
        if first_seq != last + 1 {
            return Err(Error::Storage(format!(
                "fact log at sequence {}, append started at {}",
                last, first_seq
            )));
        }

        let cf_facts = self.cf_handle(CF_FACTS)?;
        let cf_meta = self.cf_handle(CF_META)?;
        let mut batch = WriteBatch::default();

        let mut seq = first_seq;
        for fact in facts {
            let value = bincode::serialize(fact)?;
            batch.put_cf(cf_facts, seq.to_be_bytes(), &value);
            seq += 1;
        }
        batch.put_cf(cf_meta, META_LAST_SEQ, (seq - 1).to_be_bytes());

        self.db.write(batch)?;

        tracing::debug!(
            first_seq,
            count = facts.len(),
            kind = facts[0].kind(),
            "Facts appended"
        );
        Ok(())
    }

    /// Last appended sequence number, 0 when the log is empty
    pub fn last_sequence(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, META_LAST_SEQ)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("corrupt last_seq entry".to_string()))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    /// Read facts with sequence numbers in `[from_seq, ..]`, in order
    pub fn facts_from(&self, from_seq: u64) -> Result<Vec<(u64, Fact)>> {
        let cf = self.cf_handle(CF_FACTS)?;
        let start = from_seq.to_be_bytes();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut facts = Vec::new();
        for item in iter {
            let (key, value) = item?;
            let arr: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| Error::Storage("corrupt fact log key".to_string()))?;
            let fact: Fact = bincode::deserialize(&value)?;
            facts.push((u64::from_be_bytes(arr), fact));
        }
        Ok(facts)
    }

    // Snapshot operations

    /// Persist a full-state snapshot as of `seq`
    pub fn put_snapshot(&self, seq: u64, state: &LedgerState) -> Result<()> {
        let cf = self.cf_handle(CF_SNAPSHOTS)?;
        let value = bincode::serialize(state)?;
        self.db.put_cf(cf, seq.to_be_bytes(), &value)?;

        tracing::info!(seq, bytes = value.len(), "Snapshot written");
        Ok(())
    }

    /// Most recent snapshot, with the sequence it covers up to
    pub fn latest_snapshot(&self) -> Result<Option<(u64, LedgerState)>> {
        let cf = self.cf_handle(CF_SNAPSHOTS)?;
        let mut iter = self.db.iterator_cf(cf, IteratorMode::End);

        if let Some(item) = iter.next() {
            let (key, value) = item?;
            let arr: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| Error::Storage("corrupt snapshot key".to_string()))?;
            let state: LedgerState = bincode::deserialize(&value)?;
            return Ok(Some((u64::from_be_bytes(arr), state)));
        }
        Ok(None)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, Role};
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn test_fact(account_byte: u8) -> Fact {
        Fact::RoleGranted {
            account: AccountId::new([account_byte; 32]),
            role: Role::Issuer,
            by: AccountId::new([1u8; 32]),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_storage_open_empty() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.last_sequence().unwrap(), 0);
        assert!(storage.latest_snapshot().unwrap().is_none());
        assert!(storage.facts_from(1).unwrap().is_empty());
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage
            .append_facts(1, &[test_fact(2), test_fact(3)])
            .unwrap();
        storage.append_facts(3, &[test_fact(4)]).unwrap();
        assert_eq!(storage.last_sequence().unwrap(), 3);

        let facts = storage.facts_from(1).unwrap();
        assert_eq!(
            facts.iter().map(|(seq, _)| *seq).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let tail = storage.facts_from(3).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].0, 3);
    }

    #[test]
    fn test_append_rejects_sequence_gap() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage.append_facts(1, &[test_fact(2)]).unwrap();
        let result = storage.append_facts(5, &[test_fact(3)]);
        assert!(matches!(result, Err(Error::Storage(_))));
        assert_eq!(storage.last_sequence().unwrap(), 1);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut state = LedgerState::default();
        let admin = AccountId::new([1u8; 32]);
        state.genesis(admin, Utc::now()).unwrap();

        storage.put_snapshot(7, &state).unwrap();
        storage.put_snapshot(12, &state).unwrap();

        let (seq, restored) = storage.latest_snapshot().unwrap().unwrap();
        assert_eq!(seq, 12);
        assert_eq!(restored, state);
    }

    #[test]
    fn test_log_survives_reopen() {
        let (config, _temp) = test_config();
        {
            let storage = Storage::open(&config).unwrap();
            storage
                .append_facts(1, &[test_fact(2), test_fact(3)])
                .unwrap();
        }
        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.last_sequence().unwrap(), 2);
        assert_eq!(storage.facts_from(1).unwrap().len(), 2);
    }
}
