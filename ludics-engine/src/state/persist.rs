//! RocksDB snapshots of the state store
//!
//! One column family per table, JSON-encoded rows keyed exactly as in
//! memory. Saving replaces the previous snapshot wholesale.

use std::path::PathBuf;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::schema::{self, ALL_TABLES};
use super::store::{StateStore, StoreError, StoreResult, Tables};

/// On-disk snapshot location
pub struct RocksSnapshot {
    db: DB,
    path: PathBuf,
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
}

impl RocksSnapshot {
    /// Open or create a snapshot database at the given path
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_TABLES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn write_table<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        rows: &BTreeMap<String, T>,
    ) -> StoreResult<()> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(&cf, key);
        }
        for (key, value) in rows {
            batch.put_cf(&cf, key.as_bytes(), encode(value)?);
        }
        Ok(())
    }

    fn read_table<T: DeserializeOwned>(&self, cf_name: &str) -> StoreResult<BTreeMap<String, T>> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::ColumnFamilyNotFound(cf_name.to_string()))?;

        let mut rows = BTreeMap::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Deserialization(e.to_string()))?;
            rows.insert(key, decode(&value)?);
        }
        Ok(rows)
    }

    /// Replace the on-disk snapshot with the store's current tables
    pub async fn save(&self, store: &StateStore) -> StoreResult<()> {
        let tables = store.snapshot().await;
        let mut batch = WriteBatch::default();
        self.write_table(&mut batch, schema::T_LOCI, &tables.loci)?;
        self.write_table(&mut batch, schema::T_DESIGNS, &tables.designs)?;
        self.write_table(&mut batch, schema::T_ACTS, &tables.acts)?;
        self.write_table(&mut batch, schema::T_CHRONICLES, &tables.chronicles)?;
        self.write_table(&mut batch, schema::T_TRACES, &tables.traces)?;
        self.write_table(&mut batch, schema::T_COMMITMENTS, &tables.commitments)?;
        self.db.write(batch)?;
        info!(path = %self.path.display(), designs = tables.designs.len(), "Snapshot saved");
        Ok(())
    }

    /// Load the snapshot into a fresh store
    pub fn load(&self) -> StoreResult<StateStore> {
        let mut tables = Tables {
            loci: self.read_table(schema::T_LOCI)?,
            designs: self.read_table(schema::T_DESIGNS)?,
            acts: self.read_table(schema::T_ACTS)?,
            chronicles: self.read_table(schema::T_CHRONICLES)?,
            traces: self.read_table(schema::T_TRACES)?,
            commitments: self.read_table(schema::T_COMMITMENTS)?,
            trace_seq: 0,
        };
        tables.restore_trace_seq();
        Ok(StateStore::from_tables(tables))
    }
}
