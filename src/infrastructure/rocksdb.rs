use crate::domain::ids::{EnrollmentId, OrderId, RegistrationId};
use crate::domain::lock::PaymentLock;
use crate::domain::pending::PendingPaymentRecord;
use crate::domain::ports::{InsertOutcome, LedgerStore, LockStore, PendingPaymentStore};
use crate::domain::transaction::{Transaction, ledger_order};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for payment plan locks.
pub const CF_LOCKS: &str = "locks";
/// Column Family for the transaction ledger.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for unverified gateway successes.
pub const CF_PENDING: &str = "pending";

/// A persistent store implementation using RocksDB.
///
/// Locks, ledger entries and pending records live in separate Column Families, keyed by
/// enrollment id or order id. Write-once inserts are serialized through `write_guard` so the
/// read-then-put pair cannot interleave with another insert.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_guard: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_LOCKS, CF_TRANSACTIONS, CF_PENDING]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_guard: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, family: &str, key: &str) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, family: &str, key: &str, value: &T) -> Result<()> {
        let cf = self.cf(family)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, family: &str) -> Result<Vec<T>> {
        let cf = self.cf(family)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    async fn insert_once<T>(&self, family: &str, key: &str, value: T) -> Result<InsertOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let _guard = self.write_guard.lock().await;
        if let Some(existing) = self.get_json(family, key)? {
            return Ok(InsertOutcome::Existing(existing));
        }
        self.put_json(family, key, &value)?;
        Ok(InsertOutcome::Inserted(value))
    }

    fn transactions_where<F>(&self, keep: F) -> Result<Vec<Transaction>>
    where
        F: Fn(&Transaction) -> bool,
    {
        let mut found: Vec<Transaction> = self
            .scan::<Transaction>(CF_TRANSACTIONS)?
            .into_iter()
            .filter(|tx| keep(tx))
            .collect();
        found.sort_by(ledger_order);
        Ok(found)
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn insert_if_absent(&self, tx: Transaction) -> Result<InsertOutcome<Transaction>> {
        let key = tx.order_id.as_str().to_string();
        self.insert_once(CF_TRANSACTIONS, &key, tx).await
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Transaction>> {
        self.get_json(CF_TRANSACTIONS, order_id.as_str())
    }

    async fn list_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<Vec<Transaction>> {
        self.transactions_where(|tx| &tx.enrollment_id == enrollment_id)
    }

    async fn list_for_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<Transaction>> {
        self.transactions_where(|tx| &tx.registration_id == registration_id)
    }
}

#[async_trait]
impl LockStore for RocksDBStore {
    async fn insert_if_absent(&self, lock: PaymentLock) -> Result<InsertOutcome<PaymentLock>> {
        let key = lock.enrollment_id.as_str().to_string();
        self.insert_once(CF_LOCKS, &key, lock).await
    }

    async fn get(&self, enrollment_id: &EnrollmentId) -> Result<Option<PaymentLock>> {
        self.get_json(CF_LOCKS, enrollment_id.as_str())
    }
}

#[async_trait]
impl PendingPaymentStore for RocksDBStore {
    async fn put(&self, record: PendingPaymentRecord) -> Result<()> {
        self.put_json(CF_PENDING, record.order_id.as_str(), &record)?;
        // Pending records must survive a crash right after the gateway reported success.
        self.db.flush_wal(true)?;
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<PendingPaymentRecord>> {
        self.get_json(CF_PENDING, order_id.as_str())
    }

    async fn list(&self) -> Result<Vec<PendingPaymentRecord>> {
        let mut records: Vec<PendingPaymentRecord> = self.scan(CF_PENDING)?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn remove(&self, order_id: &OrderId) -> Result<bool> {
        let _guard = self.write_guard.lock().await;
        let cf = self.cf(CF_PENDING)?;
        let existed = self.db.get_pinned_cf(cf, order_id.as_str().as_bytes())?.is_some();
        if existed {
            self.db.delete_cf(cf, order_id.as_str().as_bytes())?;
        }
        Ok(existed)
    }
}
