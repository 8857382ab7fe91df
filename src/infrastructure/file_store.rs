use crate::domain::ids::{EnrollmentId, OrderId, RegistrationId};
use crate::domain::lock::PaymentLock;
use crate::domain::pending::PendingPaymentRecord;
use crate::domain::ports::{InsertOutcome, LedgerStore, LockStore, PendingPaymentStore};
use crate::domain::transaction::{Transaction, ledger_order};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, warn};

const LOCKS_DIR: &str = "locks";
const LEDGER_DIR: &str = "ledger";
const PENDING_DIR: &str = "pending";

/// Durable store keeping one JSON document per record:
///
/// ```text
/// {root}/
///   locks/{hex(enrollment_id)}.json
///   ledger/{hex(order_id)}.json
///   pending/{hex(order_id)}.json
/// ```
///
/// Every write goes to a temp file in the target directory first and is then moved into place,
/// so readers never observe a half-written record. Write-once collections use a no-clobber
/// persist, which makes "insert if absent" atomic across threads and processes.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens the store, creating its directories if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [LOCKS_DIR, LEDGER_DIR, PENDING_DIR] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, collection: &str, key: &str) -> PathBuf {
        self.root
            .join(collection)
            .join(format!("{}.json", hex::encode(key)))
    }

    async fn persist(&self, path: PathBuf, bytes: Vec<u8>, clobber: bool) -> Result<bool> {
        let task = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            let dir = path
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| std::io::Error::other("record path has no parent"))?;
            let mut tmp = NamedTempFile::new_in(dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;

            if clobber {
                tmp.persist(&path).map_err(|e| e.error)?;
                return Ok(true);
            }
            match tmp.persist_noclobber(&path) {
                Ok(_) => Ok(true),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e.error),
            }
        });
        let written = task
            .await
            .map_err(|e| PaymentError::InternalError(Box::new(e)))??;
        Ok(written)
    }

    async fn write_once<T>(&self, path: PathBuf, value: T) -> Result<InsertOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let bytes = serde_json::to_vec_pretty(&value)?;
        if self.persist(path.clone(), bytes, false).await? {
            debug!(path = %path.display(), "Stored record");
            return Ok(InsertOutcome::Inserted(value));
        }
        let existing = self.read(&path).await?.ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "Record {} vanished after a clobber conflict",
                path.display()
            ))))
        })?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let mut entries = fs::read_dir(self.root.join(collection)).await?;
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable record");
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl LedgerStore for FileStore {
    async fn insert_if_absent(&self, tx: Transaction) -> Result<InsertOutcome<Transaction>> {
        let path = self.path_for(LEDGER_DIR, tx.order_id.as_str());
        self.write_once(path, tx).await
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Transaction>> {
        self.read(&self.path_for(LEDGER_DIR, order_id.as_str()))
            .await
    }

    async fn list_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<Vec<Transaction>> {
        let mut found: Vec<Transaction> = self
            .read_all::<Transaction>(LEDGER_DIR)
            .await?
            .into_iter()
            .filter(|tx: &Transaction| &tx.enrollment_id == enrollment_id)
            .collect();
        found.sort_by(ledger_order);
        Ok(found)
    }

    async fn list_for_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<Transaction>> {
        let mut found: Vec<Transaction> = self
            .read_all::<Transaction>(LEDGER_DIR)
            .await?
            .into_iter()
            .filter(|tx: &Transaction| &tx.registration_id == registration_id)
            .collect();
        found.sort_by(ledger_order);
        Ok(found)
    }
}

#[async_trait]
impl LockStore for FileStore {
    async fn insert_if_absent(&self, lock: PaymentLock) -> Result<InsertOutcome<PaymentLock>> {
        let path = self.path_for(LOCKS_DIR, lock.enrollment_id.as_str());
        self.write_once(path, lock).await
    }

    async fn get(&self, enrollment_id: &EnrollmentId) -> Result<Option<PaymentLock>> {
        self.read(&self.path_for(LOCKS_DIR, enrollment_id.as_str()))
            .await
    }
}

#[async_trait]
impl PendingPaymentStore for FileStore {
    async fn put(&self, record: PendingPaymentRecord) -> Result<()> {
        let path = self.path_for(PENDING_DIR, record.order_id.as_str());
        let bytes = serde_json::to_vec_pretty(&record)?;
        self.persist(path, bytes, true).await?;
        debug!(order_id = %record.order_id, "Persisted pending payment");
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<PendingPaymentRecord>> {
        self.read(&self.path_for(PENDING_DIR, order_id.as_str()))
            .await
    }

    async fn list(&self) -> Result<Vec<PendingPaymentRecord>> {
        let mut records: Vec<PendingPaymentRecord> = self.read_all(PENDING_DIR).await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn remove(&self, order_id: &OrderId) -> Result<bool> {
        match fs::remove_file(self.path_for(PENDING_DIR, order_id.as_str())).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enrollment::PaymentType;
    use crate::domain::test_support::{sample_intent, sample_payload};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_creates_layout() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state")).await.unwrap();
        for sub in [LOCKS_DIR, LEDGER_DIR, PENDING_DIR] {
            assert!(store.root().join(sub).is_dir());
        }
    }

    #[tokio::test]
    async fn test_file_ledger_is_write_once() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let intent = sample_intent("E1", None);
        let first = Transaction::verified(&sample_payload("order/1", "pay_1"), &intent);
        let dup = Transaction::verified(&sample_payload("order/1", "pay_2"), &intent);

        assert!(
            LedgerStore::insert_if_absent(&store, first.clone())
                .await
                .unwrap()
                .was_inserted()
        );
        let outcome = LedgerStore::insert_if_absent(&store, dup).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Existing(first.clone()));

        let all = store
            .list_for_enrollment(&EnrollmentId::new("E1"))
            .await
            .unwrap();
        assert_eq!(all, vec![first]);
    }

    #[tokio::test]
    async fn test_file_ledger_concurrent_inserts_keep_one() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let intent = sample_intent("E1", Some(1));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let tx = Transaction::verified(
                &sample_payload("order_race", &format!("pay_{}", i)),
                &intent,
            );
            handles.push(tokio::spawn(async move {
                LedgerStore::insert_if_absent(store.as_ref(), tx)
                    .await
                    .unwrap()
                    .was_inserted()
            }));
        }
        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(
            store
                .list_for_enrollment(&EnrollmentId::new("E1"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_file_lock_store() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let lock = PaymentLock::new(EnrollmentId::new("E1"), PaymentType::Installment);

        assert!(
            LockStore::insert_if_absent(&store, lock.clone())
                .await
                .unwrap()
                .was_inserted()
        );
        let again = PaymentLock::new(EnrollmentId::new("E1"), PaymentType::Full);
        let outcome = LockStore::insert_if_absent(&store, again).await.unwrap();
        assert_eq!(outcome.into_inner(), lock);
    }

    #[tokio::test]
    async fn test_pending_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let record = PendingPaymentRecord::new(
            sample_payload("order_1", "pay_1"),
            sample_intent("E1", Some(2)),
        );
        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.put(record.clone()).await.unwrap();
        }

        let reopened = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.list().await.unwrap(), vec![record.clone()]);
        assert_eq!(
            PendingPaymentStore::get(&reopened, &record.order_id)
                .await
                .unwrap(),
            Some(record.clone())
        );
        assert!(reopened.remove(&record.order_id).await.unwrap());
        assert!(!reopened.remove(&record.order_id).await.unwrap());
    }
}
