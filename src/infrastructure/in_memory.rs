use crate::domain::enrollment::Enrollment;
use crate::domain::fee::FeeTerms;
use crate::domain::ids::{EnrollmentId, OrderId, RegistrationId};
use crate::domain::lock::PaymentLock;
use crate::domain::pending::PendingPaymentRecord;
use crate::domain::ports::{
    EnrollmentDirectory, FeeSource, InsertOutcome, LedgerStore, LockStore, PendingPaymentStore,
};
use crate::domain::transaction::{Transaction, ledger_order};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory transaction ledger.
///
/// The check and the insert of `insert_if_absent` happen under one write guard, so concurrent
/// duplicate verifications still produce a single entry.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    transactions: Arc<RwLock<HashMap<OrderId, Transaction>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn oldest_first(mut transactions: Vec<Transaction>) -> Vec<Transaction> {
    transactions.sort_by(ledger_order);
    transactions
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_if_absent(&self, tx: Transaction) -> Result<InsertOutcome<Transaction>> {
        let mut transactions = self.transactions.write().await;
        if let Some(existing) = transactions.get(&tx.order_id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        transactions.insert(tx.order_id.clone(), tx.clone());
        Ok(InsertOutcome::Inserted(tx))
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(order_id).cloned())
    }

    async fn list_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(oldest_first(
            transactions
                .values()
                .filter(|tx| &tx.enrollment_id == enrollment_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_for_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(oldest_first(
            transactions
                .values()
                .filter(|tx| &tx.registration_id == registration_id)
                .cloned()
                .collect(),
        ))
    }
}

#[derive(Default, Clone)]
pub struct InMemoryLockStore {
    locks: Arc<RwLock<HashMap<EnrollmentId, PaymentLock>>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn insert_if_absent(&self, lock: PaymentLock) -> Result<InsertOutcome<PaymentLock>> {
        let mut locks = self.locks.write().await;
        if let Some(existing) = locks.get(&lock.enrollment_id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        locks.insert(lock.enrollment_id.clone(), lock.clone());
        Ok(InsertOutcome::Inserted(lock))
    }

    async fn get(&self, enrollment_id: &EnrollmentId) -> Result<Option<PaymentLock>> {
        let locks = self.locks.read().await;
        Ok(locks.get(enrollment_id).cloned())
    }
}

/// Pending records kept in memory only. Does not survive a restart; use it for tests.
#[derive(Default, Clone)]
pub struct InMemoryPendingStore {
    records: Arc<RwLock<HashMap<OrderId, PendingPaymentRecord>>>,
}

impl InMemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingPaymentStore for InMemoryPendingStore {
    async fn put(&self, record: PendingPaymentRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.order_id.clone(), record);
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<PendingPaymentRecord>> {
        let records = self.records.read().await;
        Ok(records.get(order_id).cloned())
    }

    async fn list(&self) -> Result<Vec<PendingPaymentRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn remove(&self, order_id: &OrderId) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(order_id).is_some())
    }
}

/// Enrollment directory and fee source backed by maps.
///
/// Stands in for the enrollment and fee services in the CLI and in tests.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    enrollments: Arc<RwLock<HashMap<EnrollmentId, Enrollment>>>,
    registration_fees: Arc<RwLock<HashMap<RegistrationId, FeeTerms>>>,
    enrollment_fees: Arc<RwLock<HashMap<EnrollmentId, FeeTerms>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_enrollment(&self, enrollment: Enrollment) {
        let mut enrollments = self.enrollments.write().await;
        enrollments.insert(enrollment.id.clone(), enrollment);
    }

    pub async fn set_registration_fee(&self, registration_id: RegistrationId, terms: FeeTerms) {
        let mut fees = self.registration_fees.write().await;
        fees.insert(registration_id, terms);
    }

    pub async fn set_enrollment_fee(&self, enrollment_id: EnrollmentId, terms: FeeTerms) {
        let mut fees = self.enrollment_fees.write().await;
        fees.insert(enrollment_id, terms);
    }
}

#[async_trait]
impl EnrollmentDirectory for InMemoryCatalog {
    async fn get_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<Option<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        Ok(enrollments.get(enrollment_id).cloned())
    }

    async fn list_enrollments(&self, registration_id: &RegistrationId) -> Result<Vec<Enrollment>> {
        let enrollments = self.enrollments.read().await;
        let mut found: Vec<_> = enrollments
            .values()
            .filter(|e| &e.registration_id == registration_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }
}

#[async_trait]
impl FeeSource for InMemoryCatalog {
    async fn fee_for_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<FeeTerms>> {
        let fees = self.registration_fees.read().await;
        Ok(fees.get(registration_id).copied())
    }

    async fn fee_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<Option<FeeTerms>> {
        let fees = self.enrollment_fees.read().await;
        Ok(fees.get(enrollment_id).copied())
    }
}
