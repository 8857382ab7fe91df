use super::enrollment::Enrollment;
use super::fee::FeeTerms;
use super::gateway::{CheckoutOutcome, GatewayOrder};
use super::ids::{EnrollmentId, OrderId, RegistrationId};
use super::lock::PaymentLock;
use super::money::Amount;
use super::pending::{PaymentIntent, PendingPaymentRecord};
use super::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of a write-once insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Inserted(T),
    /// A record already existed under the key; it is returned untouched.
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            InsertOutcome::Inserted(value) | InsertOutcome::Existing(value) => value,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Append-only transaction ledger, unique by order id.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_if_absent(&self, tx: Transaction) -> Result<InsertOutcome<Transaction>>;
    async fn get(&self, order_id: &OrderId) -> Result<Option<Transaction>>;
    /// Transactions of one enrollment, oldest first.
    async fn list_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<Vec<Transaction>>;
    async fn list_for_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<Transaction>>;
}

/// At most one lock per enrollment.
#[async_trait]
pub trait LockStore: Send + Sync {
    async fn insert_if_absent(&self, lock: PaymentLock) -> Result<InsertOutcome<PaymentLock>>;
    async fn get(&self, enrollment_id: &EnrollmentId) -> Result<Option<PaymentLock>>;
}

/// Durable local slots for unverified gateway successes, keyed by order id.
#[async_trait]
pub trait PendingPaymentStore: Send + Sync {
    async fn put(&self, record: PendingPaymentRecord) -> Result<()>;
    async fn get(&self, order_id: &OrderId) -> Result<Option<PendingPaymentRecord>>;
    async fn list(&self) -> Result<Vec<PendingPaymentRecord>>;
    /// Returns whether a record was removed. Removing a missing record is not an error.
    async fn remove(&self, order_id: &OrderId) -> Result<bool>;
}

/// Read-only view of the enrollment subsystem.
#[async_trait]
pub trait EnrollmentDirectory: Send + Sync {
    async fn get_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<Option<Enrollment>>;
    async fn list_enrollments(&self, registration_id: &RegistrationId) -> Result<Vec<Enrollment>>;
}

/// Authoritative fee lookups.
#[async_trait]
pub trait FeeSource: Send + Sync {
    async fn fee_for_registration(&self, registration_id: &RegistrationId)
    -> Result<Option<FeeTerms>>;
    async fn fee_for_enrollment(&self, enrollment_id: &EnrollmentId) -> Result<Option<FeeTerms>>;
}

/// The external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount: Amount,
        currency: &str,
        intent: &PaymentIntent,
    ) -> Result<GatewayOrder>;

    /// Suspends until the checkout for `order` completes, is cancelled, or fails.
    async fn await_result(&self, order: &GatewayOrder) -> Result<CheckoutOutcome>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type LockStoreRef = Arc<dyn LockStore>;
pub type PendingPaymentStoreRef = Arc<dyn PendingPaymentStore>;
pub type EnrollmentDirectoryRef = Arc<dyn EnrollmentDirectory>;
pub type FeeSourceRef = Arc<dyn FeeSource>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
