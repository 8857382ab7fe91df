use crate::application::notice::{Notice, Notifier};
use crate::application::verification::VerificationService;
use crate::domain::pending::PendingPaymentRecord;
use crate::domain::ports::{LedgerStoreRef, PendingPaymentStoreRef};
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Counts from one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Verified during this pass.
    pub recovered: usize,
    /// Already in the ledger; only the stale record was dropped.
    pub already_verified: usize,
    /// Left in place after a transient failure.
    pub deferred: usize,
    /// Left in place after a signature mismatch.
    pub needs_review: usize,
}

impl RecoveryReport {
    pub fn outstanding(&self) -> usize {
        self.deferred + self.needs_review
    }
}

enum Replay {
    Recovered,
    AlreadyVerified,
    Deferred,
    NeedsReview,
}

/// Finishes payments whose verification never completed.
///
/// Passes within one process are serialized. Across processes the ledger-first check and the
/// idempotent verify keep it at one transaction per order.
pub struct RecoveryManager {
    pending: PendingPaymentStoreRef,
    ledger: LedgerStoreRef,
    verifier: Arc<VerificationService>,
    notifier: Notifier,
    in_flight: Mutex<()>,
}

impl RecoveryManager {
    pub fn new(
        pending: PendingPaymentStoreRef,
        ledger: LedgerStoreRef,
        verifier: Arc<VerificationService>,
        notifier: Notifier,
    ) -> Self {
        Self {
            pending,
            ledger,
            verifier,
            notifier,
            in_flight: Mutex::new(()),
        }
    }

    /// Replays every stored pending record.
    ///
    /// Only a failure to read the pending store is returned as an error. Per-record failures are
    /// logged, announced with a notice and left for the next pass.
    pub async fn recover_pending(&self) -> Result<RecoveryReport> {
        let _pass = self.in_flight.lock().await;
        let records = self.pending.list().await?;
        if records.is_empty() {
            return Ok(RecoveryReport::default());
        }
        info!(count = records.len(), "Recovering pending payments");

        let mut report = RecoveryReport::default();
        for record in records {
            match self.replay(&record).await {
                Replay::Recovered => report.recovered += 1,
                Replay::AlreadyVerified => report.already_verified += 1,
                Replay::Deferred => report.deferred += 1,
                Replay::NeedsReview => report.needs_review += 1,
            }
        }
        info!(?report, "Recovery pass finished");
        Ok(report)
    }

    async fn replay(&self, record: &PendingPaymentRecord) -> Replay {
        let order_id = &record.order_id;
        match self.ledger.get(order_id).await {
            Ok(Some(_)) => {
                debug!(order_id = %order_id, "Order already in ledger");
                self.clear(record).await;
                return Replay::AlreadyVerified;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Ledger lookup failed during recovery");
                self.notifier.publish(Notice::VerificationDeferred {
                    order_id: order_id.clone(),
                });
                return Replay::Deferred;
            }
        }

        match self.verifier.verify(&record.payload, &record.intent).await {
            Ok(tx) => {
                self.clear(record).await;
                self.notifier.publish(Notice::PaymentVerified {
                    order_id: tx.order_id,
                    amount: tx.amount,
                });
                Replay::Recovered
            }
            Err(PaymentError::SignatureMismatch(_)) => {
                self.notifier.publish(Notice::VerificationNeedsReview {
                    order_id: order_id.clone(),
                });
                Replay::NeedsReview
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Recovery verification failed");
                self.notifier.publish(Notice::VerificationDeferred {
                    order_id: order_id.clone(),
                });
                Replay::Deferred
            }
        }
    }

    async fn clear(&self, record: &PendingPaymentRecord) {
        if let Err(e) = self.pending.remove(&record.order_id).await {
            warn!(order_id = %record.order_id, error = %e, "Failed to remove pending record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{EnrollmentId, OrderId};
    use crate::domain::pending::GatewayPayload;
    use crate::domain::ports::{LedgerStore, PendingPaymentStore};
    use crate::domain::signature::GatewaySignature;
    use crate::domain::test_support::{sample_intent, sample_payload};
    use crate::infrastructure::in_memory::{InMemoryLedgerStore, InMemoryPendingStore};

    struct Fixture {
        recovery: Arc<RecoveryManager>,
        verifier: Arc<VerificationService>,
        ledger: InMemoryLedgerStore,
        pending: InMemoryPendingStore,
        signer: GatewaySignature,
    }

    fn fixture() -> Fixture {
        let signer = GatewaySignature::new("secret");
        let ledger = InMemoryLedgerStore::new();
        let pending = InMemoryPendingStore::new();
        let verifier = Arc::new(VerificationService::new(
            Arc::new(ledger.clone()),
            signer.clone(),
        ));
        let recovery = Arc::new(RecoveryManager::new(
            Arc::new(pending.clone()),
            Arc::new(ledger.clone()),
            verifier.clone(),
            Notifier::new(16),
        ));
        Fixture {
            recovery,
            verifier,
            ledger,
            pending,
            signer,
        }
    }

    fn signed(signer: &GatewaySignature, order: &str) -> GatewayPayload {
        let mut payload = sample_payload(order, &format!("pay_{}", order));
        payload.signature = signer.sign(&payload.order_id, &payload.payment_id).unwrap();
        payload
    }

    #[tokio::test]
    async fn test_recovers_unverified_record() {
        let fx = fixture();
        let record = PendingPaymentRecord::new(signed(&fx.signer, "O1"), sample_intent("E1", None));
        fx.pending.put(record).await.unwrap();

        let report = fx.recovery.recover_pending().await.unwrap();
        assert_eq!(report.recovered, 1);

        let tx = fx.ledger.get(&OrderId::new("O1")).await.unwrap().unwrap();
        assert!(tx.is_verified());
        assert!(fx.pending.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_transaction_only_clears_record() {
        let fx = fixture();
        let payload = signed(&fx.signer, "O1");
        let intent = sample_intent("E1", None);
        fx.verifier.verify(&payload, &intent).await.unwrap();
        fx.pending
            .put(PendingPaymentRecord::new(payload, intent))
            .await
            .unwrap();

        let report = fx.recovery.recover_pending().await.unwrap();
        assert_eq!(report.already_verified, 1);
        assert_eq!(report.recovered, 0);
        assert_eq!(
            fx.ledger
                .list_for_enrollment(&EnrollmentId::new("E1"))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(fx.pending.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mismatch_is_kept_for_review() {
        let fx = fixture();
        fx.pending
            .put(PendingPaymentRecord::new(
                sample_payload("O1", "P1"),
                sample_intent("E1", None),
            ))
            .await
            .unwrap();

        let report = fx.recovery.recover_pending().await.unwrap();
        assert_eq!(report.needs_review, 1);
        assert_eq!(report.outstanding(), 1);
        assert!(fx.pending.get(&OrderId::new("O1")).await.unwrap().is_some());
        assert!(fx.ledger.get(&OrderId::new("O1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlapping_passes_create_one_transaction() {
        let fx = fixture();
        for order in ["O1", "O2", "O3"] {
            fx.pending
                .put(PendingPaymentRecord::new(
                    signed(&fx.signer, order),
                    sample_intent("E1", None),
                ))
                .await
                .unwrap();
        }

        let (a, b) = tokio::join!(
            fx.recovery.recover_pending(),
            fx.recovery.recover_pending()
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.recovered + b.recovered, 3);
        assert_eq!(a.already_verified + b.already_verified, 0);
        assert_eq!(
            fx.ledger
                .list_for_enrollment(&EnrollmentId::new("E1"))
                .await
                .unwrap()
                .len(),
            3
        );
    }
}
