use crate::application::notice::{Notice, Notifier};
use crate::application::verification::VerificationService;
use crate::domain::enrollment::{Enrollment, PaymentType};
use crate::domain::fee::FeeQuote;
use crate::domain::gateway::{CheckoutOutcome, GatewayOrder};
use crate::domain::ids::OrderId;
use crate::domain::money::{Amount, Money};
use crate::domain::pending::{PaymentIntent, PendingPaymentRecord};
use crate::domain::ports::{LedgerStoreRef, LockStoreRef, PaymentGatewayRef, PendingPaymentStoreRef};
use crate::domain::progress::PaymentProgress;
use crate::domain::transaction::Transaction;
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Cooperative "do not navigate away" signal.
///
/// The value is the number of verifications in flight. It is advisory only: a caller that ignores
/// it loses nothing, the pending record is recovered on the next start.
#[derive(Clone)]
pub struct NavigationAdvisory {
    tx: Arc<watch::Sender<usize>>,
}

impl Default for NavigationAdvisory {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }
}

impl NavigationAdvisory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        *self.tx.borrow() > 0
    }

    fn hold(&self) -> AdvisoryGuard {
        self.tx.send_modify(|count| *count += 1);
        AdvisoryGuard {
            tx: self.tx.clone(),
        }
    }
}

struct AdvisoryGuard {
    tx: Arc<watch::Sender<usize>>,
}

impl Drop for AdvisoryGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// A gateway order created for one payment event, not yet paid.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentAttempt {
    pub order: GatewayOrder,
    pub intent: PaymentIntent,
}

/// A gateway success that is waiting for verification.
///
/// Once one of these exists the attempt can no longer be cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedPayment {
    pub record: PendingPaymentRecord,
    /// Whether the pending record reached durable storage.
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    Verified(Transaction),
    /// Verification failed for a transient reason; the pending record will be retried.
    Deferred(OrderId),
    /// The gateway result did not authenticate; the pending record is kept for review.
    AwaitingReview(OrderId),
    /// Nothing is due (free course).
    NothingDue,
}

/// Drives one payment event from order creation through verification.
pub struct PaymentOrchestrator {
    gateway: PaymentGatewayRef,
    locks: LockStoreRef,
    ledger: LedgerStoreRef,
    pending: PendingPaymentStoreRef,
    verifier: Arc<VerificationService>,
    notifier: Notifier,
    advisory: NavigationAdvisory,
    currency: String,
}

impl PaymentOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: PaymentGatewayRef,
        locks: LockStoreRef,
        ledger: LedgerStoreRef,
        pending: PendingPaymentStoreRef,
        verifier: Arc<VerificationService>,
        notifier: Notifier,
        advisory: NavigationAdvisory,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            locks,
            ledger,
            pending,
            verifier,
            notifier,
            advisory,
            currency: currency.into(),
        }
    }

    /// Creates a gateway order for `amount`, covering the whole fee (`period == None`) or one
    /// installment period.
    ///
    /// Rejected unless the enrollment is locked to the matching plan, the amount is positive, the
    /// period is the next unpaid one, no earlier payment for the same event is still pending, and
    /// the amount is exactly what that event is scheduled to charge.
    pub async fn create_intent(
        &self,
        enrollment: &Enrollment,
        quote: &FeeQuote,
        amount: Money,
        period: Option<u32>,
    ) -> Result<PaymentAttempt> {
        let requested = PaymentType::for_period(period);
        match self.locks.get(&enrollment.id).await? {
            Some(lock) if lock.allows(requested) => {}
            _ => {
                return Err(PaymentError::NotLocked {
                    enrollment_id: enrollment.id.clone(),
                    requested,
                });
            }
        }

        let amount = Amount::new(amount)?;

        let history = self.ledger.list_for_enrollment(&enrollment.id).await?;
        let progress = PaymentProgress::from_transactions(&history);
        match period {
            None if progress.full_paid => {
                return Err(PaymentError::AlreadyPaid(enrollment.id.clone()));
            }
            None => {}
            Some(period) => match progress.next_period(&quote.payable_schedule()?) {
                None => return Err(PaymentError::AlreadyPaid(enrollment.id.clone())),
                Some(next) if next != period => {
                    return Err(PaymentError::NotNextPeriod {
                        requested: period,
                        expected: next,
                    });
                }
                Some(_) => {}
            },
        }

        if let Some(open) = self
            .pending
            .list()
            .await?
            .into_iter()
            .find(|record| {
                record.intent.enrollment_id == enrollment.id && record.intent.period == period
            })
        {
            // The gateway already took this payment.
            return Err(PaymentError::PaymentPending(open.order_id));
        }

        let expected = quote.amount_due(period)?;
        if Money::from(amount) != expected {
            return Err(PaymentError::AmountMismatch {
                expected,
                requested: amount.into(),
            });
        }

        let intent = PaymentIntent {
            enrollment_id: enrollment.id.clone(),
            registration_id: enrollment.registration_id.clone(),
            course_name: enrollment.course_name.clone(),
            payment_type: requested,
            period,
            amount: amount.into(),
            original_fee: quote.original_fee,
            discount_pct: quote.discount_pct,
        };
        let order = self
            .gateway
            .create_order(amount, &self.currency, &intent)
            .await?;
        info!(
            order_id = %order.order_id,
            enrollment_id = %enrollment.id,
            period = ?period,
            amount = %order.amount,
            "Payment intent created"
        );
        Ok(PaymentAttempt { order, intent })
    }

    /// Waits for the checkout to finish and, on success, records the pending payment.
    ///
    /// A cancelled or declined checkout publishes [`Notice::PaymentNotCompleted`] and leaves no
    /// state behind.
    pub async fn checkout(&self, attempt: PaymentAttempt) -> Result<StagedPayment> {
        let payload = match self.gateway.await_result(&attempt.order).await? {
            CheckoutOutcome::Succeeded(payload) => payload,
            CheckoutOutcome::Cancelled => return Err(self.not_completed("cancelled")),
            CheckoutOutcome::Failed(reason) => return Err(self.not_completed(&reason)),
        };
        if payload.order_id != attempt.order.order_id {
            return Err(PaymentError::Gateway(format!(
                "Checkout for order {} reported order {}",
                attempt.order.order_id, payload.order_id
            )));
        }

        let record = PendingPaymentRecord::new(payload, attempt.intent);
        let persisted = match self.pending.put(record.clone()).await {
            Ok(()) => true,
            Err(e) => {
                // Verification still runs; a failure there retries the write.
                error!(order_id = %record.order_id, error = %e, "Failed to persist pending payment");
                false
            }
        };
        Ok(StagedPayment { record, persisted })
    }

    /// Verifies a staged payment and clears its pending record.
    ///
    /// Failures after the gateway took the money are reported as [`PaymentOutcome::Deferred`] or
    /// [`PaymentOutcome::AwaitingReview`] instead of errors; the only error is being unable to keep
    /// the pending record at all.
    pub async fn finish(&self, staged: StagedPayment) -> Result<PaymentOutcome> {
        let _advisory = self.advisory.hold();
        let StagedPayment { record, persisted } = staged;
        let order_id = record.order_id.clone();

        match self.verifier.verify(&record.payload, &record.intent).await {
            Ok(tx) => {
                if let Err(e) = self.pending.remove(&order_id).await {
                    // Recovery drops it later: the ledger already has the order.
                    warn!(order_id = %order_id, error = %e, "Failed to clear pending payment");
                }
                self.notifier.publish(Notice::PaymentVerified {
                    order_id: tx.order_id.clone(),
                    amount: tx.amount,
                });
                Ok(PaymentOutcome::Verified(tx))
            }
            Err(PaymentError::SignatureMismatch(_)) => {
                self.keep_pending(&record, persisted).await?;
                self.notifier
                    .publish(Notice::VerificationNeedsReview { order_id: order_id.clone() });
                Ok(PaymentOutcome::AwaitingReview(order_id))
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Verification failed, deferring to recovery");
                self.keep_pending(&record, persisted).await?;
                self.notifier
                    .publish(Notice::VerificationDeferred { order_id: order_id.clone() });
                Ok(PaymentOutcome::Deferred(order_id))
            }
        }
    }

    /// Full payment event: intent, checkout, verification.
    pub async fn pay(
        &self,
        enrollment: &Enrollment,
        quote: &FeeQuote,
        amount: Money,
        period: Option<u32>,
    ) -> Result<PaymentOutcome> {
        let attempt = self.create_intent(enrollment, quote, amount, period).await?;
        let staged = self.checkout(attempt).await?;
        self.finish(staged).await
    }

    async fn keep_pending(&self, record: &PendingPaymentRecord, persisted: bool) -> Result<()> {
        if persisted {
            return Ok(());
        }
        self.pending.put(record.clone()).await
    }

    fn not_completed(&self, reason: &str) -> PaymentError {
        self.notifier.publish(Notice::PaymentNotCompleted {
            reason: reason.to_string(),
        });
        PaymentError::PaymentNotCompleted(reason.to_string())
    }
}
