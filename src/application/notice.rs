use crate::domain::ids::OrderId;
use crate::domain::money::Money;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// User-facing messages produced by the payment flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Checkout was cancelled or declined. Nothing was charged.
    PaymentNotCompleted { reason: String },
    /// A payment was verified and recorded.
    PaymentVerified { order_id: OrderId, amount: Money },
    /// Verification could not finish; it will be retried automatically.
    VerificationDeferred { order_id: OrderId },
    /// The gateway result did not authenticate; the record is kept for review.
    VerificationNeedsReview { order_id: OrderId },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::PaymentNotCompleted { reason } => {
                format!("Payment was not completed ({}). You can try again.", reason)
            }
            Notice::PaymentVerified { amount, .. } => {
                format!("Payment of {} received. Thank you!", amount)
            }
            Notice::VerificationDeferred { .. } => {
                "We are confirming your payment and will retry automatically.".to_string()
            }
            Notice::VerificationNeedsReview { order_id } => format!(
                "We could not confirm payment {} yet. We'll keep trying; contact support if this persists.",
                order_id
            ),
        }
    }
}

/// Fan-out of [`Notice`]s to whoever is listening. Sending never fails the caller.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn publish(&self, notice: Notice) {
        match &notice {
            Notice::PaymentVerified { order_id, amount } => {
                info!(order_id = %order_id, amount = %amount, "Payment verified");
            }
            Notice::PaymentNotCompleted { reason } => {
                info!(reason = reason.as_str(), "Payment not completed");
            }
            Notice::VerificationDeferred { order_id } => {
                warn!(order_id = %order_id, "Verification deferred to recovery");
            }
            Notice::VerificationNeedsReview { order_id } => {
                warn!(order_id = %order_id, "Verification needs review");
            }
        }
        // No subscribers is fine
        let _ = self.tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_subscribers_receive_notices() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.publish(Notice::PaymentVerified {
            order_id: OrderId::new("order_1"),
            amount: Money::new(dec!(2945)),
        });
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.message(), "Payment of 2945 received. Thank you!");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = Notifier::new(1);
        notifier.publish(Notice::PaymentNotCompleted {
            reason: "cancelled".to_string(),
        });
    }
}
