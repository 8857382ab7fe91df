use crate::domain::pending::{GatewayPayload, PaymentIntent};
use crate::domain::ports::{InsertOutcome, LedgerStoreRef};
use crate::domain::signature::GatewaySignature;
use crate::domain::transaction::Transaction;
use crate::error::{PaymentError, Result};
use tracing::{debug, info, warn};

/// Authenticates gateway results and appends them to the ledger.
///
/// This is the only component that creates [`Transaction`]s. Verification is idempotent per
/// order id: a repeated call with the same payload returns the transaction recorded the first time.
pub struct VerificationService {
    ledger: LedgerStoreRef,
    signer: GatewaySignature,
}

impl VerificationService {
    pub fn new(ledger: LedgerStoreRef, signer: GatewaySignature) -> Self {
        Self { ledger, signer }
    }

    pub async fn verify(
        &self,
        payload: &GatewayPayload,
        intent: &PaymentIntent,
    ) -> Result<Transaction> {
        if !self
            .signer
            .verify(&payload.order_id, &payload.payment_id, &payload.signature)
        {
            warn!(
                order_id = %payload.order_id,
                payment_id = %payload.payment_id,
                "Gateway signature did not match"
            );
            return Err(PaymentError::SignatureMismatch(payload.order_id.clone()));
        }

        match self
            .ledger
            .insert_if_absent(Transaction::verified(payload, intent))
            .await?
        {
            InsertOutcome::Inserted(tx) => {
                info!(
                    order_id = %tx.order_id,
                    enrollment_id = %tx.enrollment_id,
                    period = ?tx.period,
                    amount = %tx.amount,
                    "Transaction recorded"
                );
                Ok(tx)
            }
            InsertOutcome::Existing(tx) => {
                debug!(order_id = %tx.order_id, "Order already verified");
                Ok(tx)
            }
        }
    }
}
