use super::enrollment::PaymentType;
use super::ids::{EnrollmentId, OrderId, PaymentId, RegistrationId};
use super::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the gateway hands back to the client after a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub signature: String,
}

/// Everything needed to turn a verified gateway result into a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub enrollment_id: EnrollmentId,
    pub registration_id: RegistrationId,
    pub course_name: String,
    pub payment_type: PaymentType,
    pub period: Option<u32>,
    pub amount: Money,
    pub original_fee: Money,
    pub discount_pct: Decimal,
}

/// A gateway success that has not been verified yet.
///
/// Written before verification starts and removed only once the ledger holds the transaction,
/// so a client that disappears in between can finish the job on its next start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPaymentRecord {
    pub order_id: OrderId,
    pub payload: GatewayPayload,
    pub intent: PaymentIntent,
    pub created_at: DateTime<Utc>,
}

impl PendingPaymentRecord {
    pub fn new(payload: GatewayPayload, intent: PaymentIntent) -> Self {
        Self {
            order_id: payload.order_id.clone(),
            payload,
            intent,
            created_at: Utc::now(),
        }
    }
}
