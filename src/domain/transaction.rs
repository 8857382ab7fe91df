use super::enrollment::PaymentType;
use super::ids::{EnrollmentId, OrderId, PaymentId, RegistrationId};
use super::money::Money;
use super::pending::{GatewayPayload, PaymentIntent};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Unverified,
    Verified,
}

/// An immutable ledger record of one charge. Unique by `order_id`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub enrollment_id: EnrollmentId,
    pub registration_id: RegistrationId,
    pub course_name: String,
    pub payment_type: PaymentType,
    /// 1-based installment index; `None` for a full payment.
    pub period: Option<u32>,
    /// Amount charged by this transaction (a single period for installments).
    pub amount: Money,
    /// Course list price the charge was computed from.
    pub original_fee: Money,
    pub discount_pct: Decimal,
    pub status: VerificationStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn verified(payload: &GatewayPayload, intent: &PaymentIntent) -> Self {
        Self {
            payment_id: payload.payment_id.clone(),
            order_id: payload.order_id.clone(),
            enrollment_id: intent.enrollment_id.clone(),
            registration_id: intent.registration_id.clone(),
            course_name: intent.course_name.clone(),
            payment_type: intent.payment_type,
            period: intent.period,
            amount: intent.amount,
            original_fee: intent.original_fee,
            discount_pct: intent.discount_pct,
            status: VerificationStatus::Verified,
            created_at: Utc::now(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Ledger listing order: oldest first, ties broken by period then order id.
pub fn ledger_order(a: &Transaction, b: &Transaction) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.period.cmp(&b.period))
        .then_with(|| a.order_id.cmp(&b.order_id))
}
