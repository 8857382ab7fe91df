use super::enrollment::PaymentType;
use super::ids::EnrollmentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The confirmed payment plan of an enrollment. Written once, never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLock {
    pub enrollment_id: EnrollmentId,
    pub payment_type: PaymentType,
    pub locked_at: DateTime<Utc>,
}

impl PaymentLock {
    pub fn new(enrollment_id: EnrollmentId, payment_type: PaymentType) -> Self {
        Self {
            enrollment_id,
            payment_type,
            locked_at: Utc::now(),
        }
    }

    pub fn allows(&self, payment_type: PaymentType) -> bool {
        self.payment_type == payment_type
    }
}
