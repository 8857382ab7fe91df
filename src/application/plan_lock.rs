use crate::domain::enrollment::PaymentType;
use crate::domain::ids::EnrollmentId;
use crate::domain::lock::PaymentLock;
use crate::domain::ports::{EnrollmentDirectoryRef, InsertOutcome, LockStoreRef};
use crate::error::{PaymentError, Result};
use tracing::{info, warn};

/// Records the one payment plan an enrollment is allowed to use.
pub struct PlanLockManager {
    locks: LockStoreRef,
    directory: EnrollmentDirectoryRef,
}

impl PlanLockManager {
    pub fn new(locks: LockStoreRef, directory: EnrollmentDirectoryRef) -> Self {
        Self { locks, directory }
    }

    pub async fn get_lock(&self, enrollment_id: &EnrollmentId) -> Result<Option<PaymentLock>> {
        if enrollment_id.is_unset() {
            return Ok(None);
        }
        self.locks.get(enrollment_id).await
    }

    /// Locks the enrollment to `payment_type`.
    ///
    /// Confirming the type that is already locked returns the existing lock unchanged.
    pub async fn confirm_lock(
        &self,
        enrollment_id: &EnrollmentId,
        payment_type: PaymentType,
    ) -> Result<PaymentLock> {
        if enrollment_id.is_unset()
            || self.directory.get_enrollment(enrollment_id).await?.is_none()
        {
            return Err(PaymentError::NoActiveEnrollment);
        }

        match self
            .locks
            .insert_if_absent(PaymentLock::new(enrollment_id.clone(), payment_type))
            .await?
        {
            InsertOutcome::Inserted(lock) => {
                info!(enrollment_id = %enrollment_id, payment_type = %payment_type, "Payment plan locked");
                Ok(lock)
            }
            InsertOutcome::Existing(lock) if lock.allows(payment_type) => Ok(lock),
            InsertOutcome::Existing(lock) => {
                warn!(
                    enrollment_id = %enrollment_id,
                    existing = %lock.payment_type,
                    requested = %payment_type,
                    "Rejected payment plan change"
                );
                Err(PaymentError::AlreadyLocked {
                    enrollment_id: enrollment_id.clone(),
                    existing: lock.payment_type,
                })
            }
        }
    }
}
