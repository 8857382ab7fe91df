use crate::domain::ids::{EnrollmentId, OrderId};
use crate::domain::money::Money;
use crate::domain::enrollment::PaymentType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The user can simply try again (cancelled or declined checkout).
    UserRecoverable,
    /// A business rule rejected the action; nothing was changed.
    PolicyViolation,
    /// A gateway result could not be authenticated.
    Integrity,
    /// Storage, network or gateway plumbing failed.
    Transient,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Fee unavailable for enrollment {0}")]
    FeeUnavailable(EnrollmentId),
    #[error("No active enrollment")]
    NoActiveEnrollment,
    #[error("Enrollment {enrollment_id} is already locked to {existing} payment")]
    AlreadyLocked {
        enrollment_id: EnrollmentId,
        existing: PaymentType,
    },
    #[error("Enrollment {enrollment_id} is not locked to {requested} payment")]
    NotLocked {
        enrollment_id: EnrollmentId,
        requested: PaymentType,
    },
    #[error("Invalid amount: {0}")]
    InvalidAmount(Money),
    #[error("Amount {requested} does not match the scheduled amount {expected}")]
    AmountMismatch { expected: Money, requested: Money },
    #[error("Period {requested} cannot be paid yet, next payable period is {expected}")]
    NotNextPeriod { requested: u32, expected: u32 },
    #[error("Nothing left to pay for enrollment {0}")]
    AlreadyPaid(EnrollmentId),
    #[error("Awaiting verification of earlier payment, order {0}")]
    PaymentPending(OrderId),
    #[error("Installments are not available: {0}")]
    InstallmentsUnavailable(String),
    #[error("Course {0} is free, no payment is required")]
    FreeCourse(String),
    #[error("Payment not completed: {0}")]
    PaymentNotCompleted(String),
    #[error("Signature mismatch for order {0}")]
    SignatureMismatch(OrderId),
    #[error("Gateway error: {0}")]
    Gateway(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PaymentError::PaymentNotCompleted(_) => ErrorClass::UserRecoverable,
            PaymentError::FeeUnavailable(_)
            | PaymentError::NoActiveEnrollment
            | PaymentError::AlreadyLocked { .. }
            | PaymentError::NotLocked { .. }
            | PaymentError::InvalidAmount(_)
            | PaymentError::AmountMismatch { .. }
            | PaymentError::NotNextPeriod { .. }
            | PaymentError::AlreadyPaid(_)
            | PaymentError::PaymentPending(_)
            | PaymentError::InstallmentsUnavailable(_)
            | PaymentError::FreeCourse(_)
            | PaymentError::ValidationError(_) => ErrorClass::PolicyViolation,
            PaymentError::SignatureMismatch(_) => ErrorClass::Integrity,
            _ => ErrorClass::Transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
