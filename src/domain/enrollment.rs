use super::ids::{EnrollmentId, RegistrationId};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registration's seat in a specific course batch. Owned by the enrollment subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub registration_id: RegistrationId,
    pub course_name: String,
    /// Course length in months; also the installment count.
    pub duration_months: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Full,
    #[serde(alias = "emi")]
    Installment,
}

impl PaymentType {
    /// The payment type implied by a period index: none for a full payment.
    pub fn for_period(period: Option<u32>) -> Self {
        match period {
            Some(_) => PaymentType::Installment,
            None => PaymentType::Full,
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentType::Full => f.write_str("full"),
            PaymentType::Installment => f.write_str("installment"),
        }
    }
}

impl FromStr for PaymentType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(PaymentType::Full),
            "installment" | "emi" => Ok(PaymentType::Installment),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown payment type '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_type_parsing() {
        assert_eq!("full".parse::<PaymentType>().unwrap(), PaymentType::Full);
        assert_eq!("EMI".parse::<PaymentType>().unwrap(), PaymentType::Installment);
        assert_eq!(
            " installment ".parse::<PaymentType>().unwrap(),
            PaymentType::Installment
        );
        assert!(matches!(
            "weekly".parse::<PaymentType>(),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_payment_type_serde_accepts_emi_alias() {
        let parsed: PaymentType = serde_json::from_str("\"emi\"").unwrap();
        assert_eq!(parsed, PaymentType::Installment);
        assert_eq!(
            serde_json::to_string(&PaymentType::Installment).unwrap(),
            "\"installment\""
        );
    }

    #[test]
    fn test_payment_type_for_period() {
        assert_eq!(PaymentType::for_period(None), PaymentType::Full);
        assert_eq!(PaymentType::for_period(Some(1)), PaymentType::Installment);
    }
}
