use super::enrollment::Enrollment;
use super::ids::EnrollmentId;
use super::money::Money;
use super::schedule::InstallmentSchedule;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fee terms as stored by the fee authority: the list price and the discount granted on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeTerms {
    pub original_fee: Money,
    /// Percentage in `0..=100`.
    pub discount_pct: Decimal,
}

impl FeeTerms {
    pub fn new(original_fee: Money, discount_pct: Decimal) -> Result<Self> {
        if original_fee.is_negative() {
            return Err(PaymentError::ValidationError(format!(
                "Original fee cannot be negative: {}",
                original_fee
            )));
        }
        if discount_pct < Decimal::ZERO || discount_pct > Decimal::ONE_HUNDRED {
            return Err(PaymentError::ValidationError(format!(
                "Discount must be between 0 and 100, got {}",
                discount_pct
            )));
        }
        Ok(Self {
            original_fee,
            discount_pct,
        })
    }

    /// `round(original - original * discount / 100)`
    pub fn final_amount(&self) -> Money {
        let original = self.original_fee.value();
        let discount = original * self.discount_pct / Decimal::ONE_HUNDRED;
        Money::new(original - discount).round_whole()
    }
}

/// The payable amount for one enrollment. Derived on every request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub enrollment_id: EnrollmentId,
    pub course_name: String,
    pub original_fee: Money,
    pub discount_pct: Decimal,
    pub final_amount: Money,
    pub duration_months: u32,
    /// Set for allow-listed courses that never take a payment.
    pub free: bool,
}

impl FeeQuote {
    pub fn from_terms(enrollment: &Enrollment, terms: FeeTerms) -> Self {
        Self {
            enrollment_id: enrollment.id.clone(),
            course_name: enrollment.course_name.clone(),
            original_fee: terms.original_fee,
            discount_pct: terms.discount_pct,
            final_amount: terms.final_amount(),
            duration_months: enrollment.duration_months,
            free: false,
        }
    }

    pub fn free(enrollment: &Enrollment) -> Self {
        Self {
            enrollment_id: enrollment.id.clone(),
            course_name: enrollment.course_name.clone(),
            original_fee: Money::ZERO,
            discount_pct: Decimal::ZERO,
            final_amount: Money::ZERO,
            duration_months: enrollment.duration_months,
            free: true,
        }
    }

    pub fn is_free(&self) -> bool {
        self.free || !self.final_amount.is_positive()
    }

    pub fn schedule(&self) -> Result<InstallmentSchedule> {
        InstallmentSchedule::compute(self.final_amount, self.duration_months)
    }

    /// The schedule installments are actually charged against.
    ///
    /// Refused when the remainder rule leaves a period at zero or below: such a plan cannot be
    /// paid period by period without collecting more than the final amount.
    pub fn payable_schedule(&self) -> Result<InstallmentSchedule> {
        let schedule = self.schedule()?;
        if !schedule.is_payable() {
            return Err(PaymentError::InstallmentsUnavailable(format!(
                "{} over {} months leaves a period with nothing to charge",
                self.final_amount, self.duration_months
            )));
        }
        Ok(schedule)
    }

    /// The amount a single payment event must charge.
    pub fn amount_due(&self, period: Option<u32>) -> Result<Money> {
        match period {
            None => Ok(self.final_amount),
            Some(period) => self.payable_schedule()?.amount_for(period).ok_or_else(|| {
                PaymentError::ValidationError(format!(
                    "Period {} is outside the {}-period plan",
                    period, self.duration_months
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::RegistrationId;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn enrollment(duration_months: u32) -> Enrollment {
        Enrollment {
            id: EnrollmentId::new("E1"),
            registration_id: RegistrationId::new("R1"),
            course_name: "German A1".to_string(),
            duration_months,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_final_amount_applies_discount_and_rounds() {
        let terms = FeeTerms::new(Money::new(dec!(18600)), dec!(5)).unwrap();
        assert_eq!(terms.final_amount(), Money::new(dec!(17670)));

        let terms = FeeTerms::new(Money::new(dec!(999)), dec!(12.5)).unwrap();
        // 999 - 124.875 = 874.125
        assert_eq!(terms.final_amount(), Money::new(dec!(874)));
    }

    #[test]
    fn test_discount_bounds() {
        assert!(FeeTerms::new(Money::new(dec!(100)), dec!(101)).is_err());
        assert!(FeeTerms::new(Money::new(dec!(100)), dec!(-1)).is_err());
        assert!(FeeTerms::new(Money::new(dec!(-100)), dec!(0)).is_err());
    }

    #[test]
    fn test_quote_amount_due() {
        let terms = FeeTerms::new(Money::new(dec!(10000)), dec!(0)).unwrap();
        let quote = FeeQuote::from_terms(&enrollment(3), terms);
        assert_eq!(quote.amount_due(None).unwrap(), Money::new(dec!(10000)));
        assert_eq!(quote.amount_due(Some(3)).unwrap(), Money::new(dec!(3334)));
        assert!(quote.amount_due(Some(4)).is_err());
    }

    #[test]
    fn test_tiny_total_has_no_payable_schedule() {
        let terms = FeeTerms::new(Money::new(dec!(2)), dec!(0)).unwrap();
        let quote = FeeQuote::from_terms(&enrollment(4), terms);
        assert!(quote.schedule().is_ok());
        assert!(matches!(
            quote.payable_schedule(),
            Err(PaymentError::InstallmentsUnavailable(_))
        ));
        assert!(quote.amount_due(Some(2)).is_err());
        assert_eq!(quote.amount_due(None).unwrap(), Money::new(dec!(2)));
    }

    #[test]
    fn test_free_quote() {
        let quote = FeeQuote::free(&enrollment(6));
        assert!(quote.is_free());
        assert_eq!(quote.final_amount, Money::ZERO);
    }
}
