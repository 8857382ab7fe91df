use super::money::Money;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-period amounts of an installment plan, in period order.
///
/// `base = round(final / n)` and `remainder = final - base * n`. A positive remainder is added to
/// the last period, a negative one is taken from the first period. The remainder is never split,
/// so the amounts always add up to `final` exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentSchedule {
    periods: Vec<Money>,
}

impl InstallmentSchedule {
    pub fn compute(final_amount: Money, period_count: u32) -> Result<Self> {
        if period_count == 0 {
            return Err(PaymentError::ValidationError(
                "Installment period count must be at least 1".to_string(),
            ));
        }
        if final_amount.is_negative() {
            return Err(PaymentError::ValidationError(format!(
                "Cannot schedule a negative amount {}",
                final_amount
            )));
        }

        let count = Decimal::from(period_count);
        let base = Money::new(final_amount.value() / count).round_whole();
        let remainder = final_amount - Money::new(base.value() * count);

        let mut periods = vec![base; period_count as usize];
        if remainder.is_positive() {
            if let Some(last) = periods.last_mut() {
                *last += remainder;
            }
        } else if remainder.is_negative() {
            periods[0] += remainder;
        }

        Ok(Self { periods })
    }

    pub fn amounts(&self) -> &[Money] {
        &self.periods
    }

    pub fn len(&self) -> u32 {
        self.periods.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Amount due for a 1-based period index.
    pub fn amount_for(&self, period: u32) -> Option<Money> {
        let index = period.checked_sub(1)? as usize;
        self.periods.get(index).copied()
    }

    pub fn total(&self) -> Money {
        self.periods.iter().sum()
    }

    /// Whether every period charges a positive amount.
    pub fn is_payable(&self) -> bool {
        self.periods.iter().all(|amount| amount.is_positive())
    }

    /// First period, in order, that still has something due and is not in `paid`.
    ///
    /// Periods whose amount is zero or below need no payment and are skipped. A shortfall on a
    /// tiny total can push the first period under zero.
    pub fn next_payable<F>(&self, is_paid: F) -> Option<u32>
    where
        F: Fn(u32) -> bool,
    {
        (1..=self.len()).find(|&period| {
            let due = self.amount_for(period).unwrap_or(Money::ZERO);
            due.is_positive() && !is_paid(period)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amounts(schedule: &InstallmentSchedule) -> Vec<Decimal> {
        schedule.amounts().iter().map(Money::value).collect()
    }

    #[test]
    fn test_even_split_has_no_remainder() {
        let schedule = InstallmentSchedule::compute(Money::new(dec!(17670)), 6).unwrap();
        assert_eq!(amounts(&schedule), vec![dec!(2945); 6]);
    }

    #[test]
    fn test_overflow_goes_to_last_period() {
        let schedule = InstallmentSchedule::compute(Money::new(dec!(10000)), 3).unwrap();
        assert_eq!(amounts(&schedule), vec![dec!(3333), dec!(3333), dec!(3334)]);
    }

    #[test]
    fn test_shortfall_comes_from_first_period() {
        // 10000 / 6 = 1666.67 -> base 1667, 6 * 1667 = 10002, remainder -2
        let schedule = InstallmentSchedule::compute(Money::new(dec!(10000)), 6).unwrap();
        assert_eq!(
            amounts(&schedule),
            vec![
                dec!(1665),
                dec!(1667),
                dec!(1667),
                dec!(1667),
                dec!(1667),
                dec!(1667)
            ]
        );
        assert_eq!(schedule.total(), Money::new(dec!(10000)));
    }

    #[test]
    fn test_single_period_is_the_whole_amount() {
        let schedule = InstallmentSchedule::compute(Money::new(dec!(999)), 1).unwrap();
        assert_eq!(amounts(&schedule), vec![dec!(999)]);
    }

    #[test]
    fn test_zero_periods_rejected() {
        assert!(matches!(
            InstallmentSchedule::compute(Money::new(dec!(100)), 0),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(InstallmentSchedule::compute(Money::new(dec!(-1)), 3).is_err());
    }

    #[test]
    fn test_amount_for_is_one_based() {
        let schedule = InstallmentSchedule::compute(Money::new(dec!(10000)), 3).unwrap();
        assert_eq!(schedule.amount_for(0), None);
        assert_eq!(schedule.amount_for(3), Some(Money::new(dec!(3334))));
        assert_eq!(schedule.amount_for(4), None);
    }

    #[test]
    fn test_next_payable_skips_paid_and_zero_periods() {
        // 2 / 3 -> base 1, remainder -1 -> [0, 1, 1]
        let schedule = InstallmentSchedule::compute(Money::new(dec!(2)), 3).unwrap();
        assert_eq!(amounts(&schedule), vec![dec!(0), dec!(1), dec!(1)]);
        assert_eq!(schedule.next_payable(|_| false), Some(2));
        assert_eq!(schedule.next_payable(|p| p == 2), Some(3));
        assert_eq!(schedule.next_payable(|_| true), None);
        assert!(!schedule.is_payable());
    }

    #[test]
    fn test_negative_first_period_is_not_payable() {
        let schedule = InstallmentSchedule::compute(Money::new(dec!(2)), 4).unwrap();
        assert_eq!(amounts(&schedule), vec![dec!(-1), dec!(1), dec!(1), dec!(1)]);
        assert_eq!(schedule.total(), Money::new(dec!(2)));
        assert!(!schedule.is_payable());
        assert!(InstallmentSchedule::compute(Money::new(dec!(10000)), 6).unwrap().is_payable());
    }
}
