use super::enrollment::PaymentType;
use super::fee::FeeQuote;
use super::schedule::InstallmentSchedule;
use super::transaction::Transaction;
use crate::error::Result;
use std::collections::BTreeSet;

/// What has been paid so far for one enrollment, derived from its verified transactions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaymentProgress {
    pub paid_periods: BTreeSet<u32>,
    pub full_paid: bool,
}

impl PaymentProgress {
    pub fn from_transactions<'a, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut progress = Self::default();
        for tx in transactions.into_iter().filter(|tx| tx.is_verified()) {
            match (tx.payment_type, tx.period) {
                (PaymentType::Installment, Some(period)) => {
                    progress.paid_periods.insert(period);
                }
                _ => progress.full_paid = true,
            }
        }
        progress
    }

    pub fn is_period_paid(&self, period: u32) -> bool {
        self.paid_periods.contains(&period)
    }

    /// Lowest period that still has an amount due.
    pub fn next_period(&self, schedule: &InstallmentSchedule) -> Option<u32> {
        schedule.next_payable(|period| self.is_period_paid(period))
    }

    /// Whether nothing is left to pay under the given plan.
    pub fn is_settled(&self, quote: &FeeQuote, plan: PaymentType) -> Result<bool> {
        if quote.is_free() {
            return Ok(true);
        }
        Ok(match plan {
            PaymentType::Full => self.full_paid,
            PaymentType::Installment => self.next_period(&quote.schedule()?).is_none(),
        })
    }
}
