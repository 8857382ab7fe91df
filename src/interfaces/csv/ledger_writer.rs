use crate::domain::transaction::Transaction;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LedgerRow<'a> {
    order_id: &'a str,
    payment_id: &'a str,
    registration: &'a str,
    enrollment: &'a str,
    course: &'a str,
    payment_type: String,
    period: Option<u32>,
    amount: String,
    status: &'static str,
    created_at: String,
}

impl<'a> From<&'a Transaction> for LedgerRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        Self {
            order_id: tx.order_id.as_str(),
            payment_id: tx.payment_id.as_str(),
            registration: tx.registration_id.as_str(),
            enrollment: tx.enrollment_id.as_str(),
            course: &tx.course_name,
            payment_type: tx.payment_type.to_string(),
            period: tx.period,
            amount: tx.amount.to_string(),
            status: if tx.is_verified() { "verified" } else { "unverified" },
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// Writes ledger transactions as CSV with a header row.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_transactions<'a, I>(&mut self, transactions: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        for tx in transactions {
            self.writer.serialize(LedgerRow::from(tx))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_support::{sample_intent, sample_payload};

    #[test]
    fn test_writes_header_and_rows() {
        let full = Transaction::verified(&sample_payload("O1", "P1"), &sample_intent("E1", None));
        let period = Transaction::verified(&sample_payload("O2", "P2"), &sample_intent("E2", Some(2)));

        let mut buf = Vec::new();
        LedgerWriter::new(&mut buf)
            .write_transactions([&full, &period])
            .unwrap();
        let out = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(
            lines[0],
            "order_id,payment_id,registration,enrollment,course,payment_type,period,amount,status,created_at"
        );
        assert!(lines[1].starts_with("O1,P1,R1,E1,German A1,full,,10000,verified,"));
        assert!(lines[2].starts_with("O2,P2,R1,E2,German A1,installment,2,3333,verified,"));
    }
}
