use crate::domain::enrollment::Enrollment;
use crate::domain::fee::FeeTerms;
use crate::domain::ids::{EnrollmentId, RegistrationId};
use crate::domain::money::Money;
use crate::error::{PaymentError, Result};
use crate::infrastructure::in_memory::InMemoryCatalog;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use tracing::debug;

/// One enrollment and its fee terms.
///
/// Header: `registration,enrollment,course,duration_months,created_at,original_fee,discount`.
/// `created_at` (RFC 3339), `original_fee` and `discount` may be left empty.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogRow {
    pub registration: String,
    pub enrollment: String,
    pub course: String,
    pub duration_months: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub original_fee: Option<Decimal>,
    pub discount: Option<Decimal>,
}

impl CatalogRow {
    pub fn to_enrollment(&self) -> Enrollment {
        Enrollment {
            id: EnrollmentId::new(self.enrollment.as_str()),
            registration_id: RegistrationId::new(self.registration.as_str()),
            course_name: self.course.clone(),
            duration_months: self.duration_months,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }

    /// `None` when the row carries no fee.
    pub fn fee_terms(&self) -> Result<Option<FeeTerms>> {
        self.original_fee
            .map(|fee| FeeTerms::new(Money::new(fee), self.discount.unwrap_or_default()))
            .transpose()
    }
}

/// Reads the enrollment catalog from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming, like every CSV input of the crate.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows.
    pub fn rows(self) -> impl Iterator<Item = Result<CatalogRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }

    /// Loads every row into `catalog`.
    ///
    /// Fee terms are registered per enrollment. The first priced row of a registration also
    /// becomes the registration-level fee, which is what single-enrollment registrations use.
    pub async fn load_into(self, catalog: &InMemoryCatalog) -> Result<usize> {
        let mut priced_registrations = HashSet::new();
        let mut count = 0;
        for row in self.rows() {
            let row = row?;
            if row.enrollment.is_empty() || row.registration.is_empty() {
                return Err(PaymentError::ValidationError(format!(
                    "Catalog row {} is missing registration or enrollment id",
                    count + 1
                )));
            }
            let enrollment = row.to_enrollment();
            if let Some(terms) = row.fee_terms()? {
                if priced_registrations.insert(enrollment.registration_id.clone()) {
                    catalog
                        .set_registration_fee(enrollment.registration_id.clone(), terms)
                        .await;
                }
                catalog.set_enrollment_fee(enrollment.id.clone(), terms).await;
            }
            catalog.add_enrollment(enrollment).await;
            count += 1;
        }
        debug!(rows = count, "Catalog loaded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{EnrollmentDirectory, FeeSource};
    use rust_decimal_macros::dec;

    const CATALOG: &str = "\
registration, enrollment, course, duration_months, created_at, original_fee, discount
R1, E1, German A1, 6, 2024-01-10T09:00:00Z, 18600, 5
R2, E2, German A2, 3, , 10000,
R2, E3, Orientation, 1, , ,
";

    #[test]
    fn test_reader_valid_stream() {
        let rows: Vec<Result<CatalogRow>> = CatalogReader::new(CATALOG.as_bytes()).rows().collect();
        assert_eq!(rows.len(), 3);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.duration_months, 6);
        assert_eq!(first.discount, Some(dec!(5)));
        assert!(first.created_at.is_some());

        let third = rows[2].as_ref().unwrap();
        assert_eq!(third.fee_terms().unwrap(), None);
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "registration,enrollment,course,duration_months,created_at,original_fee,discount\nR1,E1,German,six,,100,0";
        let rows: Vec<Result<CatalogRow>> = CatalogReader::new(data.as_bytes()).rows().collect();
        assert!(rows[0].is_err());
    }

    #[tokio::test]
    async fn test_load_into_catalog() {
        let catalog = InMemoryCatalog::new();
        let count = CatalogReader::new(CATALOG.as_bytes())
            .load_into(&catalog)
            .await
            .unwrap();
        assert_eq!(count, 3);

        let r2 = catalog
            .list_enrollments(&RegistrationId::new("R2"))
            .await
            .unwrap();
        assert_eq!(r2.len(), 2);

        let terms = catalog
            .fee_for_registration(&RegistrationId::new("R1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(terms.final_amount(), Money::new(dec!(17670)));
        assert!(
            catalog
                .fee_for_enrollment(&EnrollmentId::new("E3"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
