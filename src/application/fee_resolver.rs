use crate::domain::enrollment::Enrollment;
use crate::domain::fee::{FeeQuote, FeeTerms};
use crate::domain::ids::RegistrationId;
use crate::domain::ports::{EnrollmentDirectoryRef, FeeSourceRef, LedgerStoreRef};
use crate::error::{PaymentError, Result};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Works out what an enrollment costs.
///
/// A registration with a single enrollment is priced by registration. With several enrollments
/// each course may carry its own terms, so pricing is scoped to the enrollment: terms recorded on
/// an earlier transaction for the same course win, then the enrollment-scoped fee lookup.
///
/// Courses are identified by name; the free-course list is matched against the trimmed,
/// case-folded course name.
pub struct FeeResolver {
    directory: EnrollmentDirectoryRef,
    fees: FeeSourceRef,
    ledger: LedgerStoreRef,
    free_courses: HashSet<String>,
}

fn course_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl FeeResolver {
    pub fn new(
        directory: EnrollmentDirectoryRef,
        fees: FeeSourceRef,
        ledger: LedgerStoreRef,
        free_courses: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            directory,
            fees,
            ledger,
            free_courses: free_courses.into_iter().map(|c| course_key(&c)).collect(),
        }
    }

    pub fn is_free_course(&self, course_name: &str) -> bool {
        self.free_courses.contains(&course_key(course_name))
    }

    pub async fn resolve_fee(
        &self,
        registration_id: &RegistrationId,
        enrollment: &Enrollment,
    ) -> Result<FeeQuote> {
        let enrollments = self.directory.list_enrollments(registration_id).await?;
        if enrollment.registration_id != *registration_id
            || !enrollments.iter().any(|e| e.id == enrollment.id)
        {
            warn!(
                registration_id = %registration_id,
                enrollment_id = %enrollment.id,
                "Enrollment does not belong to registration"
            );
            return Err(PaymentError::NoActiveEnrollment);
        }

        if self.is_free_course(&enrollment.course_name) {
            debug!(enrollment_id = %enrollment.id, course = %enrollment.course_name, "Free course");
            return Ok(FeeQuote::free(enrollment));
        }

        let terms = if enrollments.len() <= 1 {
            self.fees.fee_for_registration(registration_id).await?
        } else {
            self.scoped_terms(registration_id, enrollment).await?
        };

        match terms {
            Some(terms) => Ok(FeeQuote::from_terms(enrollment, terms)),
            None => {
                warn!(
                    registration_id = %registration_id,
                    enrollment_id = %enrollment.id,
                    "No fee data for enrollment"
                );
                Err(PaymentError::FeeUnavailable(enrollment.id.clone()))
            }
        }
    }

    async fn scoped_terms(
        &self,
        registration_id: &RegistrationId,
        enrollment: &Enrollment,
    ) -> Result<Option<FeeTerms>> {
        let wanted = course_key(&enrollment.course_name);
        let prior = self
            .ledger
            .list_for_registration(registration_id)
            .await?
            .into_iter()
            .find(|tx| course_key(&tx.course_name) == wanted);

        if let Some(tx) = prior {
            // The stored amount of an installment is one period, not the course total, so the
            // quote is rebuilt from the list price and discount.
            debug!(order_id = %tx.order_id, "Fee terms taken from prior transaction");
            return FeeTerms::new(tx.original_fee, tx.discount_pct).map(Some);
        }

        self.fees.fee_for_enrollment(&enrollment.id).await
    }
}
