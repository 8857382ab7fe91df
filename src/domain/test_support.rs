use super::enrollment::{Enrollment, PaymentType};
use super::ids::{EnrollmentId, OrderId, PaymentId, RegistrationId};
use super::money::Money;
use super::pending::{GatewayPayload, PaymentIntent};
use chrono::Utc;
use rust_decimal_macros::dec;

pub fn sample_enrollment(id: &str, registration: &str, course: &str, months: u32) -> Enrollment {
    Enrollment {
        id: EnrollmentId::new(id),
        registration_id: RegistrationId::new(registration),
        course_name: course.to_string(),
        duration_months: months,
        created_at: Utc::now(),
    }
}

pub fn sample_intent(enrollment: &str, period: Option<u32>) -> PaymentIntent {
    PaymentIntent {
        enrollment_id: EnrollmentId::new(enrollment),
        registration_id: RegistrationId::new("R1"),
        course_name: "German A1".to_string(),
        payment_type: PaymentType::for_period(period),
        period,
        amount: Money::new(if period.is_some() { dec!(3333) } else { dec!(10000) }),
        original_fee: Money::new(dec!(10000)),
        discount_pct: dec!(0),
    }
}

pub fn sample_payload(order: &str, payment: &str) -> GatewayPayload {
    GatewayPayload {
        order_id: OrderId::new(order),
        payment_id: PaymentId::new(payment),
        signature: "unsigned".to_string(),
    }
}
