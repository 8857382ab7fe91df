use std::time::Duration;

/// Secret used when none is configured. Only meaningful with the sandbox gateway.
pub const SANDBOX_GATEWAY_SECRET: &str = "enrollpay-sandbox-secret";

/// Runtime settings for [`PaymentEngine`](crate::application::engine::PaymentEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Currency sent with every gateway order. Single currency only.
    pub currency: String,
    /// Shared secret the gateway signs checkout results with.
    pub gateway_secret: String,
    /// Courses that never take a payment, listed by course name (the catalog's course
    /// identifier). Matched after trimming, case-insensitively.
    pub free_courses: Vec<String>,
    /// Transactions and lock poll interval.
    pub payments_poll: Duration,
    /// Enrollment record poll interval.
    pub enrollment_poll: Duration,
    pub notice_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            gateway_secret: SANDBOX_GATEWAY_SECRET.to_string(),
            free_courses: Vec::new(),
            payments_poll: Duration::from_secs(5),
            enrollment_poll: Duration::from_secs(30),
            notice_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn with_gateway_secret(mut self, secret: impl Into<String>) -> Self {
        self.gateway_secret = secret.into();
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_free_courses<I, S>(mut self, courses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.free_courses = courses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_poll_intervals(mut self, payments: Duration, enrollment: Duration) -> Self {
        self.payments_poll = payments;
        self.enrollment_poll = enrollment;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.currency, "INR");
        assert_eq!(config.payments_poll, Duration::from_secs(5));
        assert_eq!(config.enrollment_poll, Duration::from_secs(30));
        assert!(config.free_courses.is_empty());
    }
}
