//! Payment plan selection, gateway checkout, verification and recovery for course enrollments.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
