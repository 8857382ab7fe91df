//! Application layer containing the payment flow orchestration.
//!
//! `PaymentEngine` wires the services in this module over the domain ports. UI-style callers
//! work through a `PaymentSession`; the CLI and tests can also reach the services directly.

pub mod engine;
pub mod fee_resolver;
pub mod notice;
pub mod orchestrator;
pub mod plan_lock;
pub mod reconciler;
pub mod recovery;
pub mod session;
pub mod verification;
