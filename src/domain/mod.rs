//! Domain layer: value objects, entities and the ports the application layer talks through.
//!
//! Nothing in here performs I/O. Storage, the enrollment catalog and the payment gateway are
//! reached only through the traits in [`ports`].

pub mod enrollment;
pub mod fee;
pub mod gateway;
pub mod ids;
pub mod lock;
pub mod money;
pub mod pending;
pub mod ports;
pub mod progress;
pub mod schedule;
pub mod signature;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_support;
