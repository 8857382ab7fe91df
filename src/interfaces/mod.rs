//! Adapters between the engine and the outside world (CSV files for the CLI).

pub mod csv;
