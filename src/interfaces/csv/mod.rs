pub mod catalog_reader;
pub mod ledger_writer;
