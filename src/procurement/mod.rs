//! The requesting side: places one order and tallies the reports it triggers.

pub mod aggregator;

pub use aggregator::{AggregateReport, Procurement, Reconciliation, WorkerTally};
