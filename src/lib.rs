//! A factory that fulfils part orders with a pool of concurrent sub-factories,
//! and the procurement client that orders from it, talking fixed-size
//! datagrams over links that may lose, duplicate or reorder messages.
//!
//! ```text
//! procurement --REQUEST--> factory
//! procurement <--ORDER_CONFIRM-- factory
//!                                   +-- sub-factory 1 --PRODUCTION*, COMPLETION--> procurement
//!                                   +-- sub-factory N --PRODUCTION*, COMPLETION--> procurement
//! ```

pub mod abstractions;
pub mod config;
pub mod error;
pub mod factory;
pub mod procurement;

pub use abstractions::Message;
pub use config::{FactoryConfig, ProcurementConfig, Staffing};
pub use error::{CodecError, ConfigError, FactoryError, ProcurementError};
pub use factory::coordinator::{Coordinator, Summary};
pub use factory::server::FactoryServer;
pub use procurement::{AggregateReport, Procurement, Reconciliation};
