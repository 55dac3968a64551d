//! Error types produced by the layered configuration store.

mod aggregate;
mod constructors;
mod types;

pub use aggregate::AggregatedErrors;
pub use types::JubakoError;
