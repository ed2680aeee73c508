//! Built-in job implementations.

pub mod report;

pub use report::PoolReportJob;
