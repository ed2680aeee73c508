//! # jobrunner-core
//!
//! Core crate for jobrunner. Contains configuration schemas for the worker
//! pool, the scheduled runner and logging, plus the unified error system.
//!
//! This crate has **no** internal dependencies on other jobrunner crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
