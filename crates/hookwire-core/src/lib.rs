//! # hookwire-core
//!
//! Core crate for Hookwire. Contains the configuration schema and the
//! unified error system shared by the plugin runtime, the server binary
//! and the CLI.
//!
//! This crate has **no** internal dependencies on other Hookwire crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
