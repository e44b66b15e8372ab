//! Convenience result type alias for Hookwire.

use crate::error::AppError;

/// A specialized `Result` type for Hookwire operations.
pub type AppResult<T> = Result<T, AppError>;
