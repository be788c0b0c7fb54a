//! Convenience result type alias for the processor.

use crate::error::AppError;

/// A specialized `Result` type for processor operations.
pub type AppResult<T> = Result<T, AppError>;
