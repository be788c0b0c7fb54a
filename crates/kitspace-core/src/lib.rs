//! # kitspace-core
//!
//! Core crate for the Kitspace asset processor. Contains configuration
//! schemas, the content identity types, the storage and shell traits,
//! the shell executor, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Kitspace crates.

pub mod config;
pub mod error;
pub mod result;
pub mod shell;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
pub use types::identity::{AssetId, ContentIdentity};
