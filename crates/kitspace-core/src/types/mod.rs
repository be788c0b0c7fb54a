//! Shared domain types.

pub mod identity;

pub use identity::{AssetId, ContentIdentity, HEAD_REF};
