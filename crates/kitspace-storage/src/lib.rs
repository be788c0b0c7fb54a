//! # kitspace-storage
//!
//! Asset store for the Kitspace processor. Objects are keyed by
//! `owner/repo/ref/[project/]asset` and backed by the local filesystem,
//! process memory, or an S3-compatible object store.

pub mod providers;
pub mod store;

pub use store::AssetStore;
