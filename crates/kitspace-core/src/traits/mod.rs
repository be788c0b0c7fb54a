//! Core traits defined in `kitspace-core` and implemented by other crates.

pub mod shell;
pub mod storage;

pub use shell::CommandRunner;
pub use storage::StorageProvider;
