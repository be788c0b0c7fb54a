//! Route handlers.

pub mod files;
pub mod health;
pub mod hooks;
pub mod process;
pub mod status;
