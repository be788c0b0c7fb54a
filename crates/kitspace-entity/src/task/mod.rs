//! Processing task entities.

pub mod model;
pub mod status;

pub use model::TaskRecord;
pub use status::TaskStatus;
