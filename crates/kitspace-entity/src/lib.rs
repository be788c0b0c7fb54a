//! # kitspace-entity
//!
//! Domain models for the Kitspace processor: task status and snapshots,
//! asset categories, and the `kitspace.yaml` project manifest. All entities
//! derive `Debug`, `Clone`, `Serialize` and `Deserialize`.

pub mod asset;
pub mod project;
pub mod task;
