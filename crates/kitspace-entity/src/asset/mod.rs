//! Asset entities.

pub mod category;

pub use category::AssetCategory;
