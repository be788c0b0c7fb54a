//! # Kitspace Converters
//!
//! One [`Converter`](kitspace_worker::Converter) per asset category. Each
//! reads a project checkout (and, for board images, the stored Gerbers),
//! drives the external EDA tools through the shell executor, and returns
//! the named assets for the scheduler to store.
//!
//! ## External tools
//!
//! Tool programs are configured in `[converters]`; every invocation gets
//! the configured timeout. A tool failure fails the task permanently.

pub mod converters;
pub mod discovery;
pub mod error;
pub mod filesystem;
pub mod layers;
pub mod markdown;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use kitspace_core::config::converters::ConvertersConfig;
use kitspace_worker::ConverterRegistry;

pub use converters::{
    BomConverter, GerbersConverter, ImagesConverter, InteractiveBomConverter,
    KitspaceYamlConverter, ReadmeConverter, SchematicConverter,
};
pub use error::ConversionError;

/// A registry holding every converter.
pub fn default_registry(config: &ConvertersConfig, gitea_url: &str) -> ConverterRegistry {
    let tools = Arc::new(config.clone());
    let mut registry = ConverterRegistry::new();
    registry.register(Arc::new(KitspaceYamlConverter));
    registry.register(Arc::new(GerbersConverter::new(Arc::clone(&tools))));
    registry.register(Arc::new(ImagesConverter::new(Arc::clone(&tools))));
    registry.register(Arc::new(BomConverter));
    registry.register(Arc::new(ReadmeConverter::new(gitea_url)));
    registry.register(Arc::new(InteractiveBomConverter::new(Arc::clone(&tools))));
    registry.register(Arc::new(SchematicConverter::new(tools)));
    registry
}
