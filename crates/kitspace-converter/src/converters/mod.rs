//! One converter per asset category.

pub mod bom;
pub mod gerbers;
pub mod ibom;
pub mod images;
pub mod kitspace_yaml;
pub mod readme;
pub mod schematic;

use std::path::{Path, PathBuf};

use kitspace_core::config::converters::ConvertersConfig;
use kitspace_core::shell::ShellCommand;

use crate::error::ConversionError;
use crate::filesystem::list_files;

pub use bom::BomConverter;
pub use gerbers::GerbersConverter;
pub use ibom::InteractiveBomConverter;
pub use images::ImagesConverter;
pub use kitspace_yaml::KitspaceYamlConverter;
pub use readme::ReadmeConverter;
pub use schematic::SchematicConverter;

/// An external tool invocation carrying the configured timeout.
pub(crate) fn tool(config: &ConvertersConfig, program: &str) -> ShellCommand {
    ShellCommand::new(program).timeout(config.timeout())
}

/// Checkout listing, off the async runtime.
pub(crate) async fn list_checkout(checkout: &Path) -> Result<Vec<PathBuf>, ConversionError> {
    let checkout = checkout.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || list_files(&checkout)).await?)
}
