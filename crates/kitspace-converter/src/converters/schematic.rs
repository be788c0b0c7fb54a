//! KiCad schematic plotted to SVG.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use kitspace_core::config::converters::ConvertersConfig;
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::ProjectJob;
use kitspace_worker::{ConversionContext, Converter, ConverterOutput, TaskError};

use super::{list_checkout, tool};
use crate::discovery;
use crate::error::ConversionError;
use crate::filesystem::{ScratchDir, find_by_extension, list_files, read_output};

pub const SCHEMATIC_SVG: &str = "images/schematic.svg";

#[derive(Debug)]
pub struct SchematicConverter {
    tools: Arc<ConvertersConfig>,
}

impl SchematicConverter {
    pub fn new(tools: Arc<ConvertersConfig>) -> Self {
        Self { tools }
    }

    async fn convert(
        &self,
        ctx: &ConversionContext,
        scratch: &Path,
    ) -> Result<ConverterOutput, ConversionError> {
        let checkout = &ctx.job.checkout_dir;
        let files = list_checkout(checkout).await?;
        let schematic = discovery::kicad_schematic(checkout, &files, &ctx.job.project.manifest)
            .ok_or_else(|| ConversionError::MissingInput("No .sch file found".into()))?;

        let plot_dir = scratch.join("schematic");
        tokio::fs::create_dir_all(&plot_dir).await?;
        ctx.shell
            .run(
                &tool(&self.tools, &self.tools.plot_kicad_sch)
                    .path_arg(&schematic)
                    .path_arg(&plot_dir),
            )
            .await?;

        // Hierarchical sheets plot one SVG each; the root sheet shares the
        // schematic's name.
        let listing_dir = plot_dir.clone();
        let plotted = tokio::task::spawn_blocking(move || list_files(&listing_dir)).await?;
        let root = schematic.with_extension("svg");
        let svg = plotted
            .iter()
            .find(|f| Some(f.as_os_str()) == root.file_name())
            .cloned()
            .or_else(|| find_by_extension(&plotted, "svg"))
            .ok_or_else(|| ConversionError::ToolOutput {
                tool: self.tools.plot_kicad_sch.clone(),
                reason: "Could not process KiCad schematic".into(),
            })?;

        Ok(ConverterOutput::new().with(SCHEMATIC_SVG, read_output(&plot_dir.join(svg)).await?))
    }
}

#[async_trait]
impl Converter for SchematicConverter {
    fn category(&self) -> AssetCategory {
        AssetCategory::Schematic
    }

    fn outputs(&self, _job: &ProjectJob) -> Vec<String> {
        vec![SCHEMATIC_SVG.to_string()]
    }

    async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
        let scratch = ScratchDir::create(&self.tools.effective_temp_root()).await?;
        let result = self.convert(ctx, scratch.path()).await;
        scratch.remove().await;
        Ok(result?)
    }
}
