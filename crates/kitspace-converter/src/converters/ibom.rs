//! Interactive BOM data extracted from the board file.

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
use crate::filesystem::{ScratchDir, read_output};

pub const INTERACTIVE_BOM_JSON: &str = "interactive_bom.json";

/// Runs the interactive BOM generator. Projects that opt out with
/// `ibom-enabled: false` produce nothing.
#[derive(Debug)]
pub struct InteractiveBomConverter {
    tools: Arc<ConvertersConfig>,
}

impl InteractiveBomConverter {
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
        let manifest = &ctx.job.project.manifest;
        let board = discovery::ibom_board(checkout, &files, manifest)
            .await
            .ok_or_else(|| ConversionError::MissingInput("No PCB file found".into()))?;

        let output = scratch.join(INTERACTIVE_BOM_JSON);
        ctx.shell
            .run(
                &tool(&self.tools, &self.tools.run_ibom)
                    .path_arg(&board)
                    .arg(ctx.job.display_name())
                    .arg(manifest.summary.as_str())
                    .path_arg(&output),
            )
            .await?;

        Ok(ConverterOutput::new().with(INTERACTIVE_BOM_JSON, read_output(&output).await?))
    }
}

#[async_trait]
impl Converter for InteractiveBomConverter {
    fn category(&self) -> AssetCategory {
        AssetCategory::InteractiveBom
    }

    fn dependencies(&self) -> &[AssetCategory] {
        &[AssetCategory::Gerbers]
    }

    fn outputs(&self, job: &ProjectJob) -> Vec<String> {
        if job.project.manifest.ibom_enabled {
            vec![INTERACTIVE_BOM_JSON.to_string()]
        } else {
            Vec::new()
        }
    }

    async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
        if !ctx.job.project.manifest.ibom_enabled {
            tracing::debug!(identity = %ctx.job.identity, "Interactive BOM disabled");
            return Ok(ConverterOutput::new());
        }
        let scratch = ScratchDir::create(&self.tools.effective_temp_root()).await?;
        let result = self.convert(ctx, scratch.path()).await;
        scratch.remove().await;
        Ok(result?)
    }
}
