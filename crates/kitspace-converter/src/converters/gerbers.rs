//! Gerber collection: the fabrication ZIP and `gerber-info.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kitspace_core::config::converters::ConvertersConfig;
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::ProjectJob;
use kitspace_worker::{ConversionContext, Converter, ConverterOutput, TaskError};

use super::{list_checkout, tool};
use crate::discovery;
use crate::error::ConversionError;
use crate::filesystem::{ScratchDir, zip_files};
use crate::layers::find_gerbers;

pub const GERBER_INFO: &str = "gerber-info.json";

const MM_PER_INCH: f64 = 25.4;

/// `<name>-<sha7>-gerbers`, the ZIP stem and its top-level folder.
pub fn zip_stem(job: &ProjectJob) -> String {
    format!("{}-{}-gerbers", job.display_name(), job.identity.short_ref())
}

/// Where a Gerber came from, keyed by checkout-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub side: Option<String>,
}

/// Contents of `gerber-info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GerberInfo {
    /// File name of the ZIP asset.
    pub zip_path: String,
    /// Board width in mm.
    pub width: u64,
    /// Board height in mm.
    pub height: u64,
    /// Number of copper layers.
    pub layers: usize,
    pub input_files: BTreeMap<String, InputFile>,
}

#[derive(Debug, Deserialize)]
struct StackupSide {
    width: f64,
    height: f64,
    units: String,
}

#[derive(Debug, Deserialize)]
struct StackupLayer {
    #[serde(rename = "type")]
    layer_type: String,
}

/// What `board_renderer info` prints.
#[derive(Debug, Deserialize)]
struct Stackup {
    top: StackupSide,
    bottom: StackupSide,
    layers: Vec<StackupLayer>,
}

impl GerberInfo {
    fn from_stackup(
        zip_path: String,
        stackup: &Stackup,
        input_files: BTreeMap<String, InputFile>,
    ) -> Result<Self, ConversionError> {
        let mut width = stackup.top.width.max(stackup.bottom.width).ceil();
        let mut height = stackup.top.height.max(stackup.bottom.height).ceil();

        let top_in = stackup.top.units == "in";
        let bottom_in = stackup.bottom.units == "in";
        match (top_in, bottom_in) {
            (true, true) => {
                width *= MM_PER_INCH;
                height *= MM_PER_INCH;
            }
            (false, false) => {}
            (true, false) => {
                return Err(ConversionError::DisparateUnits {
                    expected: "inches".into(),
                });
            }
            (false, true) => {
                return Err(ConversionError::DisparateUnits {
                    expected: "mm".into(),
                });
            }
        }

        Ok(Self {
            zip_path,
            width: width.ceil() as u64,
            height: height.ceil() as u64,
            layers: stackup
                .layers
                .iter()
                .filter(|l| l.layer_type == "copper")
                .count(),
            input_files,
        })
    }
}

/// Collects the Gerbers of a project, plotting them from KiCad when none are
/// committed.
#[derive(Debug)]
pub struct GerbersConverter {
    tools: Arc<ConvertersConfig>,
}

impl GerbersConverter {
    pub fn new(tools: Arc<ConvertersConfig>) -> Self {
        Self { tools }
    }

    async fn convert(
        &self,
        ctx: &ConversionContext,
        scratch: &Path,
    ) -> Result<ConverterOutput, ConversionError> {
        let job = &ctx.job;
        let checkout = &job.checkout_dir;
        let manifest = &job.project.manifest;
        let files = list_checkout(checkout).await?;

        let layers = find_gerbers(&files, manifest.gerbers.as_deref());
        let (sources, input_files): (Vec<PathBuf>, BTreeMap<String, InputFile>) =
            if layers.len() >= self.tools.min_gerber_files {
                let input_files = layers
                    .iter()
                    .map(|(path, layer)| {
                        let info = InputFile {
                            kind: layer.layer_type.as_str().to_string(),
                            side: Some(layer.side.as_str().to_string()),
                        };
                        (path.to_string_lossy().into_owned(), info)
                    })
                    .collect();
                (layers.keys().map(|p| checkout.join(p)).collect(), input_files)
            } else {
                let pcb = discovery::kicad_pcb(checkout, &files, manifest)
                    .filter(|p| p.is_file())
                    .ok_or(ConversionError::TooFewGerbers {
                        found: layers.len(),
                        required: self.tools.min_gerber_files,
                    })?;
                tracing::info!(
                    identity = %job.identity,
                    pcb = %pcb.display(),
                    "No committed Gerbers, plotting from KiCad"
                );
                let plotted = self.plot_kicad(ctx, &pcb, scratch).await?;
                let relative = pcb
                    .strip_prefix(checkout)
                    .unwrap_or(&pcb)
                    .to_string_lossy()
                    .into_owned();
                let input_files = BTreeMap::from([(
                    relative,
                    InputFile {
                        kind: "kicad".into(),
                        side: None,
                    },
                )]);
                (plotted, input_files)
            };

        let gerber_dir = scratch.join("gerbers");
        tokio::fs::create_dir_all(&gerber_dir).await?;
        let mut gerbers = Vec::with_capacity(sources.len());
        for source in &sources {
            let Some(name) = source.file_name() else {
                continue;
            };
            let data = tokio::fs::read(source).await?;
            tokio::fs::write(gerber_dir.join(name), &data).await?;
            gerbers.push((name.to_string_lossy().into_owned(), data));
        }

        let stem = zip_stem(job);
        let zip_name = format!("{stem}.zip");
        let zip = tokio::task::spawn_blocking(move || zip_files(&stem, &gerbers)).await??;

        let output = ctx
            .shell
            .run(
                &tool(&self.tools, &self.tools.board_renderer)
                    .arg("info")
                    .path_arg(&gerber_dir),
            )
            .await?;
        let stackup: Stackup =
            serde_json::from_str(&output.stdout).map_err(|e| ConversionError::ToolOutput {
                tool: self.tools.board_renderer.clone(),
                reason: e.to_string(),
            })?;
        let info = GerberInfo::from_stackup(zip_name.clone(), &stackup, input_files)?;

        tracing::debug!(
            identity = %job.identity,
            layers = info.layers,
            width = info.width,
            height = info.height,
            "Collected Gerbers"
        );

        Ok(ConverterOutput::new()
            .with(zip_name, zip)
            .with(GERBER_INFO, serde_json::to_vec(&info)?))
    }

    async fn plot_kicad(
        &self,
        ctx: &ConversionContext,
        pcb: &Path,
        scratch: &Path,
    ) -> Result<Vec<PathBuf>, ConversionError> {
        let plot_dir = scratch.join("plotted");
        tokio::fs::create_dir_all(&plot_dir).await?;
        ctx.shell
            .run(
                &tool(&self.tools, &self.tools.plot_kicad_pcb)
                    .arg("gerber")
                    .path_arg(pcb)
                    .path_arg(&plot_dir),
            )
            .await?;
        let plotted = list_checkout(&plot_dir).await?;
        if plotted.is_empty() {
            return Err(ConversionError::OutputNotCreated { path: plot_dir });
        }
        Ok(plotted.into_iter().map(|f| plot_dir.join(f)).collect())
    }
}

#[async_trait]
impl Converter for GerbersConverter {
    fn category(&self) -> AssetCategory {
        AssetCategory::Gerbers
    }

    fn outputs(&self, job: &ProjectJob) -> Vec<String> {
        vec![format!("{}.zip", zip_stem(job)), GERBER_INFO.to_string()]
    }

    async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
        let scratch = ScratchDir::create(&self.tools.effective_temp_root()).await?;
        let result = self.convert(ctx, scratch.path()).await;
        scratch.remove().await;
        Ok(result?)
    }
}
