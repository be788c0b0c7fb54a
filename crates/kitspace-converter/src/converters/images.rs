//! Board renders: top and bottom SVGs plus the PNG previews.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops};

use kitspace_core::config::converters::ConvertersConfig;
use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::ProjectJob;
use kitspace_worker::{ConversionContext, Converter, ConverterOutput, TaskError};

use super::gerbers::{GERBER_INFO, GerberInfo};
use super::tool;
use crate::error::ConversionError;
use crate::filesystem::{ScratchDir, extract_zip, read_output};

pub const TOP_SVG: &str = "images/top.svg";
pub const BOTTOM_SVG: &str = "images/bottom.svg";
pub const TOP_PNG: &str = "images/top.png";
pub const TOP_LARGE_PNG: &str = "images/top-large.png";
pub const TOP_WITH_BACKGROUND_PNG: &str = "images/top-with-background.png";

const BACKGROUND: Rgba<u8> = Rgba([0x37, 0x37, 0x37, 0xff]);
const BACKGROUND_WIDTH: u32 = 1000;
const BACKGROUND_HEIGHT: u32 = 524;
const META_WIDTH: u32 = 900;
const META_HEIGHT: u32 = 400;

/// Fixed dimension of an SVG export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Export {
    Width(u32),
    Height(u32),
}

impl Export {
    fn arg(self) -> String {
        match self {
            Self::Width(w) => format!("--export-width={w}"),
            Self::Height(h) => format!("--export-height={h}"),
        }
    }

    /// Landscape boards are constrained by width, others by height.
    fn preview(width: f64, height: f64, landscape: u32, portrait: u32) -> Self {
        if width > height + 0.05 {
            Self::Width(landscape)
        } else {
            Self::Height(portrait)
        }
    }

    /// Largest export fitting the social-preview box.
    fn meta(width: f64, height: f64) -> Self {
        let too_tall = width > 0.0
            && f64::from(META_WIDTH) / width * height > f64::from(META_HEIGHT);
        if too_tall {
            Self::Height(META_HEIGHT)
        } else {
            Self::Width(META_WIDTH)
        }
    }
}

/// Renders the board from the Gerber ZIP.
#[derive(Debug)]
pub struct ImagesConverter {
    tools: Arc<ConvertersConfig>,
}

impl ImagesConverter {
    pub fn new(tools: Arc<ConvertersConfig>) -> Self {
        Self { tools }
    }

    async fn convert(
        &self,
        ctx: &ConversionContext,
        info: &GerberInfo,
        zip: bytes::Bytes,
        scratch: &Path,
    ) -> Result<ConverterOutput, ConversionError> {
        let extract_dir = scratch.join("gerbers");
        let target = extract_dir.clone();
        tokio::task::spawn_blocking(move || extract_zip(&zip, &target)).await??;
        let stem = info.zip_path.trim_end_matches(".zip");
        let gerber_dir = extract_dir.join(stem);

        let image_dir = scratch.join("images");
        tokio::fs::create_dir_all(&image_dir).await?;
        ctx.shell
            .run(
                &tool(&self.tools, &self.tools.board_renderer)
                    .arg("svg")
                    .path_arg(&gerber_dir)
                    .arg(ctx.job.project.manifest.color.as_str())
                    .path_arg(&image_dir),
            )
            .await?;

        let top_svg = image_dir.join("top.svg");
        let bottom_svg = image_dir.join("bottom.svg");
        let mut output = ConverterOutput::new()
            .with(TOP_SVG, read_output(&top_svg).await?)
            .with(BOTTOM_SVG, read_output(&bottom_svg).await?);

        let (width, height) = (info.width as f64, info.height as f64);

        // Sequential: each export is a separate rasteriser process.
        let exports = [
            (TOP_PNG, "top.png", Export::preview(width, height, 240, 180)),
            (TOP_LARGE_PNG, "top-large.png", Export::preview(width, height, 592, 412)),
        ];
        for (asset, file, size) in exports {
            let png = image_dir.join(file);
            self.rasterise(ctx, &top_svg, &png, size).await?;
            output.insert(asset, read_output(&png).await?);
        }

        let meta = image_dir.join("top-meta.png");
        self.rasterise(ctx, &top_svg, &meta, Export::meta(width, height))
            .await?;
        let meta = read_output(&meta).await?;
        let composed = tokio::task::spawn_blocking(move || with_background(&meta)).await??;
        output.insert(TOP_WITH_BACKGROUND_PNG, composed);

        Ok(output)
    }

    async fn rasterise(
        &self,
        ctx: &ConversionContext,
        svg: &Path,
        png: &Path,
        size: Export,
    ) -> Result<(), ConversionError> {
        ctx.shell
            .run(
                &tool(&self.tools, &self.tools.inkscape)
                    .path_arg(svg)
                    .arg("--export-type=png")
                    .arg(format!("--export-filename={}", png.display()))
                    .arg(size.arg()),
            )
            .await?;
        Ok(())
    }
}

/// Centre `png` on the fixed dark canvas used for link previews.
fn with_background(png: &[u8]) -> Result<Vec<u8>, ConversionError> {
    let board = image::load_from_memory(png)?.to_rgba8();
    let mut canvas = RgbaImage::from_pixel(BACKGROUND_WIDTH, BACKGROUND_HEIGHT, BACKGROUND);
    let x = (i64::from(BACKGROUND_WIDTH) - i64::from(board.width())) / 2;
    let y = (i64::from(BACKGROUND_HEIGHT) - i64::from(board.height())) / 2;
    imageops::overlay(&mut canvas, &board, x, y);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(canvas).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[async_trait]
impl Converter for ImagesConverter {
    fn category(&self) -> AssetCategory {
        AssetCategory::Images
    }

    fn dependencies(&self) -> &[AssetCategory] {
        &[AssetCategory::Gerbers]
    }

    fn outputs(&self, _job: &ProjectJob) -> Vec<String> {
        [TOP_SVG, BOTTOM_SVG, TOP_PNG, TOP_LARGE_PNG, TOP_WITH_BACKGROUND_PNG]
            .map(str::to_string)
            .to_vec()
    }

    async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
        let info: GerberInfo = serde_json::from_slice(&ctx.upstream(GERBER_INFO).await?)
            .map_err(|e| TaskError::permanent(format!("invalid {GERBER_INFO}: {e}")))?;
        let zip = ctx.upstream(&info.zip_path).await?;

        let scratch = ScratchDir::create(&self.tools.effective_temp_root()).await?;
        let result = self.convert(ctx, &info, zip, scratch.path()).await;
        scratch.remove().await;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;
    use bytes::Bytes;
    use kitspace_storage::AssetStore;

    use crate::filesystem::zip_files;
    use crate::testing::{FakeShell, context, flag, png, stdout, tools};

    #[test]
    fn test_preview_orientation() {
        assert_eq!(Export::preview(100.0, 50.0, 240, 180), Export::Width(240));
        assert_eq!(Export::preview(50.0, 50.0, 240, 180), Export::Height(180));
    }

    #[test]
    fn test_meta_export_fits_box() {
        assert_eq!(Export::meta(100.0, 20.0), Export::Width(900));
        assert_eq!(Export::meta(50.0, 100.0), Export::Height(400));
        // 900 wide would be 450 high, so height is the constraint.
        assert_eq!(Export::meta(100.0, 50.0), Export::Height(400));
        assert_eq!(Export::meta(230.0, 100.0), Export::Width(900));
    }

    #[test]
    fn test_background_canvas() {
        let composed = with_background(&png(100, 50)).expect("compose");
        let image = image::load_from_memory(&composed).expect("decode").to_rgba8();
        assert_eq!(image.dimensions(), (1000, 524));
        assert_eq!(*image.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*image.get_pixel(500, 262), Rgba([200, 10, 10, 255]));
    }

    async fn seeded_store(ctx_job: &ProjectJob) -> AssetStore {
        let store = AssetStore::in_memory();
        let zip = zip_files(
            "ruler-0123456-gerbers",
            &[("ruler-F_Cu.gtl".to_string(), b"G04*".to_vec())],
        )
        .expect("zip");
        let info = GerberInfo {
            zip_path: "ruler-0123456-gerbers.zip".into(),
            width: 100,
            height: 50,
            layers: 2,
            input_files: BTreeMap::new(),
        };
        let identity = &ctx_job.identity;
        store
            .put(&identity.asset("ruler-0123456-gerbers.zip"), Bytes::from(zip))
            .await
            .expect("put zip");
        store
            .put(
                &identity.asset(GERBER_INFO),
                Bytes::from(serde_json::to_vec(&info).expect("json")),
            )
            .await
            .expect("put info");
        store
    }

    #[tokio::test]
    async fn test_renders_all_images() {
        let checkout = tempfile::tempdir().expect("tempdir");
        let scratch = tempfile::tempdir().expect("tempdir");
        let shell = FakeShell::new(|command| {
            if command.program() == "board_renderer" {
                let args = command.arguments();
                assert!(PathBuf::from(&args[1]).join("ruler-F_Cu.gtl").is_file());
                assert_eq!(args[2], "black");
                let out = PathBuf::from(&args[3]);
                std::fs::write(out.join("top.svg"), b"<svg>top</svg>").expect("svg");
                std::fs::write(out.join("bottom.svg"), b"<svg>bottom</svg>").expect("svg");
            } else {
                let target = flag(command, "--export-filename").expect("filename");
                std::fs::write(target, png(90, 45)).expect("png");
            }
            stdout("")
        });

        let probe = context(checkout.path(), "color: black\n", shell.clone(), AssetStore::in_memory());
        let store = seeded_store(&probe.job).await;
        let ctx = context(checkout.path(), "color: black\n", shell.clone(), store);

        let converter = ImagesConverter::new(tools(scratch.path()));
        let output = converter.run(&ctx).await.expect("render");

        assert_eq!(output.len(), 5);
        assert_eq!(output.get(TOP_SVG), Some(&Bytes::from_static(b"<svg>top</svg>")));
        for name in converter.outputs(&ctx.job) {
            assert!(output.contains(&name), "missing {name}");
        }
        let calls = shell.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(flag(&calls[1], "--export-width"), Some("240"));
        assert_eq!(flag(&calls[2], "--export-width"), Some("592"));
        assert_eq!(flag(&calls[3], "--export-height"), Some("400"));
    }

    #[tokio::test]
    async fn test_missing_render_output_fails() {
        let checkout = tempfile::tempdir().expect("tempdir");
        let scratch = tempfile::tempdir().expect("tempdir");
        let shell = FakeShell::new(|_| stdout(""));
        let probe = context(checkout.path(), "", shell.clone(), AssetStore::in_memory());
        let store = seeded_store(&probe.job).await;
        let ctx = context(checkout.path(), "", shell, store);

        let err = ImagesConverter::new(tools(scratch.path()))
            .run(&ctx)
            .await
            .expect_err("no svg");
        assert!(err.to_string().contains("Output file not created"));
    }
}
