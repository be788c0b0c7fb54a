//! `readme.html`: the project README rendered and sanitised.

use async_trait::async_trait;

use kitspace_entity::asset::AssetCategory;
use kitspace_entity::project::ProjectJob;
use kitspace_worker::{ConversionContext, Converter, ConverterOutput, TaskError};

use super::list_checkout;
use crate::discovery;
use crate::error::ConversionError;
use crate::markdown::{UrlContext, render_readme};

pub const README_HTML: &str = "readme.html";

#[derive(Debug)]
pub struct ReadmeConverter {
    gitea_url: String,
}

impl ReadmeConverter {
    /// `gitea_url` is the public base URL images are served from.
    pub fn new(gitea_url: impl Into<String>) -> Self {
        Self {
            gitea_url: gitea_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn convert(&self, ctx: &ConversionContext) -> Result<ConverterOutput, ConversionError> {
        let job = &ctx.job;
        let checkout = &job.checkout_dir;
        let files = list_checkout(checkout).await?;
        let readme = discovery::readme(checkout, &files, &job.project.manifest)
            .filter(|path| path.is_file())
            .ok_or_else(|| ConversionError::MissingInput("couldn't find readme file".into()))?;

        let readme_folder = readme
            .parent()
            .and_then(|p| p.strip_prefix(checkout).ok())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let urls = UrlContext {
            gitea_url: self.gitea_url.clone(),
            owner: job.identity.owner().to_string(),
            repo: job.identity.repo().to_string(),
            git_ref: job.identity.git_ref().to_string(),
            readme_folder,
            original_url: job.repo.original_url.clone(),
            default_branch: job.repo.default_branch.clone(),
        };

        let markdown = String::from_utf8_lossy(&tokio::fs::read(&readme).await?).into_owned();
        let html = tokio::task::spawn_blocking(move || render_readme(&markdown, &urls)).await??;
        Ok(ConverterOutput::new().with(README_HTML, html))
    }
}

#[async_trait]
impl Converter for ReadmeConverter {
    fn category(&self) -> AssetCategory {
        AssetCategory::Readme
    }

    fn outputs(&self, _job: &ProjectJob) -> Vec<String> {
        vec![README_HTML.to_string()]
    }

    async fn run(&self, ctx: &ConversionContext) -> Result<ConverterOutput, TaskError> {
        Ok(self.convert(ctx).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitspace_storage::AssetStore;

    use crate::testing::{FakeShell, SHA, context, write_files};

    fn converter() -> ReadmeConverter {
        ReadmeConverter::new("https://git.kitspace.test/")
    }

    #[tokio::test]
    async fn test_renders_root_readme() {
        let checkout = tempfile::tempdir().expect("tempdir");
        write_files(
            checkout.path(),
            &[(
                "README.md",
                b"# Ruler\n\n![top](images/top.png)\n\n<script>alert(1)</script>\n",
            )],
        );
        let ctx = context(checkout.path(), "", FakeShell::unavailable(), AssetStore::in_memory());

        let output = converter().run(&ctx).await.expect("render");
        let html = std::str::from_utf8(output.get(README_HTML).expect("html")).expect("utf8");

        assert!(html.contains("<h2"));
        assert!(html.contains(&format!(
            "https://git.kitspace.test/alice/ruler/raw/commit/{SHA}/images/top.png"
        )));
        assert!(!html.contains("<script"));
    }

    #[tokio::test]
    async fn test_manifest_readme_in_subfolder() {
        let checkout = tempfile::tempdir().expect("tempdir");
        write_files(
            checkout.path(),
            &[("docs/guide.md", b"![photo](../photos/board.jpg)\n")],
        );
        let ctx = context(
            checkout.path(),
            "readme: docs/guide.md\n",
            FakeShell::unavailable(),
            AssetStore::in_memory(),
        );

        let output = converter().run(&ctx).await.expect("render");
        let html = std::str::from_utf8(output.get(README_HTML).expect("html")).expect("utf8");
        assert!(html.contains(&format!("/raw/commit/{SHA}/photos/board.jpg")));
    }

    #[tokio::test]
    async fn test_missing_readme() {
        let checkout = tempfile::tempdir().expect("tempdir");
        write_files(checkout.path(), &[("notes.txt", b"hello")]);
        let ctx = context(checkout.path(), "", FakeShell::unavailable(), AssetStore::in_memory());

        let err = converter().run(&ctx).await.expect_err("missing");
        assert_eq!(err.to_string(), "couldn't find readme file");
    }
}
