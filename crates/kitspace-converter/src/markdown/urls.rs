//! URL rewriting of rendered README HTML.
//!
//! Relative image sources point at Gitea's raw view of the processed commit,
//! relative links at the upstream repository (or Gitea's source view when the
//! repository is not a mirror). Heading levels shift down by one.

use std::sync::LazyLock;

use lol_html::{RewriteStrSettings, element, rewrite_str};
use regex::Regex;

use crate::error::ConversionError;

static SCHEME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").ok());

static GITHUB_BLOB: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https?://github\.com/([^/]+)/([^/]+)/blob/(.+)$").ok());

/// Where the README lives.
#[derive(Debug, Clone)]
pub struct UrlContext {
    /// Public Gitea base URL, without trailing slash.
    pub gitea_url: String,
    pub owner: String,
    pub repo: String,
    /// Commit the README was read from.
    pub git_ref: String,
    /// Directory of the README inside the checkout, `""` at the root.
    pub readme_folder: String,
    /// Upstream URL of a mirrored repository.
    pub original_url: Option<String>,
    /// Default branch of the repository, `""` when unknown.
    pub default_branch: String,
}

impl UrlContext {
    /// Rewritten `href` of a link.
    pub fn link_url(&self, href: &str) -> String {
        if !is_relative(href) {
            return href.to_string();
        }
        let path = normalize(href, &self.readme_folder);
        match self.original_url.as_deref().filter(|u| !u.is_empty()) {
            Some(origin) => {
                // `-` resolves to the default branch on GitLab.
                let branch = match self.default_branch.as_str() {
                    "" => "-",
                    branch => branch,
                };
                format!(
                    "{}/blob/{}/{}",
                    origin.trim_end_matches('/').trim_end_matches(".git"),
                    branch,
                    path
                )
            }
            None => format!(
                "{}/{}/{}/src/commit/{}/{}",
                self.gitea_url, self.owner, self.repo, self.git_ref, path
            ),
        }
    }

    /// Rewritten `src` of an image.
    pub fn image_url(&self, src: &str) -> String {
        if is_relative(src) {
            let path = normalize(src, &self.readme_folder);
            return format!(
                "{}/{}/{}/raw/commit/{}/{}",
                self.gitea_url, self.owner, self.repo, self.git_ref, path
            );
        }
        github_raw_url(src)
    }
}

fn is_relative(url: &str) -> bool {
    if url.is_empty() || url.starts_with('#') || url.starts_with("//") {
        return false;
    }
    SCHEME.as_ref().is_some_and(|re| !re.is_match(url))
}

/// Resolve `url` against `folder`, collapsing `.` and `..`.
fn normalize(url: &str, folder: &str) -> String {
    let joined = match url.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None if folder.is_empty() => url.to_string(),
        None => format!("{}/{}", folder.trim_end_matches('/'), url),
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn github_raw_url(url: &str) -> String {
    match GITHUB_BLOB.as_ref().and_then(|re| re.captures(url)) {
        Some(caps) => format!(
            "https://raw.githubusercontent.com/{}/{}/{}",
            &caps[1], &caps[2], &caps[3]
        ),
        None => url.to_string(),
    }
}

fn heading_level(tag: &str) -> Option<u8> {
    let level: u8 = tag.strip_prefix('h')?.parse().ok()?;
    (1..=6).contains(&level).then_some(level)
}

/// Rewrite link and image URLs and shift headings one level down.
pub fn rewrite(html: &str, ctx: &UrlContext) -> Result<String, ConversionError> {
    let handlers = vec![
        element!("a[href]", |el| {
            let href = el.get_attribute("href").unwrap_or_default();
            if href.starts_with('#') {
                return Ok(());
            }
            el.set_attribute("href", &ctx.link_url(&href))?;
            el.set_attribute("target", "_blank")?;
            Ok(())
        }),
        element!("img", |el| {
            if let Some(src) = el.get_attribute("src") {
                el.set_attribute("src", &ctx.image_url(&src))?;
            }
            el.set_attribute("loading", "lazy")?;
            el.set_attribute("data-cy", "relative-readme-img")?;
            Ok(())
        }),
        element!("*", |el| {
            if let Some(level) = heading_level(&el.tag_name()) {
                el.set_tag_name(&format!("h{}", (level + 1).min(6)))?;
            }
            Ok(())
        }),
    ];

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::new()
        },
    )
    .map_err(|e| ConversionError::Rewrite(e.to_string()))
}
