//! Content identity and asset addressing.
//!
//! Every derived file is addressed as `owner/repo/ref/[project/]asset`.
//! Owner and repository names are case-insensitive in Gitea and are
//! normalised to lower case here so that status, store keys and URLs agree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Ref segment that always points at the latest processed commit.
pub const HEAD_REF: &str = "HEAD";

/// `(owner, repo, ref, project?)`: the unit of caching and deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentIdentity {
    owner: String,
    repo: String,
    git_ref: String,
    project: Option<String>,
}

impl ContentIdentity {
    /// Create a repo-level identity.
    pub fn new(owner: impl AsRef<str>, repo: impl AsRef<str>, git_ref: impl Into<String>) -> Self {
        Self {
            owner: owner.as_ref().to_lowercase(),
            repo: repo.as_ref().to_lowercase(),
            git_ref: git_ref.into(),
            project: None,
        }
    }

    /// The same repo and ref scoped to a sub-project.
    pub fn with_project(&self, project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..self.clone()
        }
    }

    /// The same repo and ref without a project scope.
    pub fn repo_level(&self) -> Self {
        Self {
            project: None,
            ..self.clone()
        }
    }

    /// The same repo and project at another ref.
    pub fn at_ref(&self, git_ref: impl Into<String>) -> Self {
        Self {
            git_ref: git_ref.into(),
            ..self.clone()
        }
    }

    /// Lower-cased owner name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Lower-cased repository name.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Commit SHA (or `HEAD`).
    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    /// Sub-project name, if any.
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Whether this identity uses the floating `HEAD` ref.
    pub fn is_head(&self) -> bool {
        self.git_ref == HEAD_REF
    }

    /// First seven characters of the ref.
    pub fn short_ref(&self) -> &str {
        let end = self
            .git_ref
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.git_ref.len());
        &self.git_ref[..end]
    }

    /// Store key prefix: `owner/repo/ref[/project]`.
    pub fn prefix(&self) -> String {
        match &self.project {
            Some(project) => format!("{}/{}/{}/{}", self.owner, self.repo, self.git_ref, project),
            None => format!("{}/{}/{}", self.owner, self.repo, self.git_ref),
        }
    }

    /// Address an asset under this identity.
    pub fn asset(&self, name: impl Into<String>) -> AssetId {
        AssetId {
            identity: self.clone(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

/// One named derived file scoped to a [`ContentIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId {
    identity: ContentIdentity,
    name: String,
}

impl AssetId {
    /// The owning identity.
    pub fn identity(&self) -> &ContentIdentity {
        &self.identity
    }

    /// Asset name relative to the identity, e.g. `images/top.png`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full store key.
    pub fn path(&self) -> String {
        format!("{}/{}", self.identity.prefix(), self.name)
    }

    /// The same asset at another ref.
    pub fn at_ref(&self, git_ref: impl Into<String>) -> Self {
        Self {
            identity: self.identity.at_ref(git_ref),
            name: self.name.clone(),
        }
    }

    /// Every way `path` can be read as an asset address.
    ///
    /// A path has no marker separating the optional project segment from a
    /// nested asset name, so `o/r/sha/images/top.png` is either asset
    /// `images/top.png` of the repo or asset `top.png` of project `images`.
    /// The repo-level reading comes first; callers pick the first one they
    /// know about.
    pub fn candidates(path: &str) -> Result<Vec<Self>, AppError> {
        let segments = split_path(path)?;
        if segments.len() < 4 {
            return Err(AppError::validation(format!(
                "asset path '{path}' needs owner/repo/ref/asset"
            )));
        }

        let base = ContentIdentity::new(segments[0], segments[1], segments[2]);
        let mut out = vec![base.asset(segments[3..].join("/"))];
        if segments.len() >= 5 {
            out.push(
                base.with_project(segments[3])
                    .asset(segments[4..].join("/")),
            );
        }
        Ok(out)
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Parse an identity path `owner/repo/ref[/project]`.
pub fn parse_identity_path(path: &str) -> Result<ContentIdentity, AppError> {
    let segments = split_path(path)?;
    match segments.as_slice() {
        [owner, repo, git_ref] => Ok(ContentIdentity::new(owner, repo, *git_ref)),
        [owner, repo, git_ref, project] => {
            Ok(ContentIdentity::new(owner, repo, *git_ref).with_project(*project))
        }
        _ => Err(AppError::validation(format!(
            "identity path '{path}' needs owner/repo/ref[/project]"
        ))),
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, AppError> {
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.iter().any(|s| *s == "." || *s == ".." || s.contains('\\')) {
        return Err(AppError::validation(format!("invalid path '{path}'")));
    }
    Ok(segments)
}
