//! The `kitspace.yaml` project manifest.
//!
//! A repository either describes a single project at its root or lists
//! several sub-projects under a `multi` key. Unknown keys are ignored.

use std::path::{Path, PathBuf};

use kitspace_core::AppError;
use serde::{Deserialize, Serialize};

/// Name given to the implicit project of a single-project repository.
pub const SINGLE_PROJECT_NAME: &str = "_";

/// Longest sub-project name Gitea accepts.
const MAX_PROJECT_NAME_LEN: usize = 100;

/// Solder mask colour used by the board renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardColor {
    /// Default green.
    #[default]
    Green,
    /// Red.
    Red,
    /// Blue.
    Blue,
    /// Black.
    Black,
    /// White.
    White,
    /// Orange.
    Orange,
    /// Purple.
    Purple,
    /// Yellow.
    Yellow,
}

impl BoardColor {
    /// Lowercase name passed to the renderer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Black => "black",
            Self::White => "white",
            Self::Orange => "orange",
            Self::Purple => "purple",
            Self::Yellow => "yellow",
        }
    }
}

/// EDA tool a board was designed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdaType {
    /// KiCad (`.kicad_pcb`).
    Kicad,
    /// Eagle (`.brd`).
    Eagle,
}

/// Explicit board file location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eda {
    /// Tool type.
    #[serde(rename = "type")]
    pub eda_type: EdaType,
    /// Board file path relative to the repository root.
    pub pcb: String,
}

/// PCB manufacturers a project can be ordered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcbService {
    /// AISLER.
    Aisler,
    /// PCBWay.
    Pcbway,
    /// OSH Park.
    Oshpark,
    /// JLCPCB.
    Jlcpcb,
}

/// Settings for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectManifest {
    /// One-line project description.
    #[serde(default)]
    pub summary: String,
    /// Project website, empty or an http(s) URL.
    #[serde(default)]
    pub site: String,
    /// Solder mask colour.
    #[serde(default)]
    pub color: BoardColor,
    /// BOM file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bom: Option<String>,
    /// Folder containing the Gerbers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gerbers: Option<String>,
    /// Board file location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eda: Option<Eda>,
    /// README path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    /// Manufacturers offered on the project page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcb_services: Option<Vec<PcbService>>,
    /// Whether to build the interactive BOM.
    #[serde(default = "default_true")]
    pub ibom_enabled: bool,
}

impl Default for ProjectManifest {
    fn default() -> Self {
        Self {
            summary: String::new(),
            site: String::new(),
            color: BoardColor::default(),
            bom: None,
            gerbers: None,
            eda: None,
            readme: None,
            pcb_services: None,
            ibom_enabled: true,
        }
    }
}

impl ProjectManifest {
    fn validate(&self) -> Result<(), AppError> {
        let site_ok = self.site.is_empty()
            || self.site.starts_with("http://")
            || self.site.starts_with("https://");
        if !site_ok {
            return Err(AppError::validation(format!(
                "site '{}' is not a URL",
                self.site
            )));
        }
        Ok(())
    }
}

/// A named project from the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// `_` for single-project repositories, else the sanitised sub-project name.
    pub name: String,
    /// Its settings.
    pub manifest: ProjectManifest,
}

impl Project {
    /// Whether this is the implicit project of a single-project repository.
    pub fn is_single(&self) -> bool {
        self.name == SINGLE_PROJECT_NAME
    }
}

/// A parsed manifest file.
#[derive(Debug, Clone, PartialEq)]
pub enum KitspaceYaml {
    /// The repository root is one project.
    Single(ProjectManifest),
    /// Named sub-projects in file order.
    Multi(Vec<(String, ProjectManifest)>),
}

impl Default for KitspaceYaml {
    fn default() -> Self {
        Self::Single(ProjectManifest::default())
    }
}

impl KitspaceYaml {
    /// Manifest file names in lookup order.
    pub const FILE_NAMES: [&'static str; 4] =
        ["kitspace.yaml", "kitspace.yml", "kitnic.yaml", "kitnic.yml"];

    /// First manifest file present in `dir`.
    pub fn find_file(dir: &Path) -> Option<PathBuf> {
        Self::FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Parse manifest contents.
    pub fn parse(contents: &str) -> Result<Self, AppError> {
        let value: serde_yaml::Value = serde_yaml::from_str(contents)
            .map_err(|e| AppError::validation(format!("invalid YAML: {e}")))?;

        if value.is_null() {
            return Ok(Self::default());
        }

        let mapping = value
            .as_mapping()
            .ok_or_else(|| AppError::validation("manifest must be a mapping"))?;

        let Some(multi) = mapping.get("multi") else {
            let manifest: ProjectManifest = serde_yaml::from_value(value.clone())
                .map_err(|e| AppError::validation(format!("invalid manifest: {e}")))?;
            manifest.validate()?;
            return Ok(Self::Single(manifest));
        };

        let multi = multi
            .as_mapping()
            .ok_or_else(|| AppError::validation("`multi` must be a mapping"))?;

        let mut projects = Vec::with_capacity(multi.len());
        for (key, value) in multi {
            let key = key
                .as_str()
                .ok_or_else(|| AppError::validation("project names must be strings"))?;
            if key == SINGLE_PROJECT_NAME {
                return Err(AppError::validation(r#"cannot use "_" as project name"#));
            }
            let manifest: ProjectManifest = if value.is_null() {
                ProjectManifest::default()
            } else {
                serde_yaml::from_value(value.clone()).map_err(|e| {
                    AppError::validation(format!("invalid manifest for '{key}': {e}"))
                })?
            };
            manifest.validate()?;
            projects.push((format_project_name(key), manifest));
        }

        Ok(Self::Multi(projects))
    }

    /// Parse, falling back to the default single project on any error.
    pub fn parse_or_default(contents: &str) -> Self {
        Self::parse(contents).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not parse kitspace.yaml, using defaults");
            Self::default()
        })
    }

    /// Fill empty summaries with the repository description.
    pub fn with_summary_fallback(mut self, description: &str) -> Self {
        match &mut self {
            Self::Single(manifest) => {
                if manifest.summary.is_empty() {
                    manifest.summary = description.to_string();
                }
            }
            Self::Multi(projects) => {
                for (_, manifest) in projects.iter_mut() {
                    if manifest.summary.is_empty() {
                        manifest.summary = description.to_string();
                    }
                }
            }
        }
        self
    }

    /// The projects to process.
    pub fn projects(&self) -> Vec<Project> {
        match self {
            Self::Single(manifest) => vec![Project {
                name: SINGLE_PROJECT_NAME.to_string(),
                manifest: manifest.clone(),
            }],
            Self::Multi(projects) => projects
                .iter()
                .map(|(name, manifest)| Project {
                    name: name.clone(),
                    manifest: manifest.clone(),
                })
                .collect(),
        }
    }

    /// Whether the manifest lists sub-projects.
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }
}

/// Make a sub-project name usable as a Gitea repository name.
pub fn format_project_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '-'
            }
        })
        .take(MAX_PROJECT_NAME_LEN)
        .collect()
}

fn default_true() -> bool {
    true
}
