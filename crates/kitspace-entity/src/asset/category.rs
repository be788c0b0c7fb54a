//! Asset category enumeration.

use std::fmt;
use std::str::FromStr;

use kitspace_core::AppError;
use serde::{Deserialize, Serialize};

/// The category of derived assets one converter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetCategory {
    /// `kitspace-yaml.json`, the linkified manifest.
    KitspaceYaml,
    /// Zipped Gerbers and `gerber-info.json`.
    Gerbers,
    /// Rendered board SVGs and PNGs.
    Images,
    /// `1-click-BOM.tsv` and `bom-info.json`.
    Bom,
    /// Rendered `readme.html`.
    Readme,
    /// `interactive_bom.json`.
    InteractiveBom,
    /// Rendered schematic SVG.
    Schematic,
}

impl AssetCategory {
    /// Every category in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::KitspaceYaml,
        Self::Gerbers,
        Self::Images,
        Self::Bom,
        Self::Readme,
        Self::InteractiveBom,
        Self::Schematic,
    ];

    /// Categories enqueued for every project of a repository.
    pub const PROJECT: [Self; 6] = [
        Self::Gerbers,
        Self::Images,
        Self::Bom,
        Self::Readme,
        Self::InteractiveBom,
        Self::Schematic,
    ];

    /// Whether this category's assets live at repo level rather than per project.
    pub fn is_repo_level(&self) -> bool {
        matches!(self, Self::KitspaceYaml)
    }

    /// Return the canonical kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KitspaceYaml => "kitspace-yaml",
            Self::Gerbers => "gerbers",
            Self::Images => "images",
            Self::Bom => "bom",
            Self::Readme => "readme",
            Self::InteractiveBom => "interactive-bom",
            Self::Schematic => "schematic",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kitspace-yaml" => Ok(Self::KitspaceYaml),
            "gerbers" | "gerber-info" => Ok(Self::Gerbers),
            "images" => Ok(Self::Images),
            "bom" | "bom-info" => Ok(Self::Bom),
            "readme" => Ok(Self::Readme),
            "interactive-bom" | "ibom" => Ok(Self::InteractiveBom),
            "schematic" | "schematics" => Ok(Self::Schematic),
            other => Err(AppError::validation(format!(
                "unknown asset category '{other}'"
            ))),
        }
    }
}
