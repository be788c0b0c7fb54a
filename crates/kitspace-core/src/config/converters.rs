//! External tool configuration for the asset converters.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Commands and limits used by the converters.
///
/// Every tool is invoked through the shell executor; the values here are
/// program names (resolved through `PATH`) or absolute paths.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertersConfig {
    /// Board renderer producing stackup info and top/bottom SVGs from Gerbers.
    pub board_renderer: String,
    /// SVG rasteriser used for the PNG exports.
    pub inkscape: String,
    /// KiCad plotting helper used when no Gerbers are committed.
    pub plot_kicad_pcb: String,
    /// KiCad schematic plotter.
    pub plot_kicad_sch: String,
    /// Interactive BOM generator.
    pub run_ibom: String,
    /// Timeout applied to every external tool invocation.
    #[validate(range(min = 1, max = 7200))]
    pub timeout_seconds: u64,
    /// Minimum number of recognised Gerber layers for a board to be processed.
    #[validate(range(min = 1, max = 64))]
    pub min_gerber_files: usize,
    /// Root for per-task scratch directories.
    pub temp_root: Option<PathBuf>,
}

impl Default for ConvertersConfig {
    fn default() -> Self {
        Self {
            board_renderer: "board_renderer".to_string(),
            inkscape: "inkscape".to_string(),
            plot_kicad_pcb: "plot_kicad_pcb".to_string(),
            plot_kicad_sch: "plot_kicad_sch".to_string(),
            run_ibom: "run_ibom".to_string(),
            timeout_seconds: 300,
            min_gerber_files: 5,
            temp_root: None,
        }
    }
}

impl ConvertersConfig {
    /// Resolve the effective scratch root.
    pub fn effective_temp_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("kitspace"))
    }

    /// Tool timeout as a [`std::time::Duration`].
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}
