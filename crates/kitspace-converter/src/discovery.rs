//! Locating converter inputs inside a checkout.
//!
//! `files` arguments are the checkout-relative listing from
//! [`list_files`](crate::filesystem::list_files). Every finder returns an
//! absolute path.

use std::path::{Path, PathBuf};

use kitspace_entity::project::{EdaType, ProjectManifest};

use crate::filesystem::{checkout_path, find_by_extension, has_extension};

const README_EXTENSIONS: [&str; 5] = ["markdown", "mdown", "mkdn", "md", "rst"];

/// The KiCad board: the manifest's `eda.pcb` for KiCad projects, else the
/// first `.kicad_pcb` in the checkout.
pub fn kicad_pcb(checkout: &Path, files: &[PathBuf], manifest: &ProjectManifest) -> Option<PathBuf> {
    match &manifest.eda {
        Some(eda) if eda.eda_type == EdaType::Kicad => checkout_path(checkout, &eda.pcb),
        _ => find_by_extension(files, "kicad_pcb").map(|f| checkout.join(f)),
    }
}

/// Board file for the interactive BOM.
///
/// The manifest's `eda.pcb` wins. Without an `eda` section the first
/// `.kicad_pcb` is used, then the first `.brd` if it is an Eagle board.
pub async fn ibom_board(
    checkout: &Path,
    files: &[PathBuf],
    manifest: &ProjectManifest,
) -> Option<PathBuf> {
    if let Some(eda) = &manifest.eda {
        if let Some(pcb) = checkout_path(checkout, &eda.pcb) {
            return Some(pcb);
        }
    } else if let Some(pcb) = find_by_extension(files, "kicad_pcb") {
        return Some(checkout.join(pcb));
    }

    let brd = checkout.join(find_by_extension(files, "brd")?);
    is_eagle_board(&brd).await.then_some(brd)
}

async fn is_eagle_board(path: &Path) -> bool {
    match tokio::fs::read(path).await {
        Ok(contents) => String::from_utf8_lossy(&contents).contains("eagle.dtd"),
        Err(_) => false,
    }
}

/// Top-level KiCad schematic.
///
/// Derived from the manifest's board for KiCad projects, else from the
/// project file, else the first schematic found.
pub fn kicad_schematic(checkout: &Path, files: &[PathBuf], manifest: &ProjectManifest) -> Option<PathBuf> {
    if let Some(eda) = manifest.eda.as_ref().filter(|e| e.eda_type == EdaType::Kicad) {
        let pcb = checkout_path(checkout, &eda.pcb)?;
        return prefer_existing(&pcb);
    }

    let project = files
        .iter()
        .find(|f| has_extension(f, "kicad_pro") || has_extension(f, "pro"));
    if let Some(project) = project {
        return prefer_existing(&checkout.join(project));
    }

    find_by_extension(files, "kicad_sch")
        .or_else(|| find_by_extension(files, "sch"))
        .map(|f| checkout.join(f))
}

/// `.kicad_sch` next to `path` if present, else `.sch`.
fn prefer_existing(path: &Path) -> Option<PathBuf> {
    let modern = path.with_extension("kicad_sch");
    if modern.is_file() {
        return Some(modern);
    }
    let legacy = path.with_extension("sch");
    legacy.is_file().then_some(legacy)
}

/// The README: the manifest's `readme`, else a `readme[.ext]` at the root.
pub fn readme(checkout: &Path, files: &[PathBuf], manifest: &ProjectManifest) -> Option<PathBuf> {
    if let Some(readme) = &manifest.readme {
        return checkout_path(checkout, readme);
    }
    files
        .iter()
        .filter(|f| f.components().count() == 1)
        .find(|f| is_readme_name(f))
        .map(|f| checkout.join(f))
}

fn is_readme_name(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    if !stem.eq_ignore_ascii_case("readme") {
        return false;
    }
    match path.extension() {
        None => true,
        Some(_) => README_EXTENSIONS.iter().any(|ext| has_extension(path, ext)),
    }
}

/// BOM input: the manifest's `bom`, else `1-click-bom.tsv`, else
/// `1-click-bom.csv` at the root.
pub fn bom(checkout: &Path, manifest: &ProjectManifest) -> Option<PathBuf> {
    if let Some(bom) = &manifest.bom {
        return checkout_path(checkout, bom);
    }
    ["1-click-bom.tsv", "1-click-bom.csv"]
        .into_iter()
        .map(|name| checkout.join(name))
        .find(|path| path.is_file())
}
