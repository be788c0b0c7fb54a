//! Gerber layer identification from file names.
//!
//! Recognises the KiCad, Protel and Eagle CAM naming conventions. A file is a
//! Gerber layer when its name maps to a layer type; anything else in the
//! checkout is ignored.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// What a layer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Copper,
    Soldermask,
    Silkscreen,
    Solderpaste,
    Drill,
    Outline,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copper => "copper",
            Self::Soldermask => "soldermask",
            Self::Silkscreen => "silkscreen",
            Self::Solderpaste => "solderpaste",
            Self::Drill => "drill",
            Self::Outline => "outline",
        }
    }
}

/// Which side of the board a layer sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerSide {
    Top,
    Bottom,
    Inner,
    All,
}

impl LayerSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::Inner => "inner",
            Self::All => "all",
        }
    }
}

/// Identified layer of one Gerber or drill file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layer {
    pub layer_type: LayerType,
    pub side: LayerSide,
}

impl Layer {
    const fn new(layer_type: LayerType, side: LayerSide) -> Self {
        Self { layer_type, side }
    }
}

use LayerSide::{All, Bottom, Inner, Top};
use LayerType::{Copper, Drill, Outline, Silkscreen, Soldermask, Solderpaste};

static KICAD_RULES: LazyLock<Vec<(Regex, Layer)>> = LazyLock::new(|| {
    let rules: [(&str, Layer); 10] = [
        (r"(^|[-_.])f[._]cu\.", Layer::new(Copper, Top)),
        (r"(^|[-_.])b[._]cu\.", Layer::new(Copper, Bottom)),
        (r"(^|[-_.])in\d+[._]cu\.", Layer::new(Copper, Inner)),
        (r"(^|[-_.])f[._]mask\.", Layer::new(Soldermask, Top)),
        (r"(^|[-_.])b[._]mask\.", Layer::new(Soldermask, Bottom)),
        (r"(^|[-_.])f[._]silks(creen)?\.", Layer::new(Silkscreen, Top)),
        (r"(^|[-_.])b[._]silks(creen)?\.", Layer::new(Silkscreen, Bottom)),
        (r"(^|[-_.])f[._]paste\.", Layer::new(Solderpaste, Top)),
        (r"(^|[-_.])b[._]paste\.", Layer::new(Solderpaste, Bottom)),
        (r"(^|[-_.])edge[._]cuts\.", Layer::new(Outline, All)),
    ];
    rules
        .into_iter()
        .filter_map(|(pattern, layer)| Regex::new(pattern).ok().map(|re| (re, layer)))
        .collect()
});

static INNER_EXTENSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(g\d{1,2}|gp\d{1,2}|g\d{1,2}l)$").ok());

fn by_extension(extension: &str) -> Option<Layer> {
    let layer = match extension {
        "gtl" | "cmp" | "top" => Layer::new(Copper, Top),
        "gbl" | "sol" | "bot" => Layer::new(Copper, Bottom),
        "gts" | "stc" | "smt" => Layer::new(Soldermask, Top),
        "gbs" | "sts" | "smb" => Layer::new(Soldermask, Bottom),
        "gto" | "plc" | "sst" => Layer::new(Silkscreen, Top),
        "gbo" | "pls" | "ssb" => Layer::new(Silkscreen, Bottom),
        "gtp" | "crc" | "spt" => Layer::new(Solderpaste, Top),
        "gbp" | "crs" | "spb" => Layer::new(Solderpaste, Bottom),
        "gko" | "gm1" | "gml" | "gm" | "dim" | "oln" | "out" => Layer::new(Outline, All),
        "drl" | "xln" | "exc" | "drd" | "nc" => Layer::new(Drill, All),
        other => {
            let inner = INNER_EXTENSION.as_ref()?;
            if inner.is_match(other) {
                Layer::new(Copper, Inner)
            } else {
                return None;
            }
        }
    };
    Some(layer)
}

/// Identify a layer from a file name.
pub fn identify(path: &Path) -> Option<Layer> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();

    if let Some((_, layer)) = KICAD_RULES.iter().find(|(re, _)| re.is_match(&name)) {
        return Some(*layer);
    }

    let extension = Path::new(&name).extension()?.to_str()?;
    by_extension(extension)
}

/// Pick the Gerber layers of a checkout.
///
/// `files` are checkout-relative paths. With `gerber_dir` only files below it
/// are considered. When a non-inner layer occurs twice the selection is
/// reduced to the folder holding the most layers.
pub fn find_gerbers(files: &[PathBuf], gerber_dir: Option<&str>) -> BTreeMap<PathBuf, Layer> {
    let gerber_dir = gerber_dir
        .map(|d| d.trim_matches('/'))
        .filter(|d| !d.is_empty() && *d != ".");

    let layers: Vec<(PathBuf, Layer)> = files
        .iter()
        .filter(|f| gerber_dir.is_none_or(|dir| f.starts_with(dir)))
        .filter_map(|f| identify(f).map(|layer| (f.clone(), layer)))
        .collect();

    let mut seen = Vec::new();
    let has_duplicates = layers.iter().any(|(_, layer)| {
        let duplicate = layer.side != Inner && seen.contains(layer);
        seen.push(*layer);
        duplicate
    });
    if !has_duplicates {
        return layers.into_iter().collect();
    }

    let mut folder_order: Vec<&Path> = Vec::new();
    let mut counts: HashMap<&Path, usize> = HashMap::new();
    for (file, _) in &layers {
        let folder = file.parent().unwrap_or(Path::new(""));
        let count = counts.entry(folder).or_insert(0);
        if *count == 0 {
            folder_order.push(folder);
        }
        *count += 1;
    }
    let mut best: Option<&Path> = None;
    for folder in folder_order {
        let better = best.is_none_or(|b| counts[folder] > counts[b]);
        if better {
            best = Some(folder);
        }
    }
    let best = best.map(Path::to_path_buf).unwrap_or_default();

    layers
        .into_iter()
        .filter(|(file, _)| file.parent().unwrap_or(Path::new("")) == best)
        .collect()
}
