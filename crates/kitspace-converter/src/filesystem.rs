//! Filesystem utilities for the converters: scratch directories, checkout
//! discovery and ZIP handling.

use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

use crate::error::ConversionError;

/// Maximum files in a ZIP archive.
const MAX_ZIP_FILES: usize = 10_000;
/// Maximum total extracted size (1 GB).
const MAX_EXTRACTED_SIZE: u64 = 1024 * 1024 * 1024;
/// Buffer size for ZIP copy.
const BUFFER_SIZE: usize = 64 * 1024;

/// A per-run working directory, removed by [`remove`](Self::remove).
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `<root>/<uuid>`.
    pub async fn create(root: &Path) -> Result<Self, ConversionError> {
        let path = root.join(Uuid::now_v7().simple().to_string());
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    /// The directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort removal.
    pub async fn remove(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            tracing::warn!(
                dir = %self.path.display(),
                error = %e,
                "Failed to clean up scratch directory"
            );
        }
    }
}

/// Every regular file below `root`, relative to it and sorted.
///
/// Version-control directories are skipped.
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

/// First file (in sorted order) whose extension matches, case-insensitively.
pub fn find_by_extension(files: &[PathBuf], extension: &str) -> Option<PathBuf> {
    files
        .iter()
        .find(|f| has_extension(f, extension))
        .cloned()
}

/// Case-insensitive extension check.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Join a manifest-relative path onto the checkout, refusing to escape it.
pub fn checkout_path(checkout: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative.trim_start_matches('/'));
    let escapes = relative
        .components()
        .any(|c| !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir));
    if escapes {
        return None;
    }
    Some(checkout.join(relative))
}

/// Read an output written by an external tool.
pub async fn read_output(path: &Path) -> Result<Vec<u8>, ConversionError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConversionError::OutputNotCreated {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    if data.is_empty() {
        return Err(ConversionError::OutputEmpty {
            path: path.to_path_buf(),
        });
    }
    Ok(data)
}

/// Build a deflated ZIP with every entry placed under `folder/`.
pub fn zip_files(folder: &str, files: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ConversionError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));

    for (name, data) in files {
        writer.start_file(format!("{folder}/{name}"), options)?;
        writer.write_all(data)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Extract a ZIP archive held in memory with security limits.
pub fn extract_zip(data: &[u8], extract_to: &Path) -> Result<(), ConversionError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    if archive.len() > MAX_ZIP_FILES {
        return Err(ConversionError::ZipTooManyFiles {
            count: archive.len(),
            limit: MAX_ZIP_FILES,
        });
    }

    fs::create_dir_all(extract_to)?;
    let mut total_size = 0u64;

    for i in 0..archive.len() {
        let mut zip_file = archive.by_index(i)?;

        let Some(enclosed_name) = zip_file.enclosed_name() else {
            continue;
        };
        let out_path = extract_to.join(enclosed_name);

        total_size += zip_file.size();
        if total_size > MAX_EXTRACTED_SIZE {
            return Err(ConversionError::ZipSizeExceeded {
                limit: MAX_EXTRACTED_SIZE,
            });
        }

        if zip_file.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&out_path)?;
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let n = zip_file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            outfile.write_all(&buffer[..n])?;
        }
    }

    Ok(())
}
