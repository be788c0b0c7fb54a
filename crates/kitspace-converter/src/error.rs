//! Unified error type for the converters.
//!
//! Every converter failure is a permanent task failure; the scheduler only
//! retries store and network errors, which reach it as `TaskError` directly.

use std::path::PathBuf;

use kitspace_core::shell::ShellError;
use kitspace_worker::TaskError;
use thiserror::Error;

/// Error from a converter run.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// A required input file is missing from the checkout.
    #[error("{0}")]
    MissingInput(String),

    /// Fewer recognised Gerber layers than required.
    #[error("No PCB files found: {found} Gerber layers recognised, at least {required} needed")]
    TooFewGerbers {
        /// Layers recognised.
        found: usize,
        /// Configured minimum.
        required: usize,
    },

    /// Top and bottom stackup sides use different units.
    #[error("Disparate units in PCB files. Expecting {expected} on bottom.")]
    DisparateUnits {
        /// Unit of the top side.
        expected: String,
    },

    /// The BOM parsed without a single usable line.
    #[error("No lines in BOM found")]
    EmptyBom,

    /// An external tool ran but did not write its output.
    #[error("Output file not created: {path}")]
    OutputNotCreated {
        /// Expected output path.
        path: PathBuf,
    },

    /// An external tool wrote an empty output.
    #[error("Output file is empty (0 bytes): {path}")]
    OutputEmpty {
        /// Path to the empty output file.
        path: PathBuf,
    },

    /// An external tool printed something unparseable.
    #[error("Unexpected output from {tool}: {reason}")]
    ToolOutput {
        /// Program name.
        tool: String,
        /// Parse failure.
        reason: String,
    },

    /// ZIP archive contains too many files.
    #[error("ZIP contains {count} files, exceeding limit of {limit}")]
    ZipTooManyFiles {
        /// Actual count of files in the archive.
        count: usize,
        /// Maximum allowed files.
        limit: usize,
    },

    /// ZIP extraction exceeded the total size limit.
    #[error("ZIP extraction exceeded {limit} byte size limit")]
    ZipSizeExceeded {
        /// Maximum allowed bytes.
        limit: u64,
    },

    /// HTML rewriting failed.
    #[error("HTML rewriting failed: {0}")]
    Rewrite(String),

    /// External tool failure.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP library error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Image decoding or encoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// BOM reading error.
    #[error("BOM error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Blocking task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<ConversionError> for TaskError {
    fn from(err: ConversionError) -> Self {
        TaskError::Permanent(err.to_string())
    }
}
