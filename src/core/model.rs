use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type AttemptId = u64;

/// Archive extensions the service accepts.
pub const ALLOWED_EXTENSIONS: &[&str] = &["zip", "mcpack", "jar"];

/// Extensions that get the extra server-side advisory check after selection.
pub const ADVISORY_EXTENSIONS: &[&str] = &["mcpack", "jar"];

/// Upload ceiling. Anything larger is rejected without touching the network.
pub const MAX_UPLOAD_BYTES: u64 = 512 * 1024 * 1024;

/// Fallback name when the service sends no usable disposition header.
pub const DEFAULT_RESULT_NAME: &str = "optimized_pack.zip";

#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub extension: String,
}

impl CandidateFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = extension_of(&path);
        Self { path, name, size, extension }
    }

    pub fn needs_advisory_check(&self) -> bool {
        ADVISORY_EXTENSIONS.contains(&self.extension.as_str())
    }
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    FileSelected,
    Submitting,
    Success,
    Error,
}

/// Per-category counters from the service's `X-File-Types` header.
/// The `other` category only ever carries `count`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct CategoryStats {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub optimized: u64,
    #[serde(default)]
    pub saved: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationStats {
    pub original_size: u64,
    pub optimized_size: u64,
    pub compression_ratio: f64,
    pub total_files: u64,
    pub optimized_files: u64,
    pub bytes_saved: u64,
    pub actual_bytes_saved: u64,
    pub file_types: BTreeMap<String, CategoryStats>,
}

/// Knobs sent along with an upload.
#[derive(Debug, Clone, Copy)]
pub struct OptimizeRequest {
    pub quality: u8,
    pub max_size: Option<u32>,
}

impl OptimizeRequest {
    pub fn new(quality: u8, max_size: Option<u32>) -> anyhow::Result<Self> {
        anyhow::ensure!((1..=100).contains(&quality), "quality must be in 1..=100");
        if let Some(px) = max_size {
            anyhow::ensure!(px > 0, "max_size must be a positive pixel dimension");
        }
        Ok(Self { quality, max_size })
    }
}

/// A fully received optimization result, before it enters the artifact slot.
#[derive(Debug, Clone)]
pub struct OptimizedResult {
    pub payload: bytes::Bytes,
    pub filename: String,
    pub stats: OptimizationStats,
}

/// Advisory `/validate` verdict. Channel failures collapse to `Acceptable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvisoryVerdict {
    Acceptable,
    Invalid(String),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceErrorBody {
    pub detail: String,
}
