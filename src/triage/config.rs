//! Configuration for the analysis pipeline.
//!
//! Every section has defaults, so a JSON file only needs the keys it wants
//! to change.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::formats::pe::ParseOptions;
use crate::triage::io::IOLimits;

/// Default directory holding the rule files.
pub const DEFAULT_RULES_DIR: &str = "resources";

/// Master configuration for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rule files for the three signature engines.
    pub rules: RulePaths,
    /// I/O configuration for file reading.
    pub io: IOConfig,
    /// Parser limits.
    pub parser: ParserConfig,
}

/// Locations of the rule files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulePaths {
    /// Packer/compiler identification rules.
    pub packer: PathBuf,
    /// Malware signature rules.
    pub malware: PathBuf,
    /// Generic file type rules, used when a target is not a PE image.
    pub file_type: PathBuf,
}

impl RulePaths {
    pub const PACKER_FILE: &'static str = "peid.yara";
    pub const MALWARE_FILE: &'static str = "clamav.yara";
    pub const FILE_TYPE_FILE: &'static str = "magic.yara";

    /// The three standard rule file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            packer: dir.join(Self::PACKER_FILE),
            malware: dir.join(Self::MALWARE_FILE),
            file_type: dir.join(Self::FILE_TYPE_FILE),
        }
    }
}

impl Default for RulePaths {
    fn default() -> Self {
        Self::in_dir(Path::new(DEFAULT_RULES_DIR))
    }
}

/// I/O configuration for file reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IOConfig {
    /// Maximum bytes to read from a file (default: unlimited).
    pub max_read_bytes: u64,
    /// Maximum file size to process (default: unlimited).
    pub max_file_size: u64,
}

impl Default for IOConfig {
    fn default() -> Self {
        Self {
            max_read_bytes: u64::MAX,
            max_file_size: u64::MAX,
        }
    }
}

impl IOConfig {
    pub fn limits(&self) -> IOLimits {
        IOLimits {
            max_read_bytes: self.max_read_bytes,
            max_file_size: self.max_file_size,
        }
    }
}

/// Limits applied while decoding PE data directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum nesting of the resource tree (default: 3).
    pub max_resource_depth: usize,
    /// Maximum number of resource leaves (default: 10000).
    pub max_resources: usize,
    /// Maximum number of imported functions (default: 10000).
    pub max_imports: usize,
    /// Maximum number of exported functions (default: 10000).
    pub max_exports: usize,
    /// Maximum number of base relocation blocks (default: 100000).
    pub max_relocation_blocks: usize,
    /// Maximum number of TLS callbacks (default: 256).
    pub max_tls_callbacks: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let options = ParseOptions::default();
        Self {
            max_resource_depth: options.max_resource_depth,
            max_resources: options.max_resources,
            max_imports: options.max_imports,
            max_exports: options.max_exports,
            max_relocation_blocks: options.max_relocation_blocks,
            max_tls_callbacks: options.max_tls_callbacks,
        }
    }
}

impl ParserConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            max_resource_depth: self.max_resource_depth,
            max_resources: self.max_resources,
            max_imports: self.max_imports,
            max_exports: self.max_exports,
            max_relocation_blocks: self.max_relocation_blocks,
            max_tls_callbacks: self.max_tls_callbacks,
        }
    }
}

impl AnalysisConfig {
    /// Load a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(?config, "loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Point all three engines at the standard rule files inside `dir`.
    pub fn with_rules_dir(mut self, dir: &Path) -> Self {
        self.rules = RulePaths::in_dir(dir);
        self
    }
}
