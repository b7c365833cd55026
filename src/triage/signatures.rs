//! Rule-based file classification.
//!
//! Three engines share the same shape: packer/compiler identification,
//! malware signatures, and generic file type detection for targets that are
//! not PE images. Rules are compiled with `yara-x` once and reused for every
//! target.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::triage::config::RulePaths;
use crate::triage::io::{read_bounded, IOLimits};

/// One rule that fired on a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureMatch {
    /// Rule identifier
    pub rule: String,
    pub namespace: String,
    /// Metadata of the rule; which keys exist depends on the rule
    pub fields: BTreeMap<String, String>,
}

impl SignatureMatch {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The requested field, or the rule identifier when the rule lacks it.
    pub fn field_or_rule(&self, key: &str) -> &str {
        self.field(key).unwrap_or(&self.rule)
    }
}

/// Scans one file against a loaded rule set.
pub trait SignatureEngine {
    /// Matches in rule order. Unreadable files yield no matches.
    fn scan(&self, path: &Path) -> Vec<SignatureMatch>;
}

/// The three rule sets the analyzer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Packer,
    Malware,
    FileType,
}

impl EngineKind {
    /// Metadata field shown for each match.
    pub fn field(self) -> &'static str {
        match self {
            EngineKind::Packer => "packer_name",
            EngineKind::Malware => "signature",
            EngineKind::FileType => "description",
        }
    }

    /// Heading printed above the matches.
    pub fn heading(self) -> &'static str {
        match self {
            EngineKind::Packer => "Packer/compiler signature(s):",
            EngineKind::Malware => "Malware signature(s):",
            EngineKind::FileType => "Detected file type(s):",
        }
    }

    pub fn rule_path(self, rules: &RulePaths) -> &Path {
        match self {
            EngineKind::Packer => &rules.packer,
            EngineKind::Malware => &rules.malware,
            EngineKind::FileType => &rules.file_type,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineKind::Packer => "packer",
            EngineKind::Malware => "malware",
            EngineKind::FileType => "file type",
        })
    }
}

/// Loads the rules for one engine.
pub trait EngineLoader {
    fn load(&self, kind: EngineKind, path: &Path) -> Result<Box<dyn SignatureEngine>>;
}

/// A compiled `yara-x` rule set.
pub struct YaraEngine {
    rules: yara_x::Rules,
    limits: IOLimits,
}

impl YaraEngine {
    /// Compile rules from source text.
    pub fn from_source(source: &str, limits: IOLimits) -> std::result::Result<Self, String> {
        let mut compiler = yara_x::Compiler::new();
        compiler
            .add_source(source.as_bytes())
            .map_err(|e| e.to_string())?;
        Ok(Self {
            rules: compiler.build(),
            limits,
        })
    }

    /// Compile the rule file for `kind`.
    pub fn from_file(kind: EngineKind, path: &Path, limits: IOLimits) -> Result<Self> {
        let load_error = |reason: String| AnalysisError::EngineLoad {
            engine: kind.to_string(),
            path: path.to_path_buf(),
            reason,
        };

        let source = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let engine = Self::from_source(&source, limits).map_err(load_error)?;
        info!("Loaded {} rules from {}", kind, path.display());
        Ok(engine)
    }

    /// Scan an in-memory buffer.
    pub fn scan_bytes(&self, data: &[u8]) -> Vec<SignatureMatch> {
        let mut scanner = yara_x::Scanner::new(&self.rules);
        let results = match scanner.scan(data) {
            Ok(results) => results,
            Err(e) => {
                warn!("Rule scan failed: {}", e);
                return Vec::new();
            }
        };

        results
            .matching_rules()
            .map(|rule| SignatureMatch {
                rule: rule.identifier().to_string(),
                namespace: rule.namespace().to_string(),
                fields: rule
                    .metadata()
                    .filter_map(|(key, value)| {
                        let value = match value {
                            yara_x::MetaValue::String(s) => s.to_string(),
                            yara_x::MetaValue::Integer(i) => i.to_string(),
                            yara_x::MetaValue::Float(f) => f.to_string(),
                            yara_x::MetaValue::Bool(b) => b.to_string(),
                            _ => return None,
                        };
                        Some((key.to_string(), value))
                    })
                    .collect(),
            })
            .collect()
    }
}

impl SignatureEngine for YaraEngine {
    fn scan(&self, path: &Path) -> Vec<SignatureMatch> {
        match read_bounded(path, &self.limits) {
            Ok(data) => {
                let matches = self.scan_bytes(&data);
                debug!("{} rules matched {}", matches.len(), path.display());
                matches
            }
            Err(e) => {
                warn!("Could not read {} for scanning: {}", path.display(), e);
                Vec::new()
            }
        }
    }
}

/// [`EngineLoader`] compiling rule files with `yara-x`.
#[derive(Debug, Clone, Default)]
pub struct YaraLoader {
    limits: IOLimits,
}

impl YaraLoader {
    pub fn new(limits: IOLimits) -> Self {
        Self { limits }
    }
}

impl EngineLoader for YaraLoader {
    fn load(&self, kind: EngineKind, path: &Path) -> Result<Box<dyn SignatureEngine>> {
        Ok(Box::new(YaraEngine::from_file(
            kind,
            path,
            self.limits.clone(),
        )?))
    }
}
