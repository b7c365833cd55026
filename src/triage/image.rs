//! Image parsing capability used by the orchestrator.
//!
//! The orchestrator only sees [`ImageParser`] and [`ParsedImage`]; the PE
//! implementation below adapts [`PeImage`] and its text dumps to that seam.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::formats::pe::directories::resource::{
    self, RT_BITMAP, RT_GROUP_ICON, RT_HTML, RT_ICON, RT_MANIFEST, RT_STRING, RT_VERSION,
};
use crate::formats::pe::{dump, ParseOptions, PeError, PeImage, ResourceEntry, ResourceId};
use crate::triage::config::AnalysisConfig;
use crate::triage::io::{read_bounded, IOLimits};
use crate::triage::sniffers::ContentSniffer;

/// Turns a path into a parsed image, or a `Parse` error for anything that is
/// not a well-formed image.
pub trait ImageParser {
    fn parse(&self, path: &Path) -> Result<Box<dyn ParsedImage>>;
}

/// Read-only view of one successfully parsed target.
///
/// Every `dump_*` writes a single block to `out` and leaves the image
/// untouched.
pub trait ParsedImage {
    fn path(&self) -> &Path;

    fn dump_summary(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_dos_header(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_pe_header(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_optional_header(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_sections(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_imports(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_exports(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_resources(&self, out: &mut dyn Write, with_hashes: bool) -> Result<()>;
    fn dump_version_info(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_debug_info(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_relocations(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_tls(&self, out: &mut dyn Write) -> Result<()>;
    fn dump_certificates(&self, out: &mut dyn Write) -> Result<()>;

    /// Whole-file digests.
    fn dump_hashes(&self, out: &mut dyn Write) -> Result<()>;

    /// Write every file-backed resource into `dir`, returning how many were
    /// written.
    fn extract_resources(&self, dir: &Path) -> Result<usize>;
}

/// [`ImageParser`] for PE files, reading through the bounded file reader.
#[derive(Debug, Clone, Default)]
pub struct PeImageParser {
    limits: IOLimits,
    options: ParseOptions,
}

impl PeImageParser {
    pub fn new(limits: IOLimits, options: ParseOptions) -> Self {
        Self { limits, options }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.io.limits(), config.parser.parse_options())
    }

    /// Parse bytes already in memory; `path` only labels the result.
    pub fn parse_bytes(&self, path: &Path, data: Vec<u8>) -> Result<Box<dyn ParsedImage>> {
        let image =
            PeImage::with_options(data, self.options.clone()).map_err(|source| {
                AnalysisError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        debug!(
            "Parsed {} ({}, {} sections)",
            path.display(),
            image.machine(),
            image.sections().len()
        );

        Ok(Box::new(PeTarget {
            path: path.to_path_buf(),
            image,
        }))
    }
}

impl ImageParser for PeImageParser {
    fn parse(&self, path: &Path) -> Result<Box<dyn ParsedImage>> {
        let data = read_bounded(path, &self.limits).map_err(|e| AnalysisError::Parse {
            path: path.to_path_buf(),
            source: PeError::IoError(e.to_string()),
        })?;
        self.parse_bytes(path, data)
    }
}

/// A parsed PE file together with the path it was read from.
pub struct PeTarget {
    path: PathBuf,
    image: PeImage,
}

impl ParsedImage for PeTarget {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dump_summary(&self, out: &mut dyn Write) -> Result<()> {
        dump::summary(&self.image, out)
    }

    fn dump_dos_header(&self, out: &mut dyn Write) -> Result<()> {
        dump::dos_header(&self.image, out)
    }

    fn dump_pe_header(&self, out: &mut dyn Write) -> Result<()> {
        dump::pe_header(&self.image, out)
    }

    fn dump_optional_header(&self, out: &mut dyn Write) -> Result<()> {
        dump::optional_header(&self.image, out)
    }

    fn dump_sections(&self, out: &mut dyn Write) -> Result<()> {
        dump::sections(&self.image, out)
    }

    fn dump_imports(&self, out: &mut dyn Write) -> Result<()> {
        dump::imports(&self.image, out)
    }

    fn dump_exports(&self, out: &mut dyn Write) -> Result<()> {
        dump::exports(&self.image, out)
    }

    fn dump_resources(&self, out: &mut dyn Write, with_hashes: bool) -> Result<()> {
        dump::resources(&self.image, out, with_hashes)
    }

    fn dump_version_info(&self, out: &mut dyn Write) -> Result<()> {
        dump::version_info(&self.image, out)
    }

    fn dump_debug_info(&self, out: &mut dyn Write) -> Result<()> {
        dump::debug_info(&self.image, out)
    }

    fn dump_relocations(&self, out: &mut dyn Write) -> Result<()> {
        dump::relocations(&self.image, out)
    }

    fn dump_tls(&self, out: &mut dyn Write) -> Result<()> {
        dump::tls(&self.image, out)
    }

    fn dump_certificates(&self, out: &mut dyn Write) -> Result<()> {
        dump::certificates(&self.image, out)
    }

    fn dump_hashes(&self, out: &mut dyn Write) -> Result<()> {
        dump::hashes(&self.image, out)
    }

    fn extract_resources(&self, dir: &Path) -> Result<usize> {
        extract_resources(&self.image, dir)
    }
}

/// Extension implied by the resource type, if any.
fn type_extension(kind: &ResourceId) -> Option<&'static str> {
    match kind {
        ResourceId::Id(RT_ICON) | ResourceId::Id(RT_GROUP_ICON) => Some("ico"),
        ResourceId::Id(RT_BITMAP) => Some("bmp"),
        ResourceId::Id(RT_MANIFEST) => Some("xml"),
        ResourceId::Id(RT_VERSION) | ResourceId::Id(RT_STRING) => Some("txt"),
        ResourceId::Id(RT_HTML) => Some("html"),
        _ => None,
    }
}

/// Keep file names portable: anything outside `[A-Za-z0-9_.-]` becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<type>_<name>_<language>.<ext>` for one resource.
pub fn resource_file_name(entry: &ResourceEntry, bytes: &[u8]) -> String {
    let extension =
        type_extension(&entry.kind).unwrap_or_else(|| ContentSniffer::extension_for(bytes));
    let stem = format!(
        "{}_{}_{:04x}",
        resource::resource_type_name(&entry.kind),
        entry.name,
        entry.language
    );
    format!("{}.{}", sanitize_file_name(&stem), extension)
}

/// Write every file-backed resource of `image` into `dir`.
pub fn extract_resources(image: &PeImage, dir: &Path) -> Result<usize> {
    let extraction_error = |reason: String| AnalysisError::Extraction {
        path: dir.to_path_buf(),
        reason,
    };

    let entries = image.resources().map_err(|e| extraction_error(e.to_string()))?;
    fs::create_dir_all(dir).map_err(|e| extraction_error(e.to_string()))?;

    let mut written = 0;
    for entry in &entries {
        let Some(bytes) = image.resource_data(entry) else {
            debug!(
                "Skipping resource {}/{}: data is not backed by the file",
                resource::resource_type_name(&entry.kind),
                entry.name
            );
            continue;
        };
        let target = dir.join(resource_file_name(entry, bytes));
        fs::write(&target, bytes).map_err(|e| extraction_error(e.to_string()))?;
        written += 1;
    }

    info!("Extracted {} resources to {}", written, dir.display());
    Ok(written)
}
