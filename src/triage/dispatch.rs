//! Structural dump categories and their dispatch.
//!
//! Requested tokens are flattened into a [`DumpCategorySet`]; the set always
//! iterates in canonical order, whatever order the user typed.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{AnalysisError, Result};
use crate::triage::image::ParsedImage;

/// Meta token standing for every category.
pub const ALL_TOKEN: &str = "all";

/// One structural view over a parsed image. Declaration order is the
/// canonical dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DumpCategory {
    Dos,
    Pe,
    Opt,
    Sections,
    Imports,
    Exports,
    Resources,
    Version,
    Debug,
    Relocations,
    Tls,
    Certificates,
}

impl DumpCategory {
    /// Every category, in canonical order.
    pub const ALL: [DumpCategory; 12] = [
        DumpCategory::Dos,
        DumpCategory::Pe,
        DumpCategory::Opt,
        DumpCategory::Sections,
        DumpCategory::Imports,
        DumpCategory::Exports,
        DumpCategory::Resources,
        DumpCategory::Version,
        DumpCategory::Debug,
        DumpCategory::Relocations,
        DumpCategory::Tls,
        DumpCategory::Certificates,
    ];

    /// Command line token.
    pub fn token(self) -> &'static str {
        match self {
            DumpCategory::Dos => "dos",
            DumpCategory::Pe => "pe",
            DumpCategory::Opt => "opt",
            DumpCategory::Sections => "sections",
            DumpCategory::Imports => "imports",
            DumpCategory::Exports => "exports",
            DumpCategory::Resources => "resources",
            DumpCategory::Version => "version",
            DumpCategory::Debug => "debug",
            DumpCategory::Relocations => "relocations",
            DumpCategory::Tls => "tls",
            DumpCategory::Certificates => "certificates",
        }
    }
}

impl fmt::Display for DumpCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown dump category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for DumpCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DumpCategory::ALL
            .into_iter()
            .find(|category| category.token() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Deduplicated set of requested categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpCategorySet(BTreeSet<DumpCategory>);

impl DumpCategorySet {
    pub fn all() -> Self {
        Self(DumpCategory::ALL.into_iter().collect())
    }

    /// Build a set from raw flag values.
    ///
    /// Each value may hold several comma separated tokens. Tokens are
    /// trimmed and lower-cased; `all` selects everything and unknown tokens
    /// are dropped.
    pub fn from_tokens<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for value in values {
            for token in value.as_ref().split(',') {
                let token = token.trim().to_ascii_lowercase();
                if token.is_empty() {
                    continue;
                }
                if token == ALL_TOKEN {
                    set.extend(DumpCategory::ALL);
                    continue;
                }
                match token.parse::<DumpCategory>() {
                    Ok(category) => {
                        set.insert(category);
                    }
                    Err(e) => debug!("Ignoring {}", e),
                }
            }
        }
        Self(set)
    }

    pub fn contains(&self, category: DumpCategory) -> bool {
        self.0.contains(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Members in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = DumpCategory> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<DumpCategory> for DumpCategorySet {
    fn from_iter<T: IntoIterator<Item = DumpCategory>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Run the dump operation for one category.
pub fn dump_category(
    image: &dyn ParsedImage,
    category: DumpCategory,
    with_hashes: bool,
    out: &mut dyn Write,
) -> Result<()> {
    match category {
        DumpCategory::Dos => image.dump_dos_header(out),
        DumpCategory::Pe => image.dump_pe_header(out),
        DumpCategory::Opt => image.dump_optional_header(out),
        DumpCategory::Sections => image.dump_sections(out),
        DumpCategory::Imports => image.dump_imports(out),
        DumpCategory::Exports => image.dump_exports(out),
        DumpCategory::Resources => image.dump_resources(out, with_hashes),
        DumpCategory::Version => image.dump_version_info(out),
        DumpCategory::Debug => image.dump_debug_info(out),
        DumpCategory::Relocations => image.dump_relocations(out),
        DumpCategory::Tls => image.dump_tls(out),
        DumpCategory::Certificates => image.dump_certificates(out),
    }
}

/// Dump every category of `set` in canonical order.
///
/// A failing category is reported as one line on `err` and the remaining
/// categories still run. Write errors on `out` are returned. Returns the
/// number of categories that failed.
pub fn dump_categories(
    image: &dyn ParsedImage,
    set: &DumpCategorySet,
    with_hashes: bool,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<usize> {
    let mut failures = 0;
    for category in set.iter() {
        match dump_category(image, category, with_hashes, out) {
            Ok(()) => {}
            // A broken output stream fails every later category too.
            Err(e @ AnalysisError::Io(_)) => return Err(e),
            Err(e) => {
                warn!("{} dump failed for {}: {}", category, image.path().display(), e);
                writeln!(
                    err,
                    "[!] Error: Could not dump {} of {} ({}).",
                    category,
                    image.path().display(),
                    e
                )?;
                failures += 1;
            }
        }
    }
    Ok(failures)
}
