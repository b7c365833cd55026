//! Test doubles for the orchestrator's collaborators.
//!
//! The fake image writes one marker line per operation so tests can assert
//! exactly which operations ran and in which order.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pescan::error::{AnalysisError, Result};
use pescan::formats::pe::PeError;
use pescan::triage::{
    EngineKind, EngineLoader, ImageParser, ParsedImage, SignatureEngine, SignatureMatch,
};

/// Parser that accepts only the paths it was told about.
#[derive(Debug, Clone, Default)]
pub struct FakeParser {
    valid: BTreeSet<PathBuf>,
    failing_operations: BTreeSet<&'static str>,
    pub parsed: Rc<RefCell<Vec<PathBuf>>>,
}

impl FakeParser {
    pub fn accepting<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            valid: paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Make one operation (by marker name, e.g. "imports") fail on every image.
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing_operations.insert(operation);
        self
    }
}

impl ImageParser for FakeParser {
    fn parse(&self, path: &Path) -> Result<Box<dyn ParsedImage>> {
        self.parsed.borrow_mut().push(path.to_path_buf());
        if !self.valid.contains(path) {
            return Err(AnalysisError::Parse {
                path: path.to_path_buf(),
                source: PeError::InvalidDosSignature,
            });
        }
        Ok(Box::new(FakeImage {
            path: path.to_path_buf(),
            failing: self.failing_operations.clone(),
        }))
    }
}

pub struct FakeImage {
    path: PathBuf,
    failing: BTreeSet<&'static str>,
}

impl FakeImage {
    fn mark(&self, out: &mut dyn Write, operation: &'static str) -> Result<()> {
        if self.failing.contains(operation) {
            return Err(PeError::MalformedImportTable.into());
        }
        writeln!(out, "[{}] {}", operation, self.path.display())?;
        Ok(())
    }
}

impl ParsedImage for FakeImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dump_summary(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "summary")
    }

    fn dump_dos_header(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "dos")
    }

    fn dump_pe_header(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "pe")
    }

    fn dump_optional_header(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "opt")
    }

    fn dump_sections(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "sections")
    }

    fn dump_imports(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "imports")
    }

    fn dump_exports(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "exports")
    }

    fn dump_resources(&self, out: &mut dyn Write, with_hashes: bool) -> Result<()> {
        self.mark(
            out,
            if with_hashes {
                "resources+hashes"
            } else {
                "resources"
            },
        )
    }

    fn dump_version_info(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "version")
    }

    fn dump_debug_info(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "debug")
    }

    fn dump_relocations(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "relocations")
    }

    fn dump_tls(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "tls")
    }

    fn dump_certificates(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "certificates")
    }

    fn dump_hashes(&self, out: &mut dyn Write) -> Result<()> {
        self.mark(out, "hashes")
    }

    fn extract_resources(&self, dir: &Path) -> Result<usize> {
        if self.failing.contains("extract") {
            return Err(AnalysisError::Extraction {
                path: dir.to_path_buf(),
                reason: "read-only file system".into(),
            });
        }
        Ok(0)
    }
}

/// Engine returning the same matches for every file.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    matches: Vec<SignatureMatch>,
    pub scanned: Rc<RefCell<Vec<PathBuf>>>,
}

impl FakeEngine {
    pub fn new(matches: Vec<SignatureMatch>) -> Self {
        Self {
            matches,
            ..Default::default()
        }
    }
}

impl SignatureEngine for FakeEngine {
    fn scan(&self, path: &Path) -> Vec<SignatureMatch> {
        self.scanned.borrow_mut().push(path.to_path_buf());
        self.matches.clone()
    }
}

/// Loader handing out preconfigured engines; kinds without one fail to load.
#[derive(Debug, Clone, Default)]
pub struct FakeLoader {
    engines: HashMap<EngineKind, FakeEngine>,
    pub loads: Rc<Cell<usize>>,
    pub loaded_kinds: Rc<RefCell<Vec<EngineKind>>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, kind: EngineKind, engine: FakeEngine) -> Self {
        self.engines.insert(kind, engine);
        self
    }
}

impl EngineLoader for FakeLoader {
    fn load(&self, kind: EngineKind, path: &Path) -> Result<Box<dyn SignatureEngine>> {
        self.loads.set(self.loads.get() + 1);
        self.loaded_kinds.borrow_mut().push(kind);
        match self.engines.get(&kind) {
            Some(engine) => Ok(Box::new(engine.clone())),
            None => Err(AnalysisError::EngineLoad {
                engine: kind.to_string(),
                path: path.to_path_buf(),
                reason: "no such file".into(),
            }),
        }
    }
}
