//! Batch analysis driver.
//!
//! The orchestrator owns the signature engines for the whole run and walks
//! the resolved targets one at a time. Setup problems (a requested engine
//! whose rules do not load) surface from [`Orchestrator::new`] before any
//! target is touched; everything that goes wrong with a single target is
//! reported on the diagnostic stream and the batch carries on. A failed write
//! to either stream ends the run.

use std::cell::OnceCell;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, info_span, warn};

use crate::error::{AnalysisError, Result};
use crate::triage::config::RulePaths;
use crate::triage::dispatch::{dump_categories, DumpCategorySet};
use crate::triage::image::{ImageParser, ParsedImage};
use crate::triage::signatures::{EngineKind, EngineLoader, SignatureEngine, SignatureMatch};

/// Width of the line printed between two targets.
pub const SEPARATOR_WIDTH: usize = 80;

/// What to do with every successfully parsed target.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Explicit categories; `None` prints the summary instead.
    pub dump: Option<DumpCategorySet>,
    pub hashes: bool,
    /// Resource extraction directory.
    pub extract: Option<PathBuf>,
    /// Run the packer/compiler engine.
    pub packer: bool,
    /// Run the malware signature engine.
    pub malware: bool,
}

/// Counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub attempted: usize,
    pub analyzed: usize,
    pub parse_failures: usize,
}

pub struct Orchestrator {
    parser: Box<dyn ImageParser>,
    loader: Box<dyn EngineLoader>,
    rules: RulePaths,
    options: AnalysisOptions,
    packer: Option<Box<dyn SignatureEngine>>,
    malware: Option<Box<dyn SignatureEngine>>,
    /// Loaded on the first parse failure; `None` inside means it failed to load.
    file_type: OnceCell<Option<Box<dyn SignatureEngine>>>,
}

impl Orchestrator {
    /// Load every requested engine. Any load failure is returned as is and
    /// ends the run.
    pub fn new(
        parser: Box<dyn ImageParser>,
        loader: Box<dyn EngineLoader>,
        rules: RulePaths,
        options: AnalysisOptions,
    ) -> Result<Self> {
        let load = |requested: bool, kind: EngineKind| {
            if requested {
                loader.load(kind, kind.rule_path(&rules)).map(Some)
            } else {
                Ok(None)
            }
        };
        let packer = load(options.packer, EngineKind::Packer)?;
        let malware = load(options.malware, EngineKind::Malware)?;

        Ok(Self {
            parser,
            loader,
            rules,
            options,
            packer,
            malware,
            file_type: OnceCell::new(),
        })
    }

    /// Analyze `targets` in order.
    ///
    /// Only write errors on `out`/`err` make this fail.
    pub fn run(
        &self,
        targets: &[PathBuf],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();

        for (index, target) in targets.iter().enumerate() {
            let _span = info_span!("target", path = %target.display()).entered();
            report.attempted += 1;

            let image = match self.parser.parse(target) {
                Ok(image) => image,
                Err(e) => {
                    debug!("Parse failed: {}", e);
                    report.parse_failures += 1;
                    writeln!(err, "[!] Error: {}.", e)?;
                    self.identify_file_type(target, err)?;
                    writeln!(err)?;
                    continue;
                }
            };

            self.analyze(image.as_ref(), out, err)?;
            report.analyzed += 1;

            if index + 1 < targets.len() {
                writeln!(out, "{}", "-".repeat(SEPARATOR_WIDTH))?;
                writeln!(out)?;
            }
        }

        info!(
            attempted = report.attempted,
            analyzed = report.analyzed,
            parse_failures = report.parse_failures,
            "Batch complete"
        );
        Ok(report)
    }

    fn analyze(
        &self,
        image: &dyn ParsedImage,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<()> {
        match &self.options.dump {
            Some(categories) => {
                dump_categories(image, categories, self.options.hashes, out, err)?;
            }
            None => match image.dump_summary(out) {
                Ok(()) => {}
                Err(e @ AnalysisError::Io(_)) => return Err(e),
                Err(e) => {
                    writeln!(
                        err,
                        "[!] Error: Could not summarize {} ({}).",
                        image.path().display(),
                        e
                    )?;
                }
            },
        }

        if let Some(dir) = &self.options.extract {
            if let Err(e) = image.extract_resources(dir) {
                warn!("Extraction failed: {}", e);
                writeln!(err, "[!] Error: {}.", e)?;
            }
        }

        if self.options.hashes {
            match image.dump_hashes(out) {
                Ok(()) => {}
                Err(e @ AnalysisError::Io(_)) => return Err(e),
                Err(e) => {
                    writeln!(
                        err,
                        "[!] Error: Could not hash {} ({}).",
                        image.path().display(),
                        e
                    )?;
                }
            }
        }

        if let Some(engine) = &self.packer {
            print_matches(out, EngineKind::Packer, &engine.scan(image.path()))?;
        }
        if let Some(engine) = &self.malware {
            print_matches(out, EngineKind::Malware, &engine.scan(image.path()))?;
        }
        Ok(())
    }

    /// Best-effort description of a file that is not a valid image.
    fn identify_file_type(&self, target: &Path, err: &mut dyn Write) -> Result<()> {
        if !target.exists() || target.is_dir() {
            return Ok(());
        }
        let Some(engine) = self.file_type_engine() else {
            return Ok(());
        };

        let matches = engine.scan(target);
        if !matches.is_empty() {
            let kind = EngineKind::FileType;
            let descriptions: Vec<&str> = matches
                .iter()
                .map(|m| m.field_or_rule(kind.field()))
                .collect();
            writeln!(err, "{} {}", kind.heading(), descriptions.join(", "))?;
        }
        Ok(())
    }

    fn file_type_engine(&self) -> Option<&dyn SignatureEngine> {
        self.file_type
            .get_or_init(|| {
                let kind = EngineKind::FileType;
                match self.loader.load(kind, kind.rule_path(&self.rules)) {
                    Ok(engine) => Some(engine),
                    Err(e) => {
                        debug!("File type identification unavailable: {}", e);
                        None
                    }
                }
            })
            .as_deref()
    }
}

/// Heading, one tab-indented line per match and a blank line. Nothing for
/// an empty match list.
fn print_matches(out: &mut dyn Write, kind: EngineKind, matches: &[SignatureMatch]) -> Result<()> {
    if matches.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", kind.heading())?;
    for m in matches {
        writeln!(out, "\t{}", m.field_or_rule(kind.field()))?;
    }
    writeln!(out)?;
    Ok(())
}
