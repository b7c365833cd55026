//! pescan CLI
//!
//! Batch static analysis of PE files: structural dumps, resource
//! extraction, hashes and rule-based classification.

use clap::{ArgAction, CommandFactory, Parser};
use pescan::error::{AnalysisError, Result, EXIT_SUCCESS, EXIT_USAGE};
use pescan::logging::{init_tracing, init_tracing_json};
use pescan::triage::{
    resolve_targets, validate_inputs, AnalysisConfig, AnalysisOptions, DumpCategorySet,
    Orchestrator, PeImageParser, RunReport, YaraLoader,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

/// Static analyzer for PE executables.
///
/// Prints a summary of every target by default, or the structures selected
/// with --dump. Files that are not PE images are identified with the
/// generic file type rules instead.
#[derive(Parser, Debug)]
#[command(name = "pescan")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files or directories to analyze
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// File to analyze (may be repeated)
    #[arg(short = 'p', long = "pe", value_name = "FILE")]
    pe: Vec<PathBuf>,

    /// Analyze the files inside directories (one level, no subdirectories)
    #[arg(short, long)]
    recursive: bool,

    /// Dump structures: dos, pe, opt, sections, imports, exports, resources,
    /// version, debug, relocations, tls, certificates or all
    #[arg(short, long, value_name = "CATEGORIES")]
    dump: Vec<String>,

    /// Compute hashes of the file (slower)
    #[arg(long)]
    hashes: bool,

    /// Extract resources into this directory
    #[arg(short = 'x', long, value_name = "DIR")]
    extract: Option<PathBuf>,

    /// Identify packers and compilers
    #[arg(long)]
    peid: bool,

    /// Scan with malware signatures
    #[arg(long)]
    clamav: bool,

    /// Directory holding peid.yara, clamav.yara and magic.yara
    #[arg(long, env = "PESCAN_RULES_DIR", value_name = "DIR")]
    rules_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// Flagged targets first, then positional ones.
    fn targets(&self) -> Vec<PathBuf> {
        self.pe.iter().chain(&self.files).cloned().collect()
    }

    fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            dump: (!self.dump.is_empty()).then(|| DumpCategorySet::from_tokens(&self.dump)),
            hashes: self.hashes,
            extract: self.extract.clone(),
            packer: self.peid,
            malware: self.clamav,
        }
    }

    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let config = match &self.config {
            Some(path) => AnalysisConfig::from_file(path)?,
            None => AnalysisConfig::default(),
        };
        Ok(match &self.rules_dir {
            Some(dir) => config.with_rules_dir(dir),
            None => config,
        })
    }
}

fn run(args: &Args) -> Result<RunReport> {
    let inputs = args.targets();
    if inputs.is_empty() {
        return Err(AnalysisError::Argument("no input files specified".into()));
    }
    validate_inputs(&inputs)?;

    let config = args.analysis_config()?;
    debug!(?config, "effective configuration");

    let orchestrator = Orchestrator::new(
        Box::new(PeImageParser::from_config(&config)),
        Box::new(YaraLoader::new(config.io.limits())),
        config.rules.clone(),
        args.analysis_options(),
    )?;

    let targets = resolve_targets(&inputs, args.recursive);
    debug!("{} targets to analyze", targets.len());

    let stdout = io::stdout();
    let stderr = io::stderr();
    orchestrator.run(&targets, &mut stdout.lock(), &mut stderr.lock())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help and version are not errors.
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_SUCCESS };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    if args.log_json {
        init_tracing_json(args.verbose);
    } else {
        init_tracing(args.verbose);
    }

    match run(&args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[!] Error: {}.", e);
            if matches!(e, AnalysisError::Argument(_)) {
                eprintln!("{}", Args::command().render_usage());
            }
            ExitCode::from(e.exit_code())
        }
    }
}
