//! Orchestrator behavior against fake collaborators.

use std::io::{self, Write};
use std::path::PathBuf;

use pescan::error::{AnalysisError, EXIT_ENGINE_LOAD, EXIT_FAILURE};
use pescan::triage::config::RulePaths;
use pescan::triage::{
    AnalysisOptions, DumpCategory, DumpCategorySet, EngineKind, Orchestrator, RunReport,
    SignatureMatch,
};

use crate::common::fakes::{FakeEngine, FakeLoader, FakeParser};
use crate::common::test_utils::{lines, write_file};

struct Captured {
    report: RunReport,
    out: Vec<String>,
    err: Vec<String>,
}

fn run(
    parser: FakeParser,
    loader: FakeLoader,
    options: AnalysisOptions,
    targets: &[PathBuf],
) -> Captured {
    let orchestrator = Orchestrator::new(
        Box::new(parser),
        Box::new(loader),
        RulePaths::default(),
        options,
    )
    .unwrap();
    let mut out = Vec::new();
    let mut err = Vec::new();
    let report = orchestrator.run(targets, &mut out, &mut err).unwrap();
    Captured {
        report,
        out: lines(&out),
        err: lines(&err),
    }
}

fn dump(tokens: &[&str]) -> AnalysisOptions {
    AnalysisOptions {
        dump: Some(DumpCategorySet::from_tokens(tokens)),
        ..Default::default()
    }
}

#[test]
fn test_every_target_is_attempted_and_failures_are_counted() {
    let dir = tempfile::tempdir().unwrap();
    let targets: Vec<PathBuf> = ["a.exe", "b.txt", "c.exe", "d.txt", "e.exe"]
        .iter()
        .map(|name| write_file(dir.path(), name, b"content"))
        .collect();
    let valid = [&targets[0], &targets[2], &targets[4]];
    let parser = FakeParser::accepting(valid.iter().map(|p| p.to_path_buf()));
    let parsed = parser.parsed.clone();

    let captured = run(parser, FakeLoader::new(), AnalysisOptions::default(), &targets);

    assert_eq!(
        captured.report,
        RunReport {
            attempted: 5,
            analyzed: 3,
            parse_failures: 2
        }
    );
    assert_eq!(*parsed.borrow(), targets);

    let diagnostics: Vec<_> = captured
        .err
        .iter()
        .filter(|line| line.starts_with("[!] Error: Could not parse"))
        .collect();
    assert_eq!(diagnostics.len(), 2);
    assert_eq!(
        diagnostics[0],
        &format!(
            "[!] Error: Could not parse {} (Invalid DOS signature).",
            targets[1].display()
        )
    );

    let summaries = captured
        .out
        .iter()
        .filter(|line| line.starts_with("[summary]"))
        .count();
    assert_eq!(summaries, 3);
}

#[test]
fn test_requested_categories_replace_the_summary() {
    let target = PathBuf::from("sample.exe");
    let captured = run(
        FakeParser::accepting([&target]),
        FakeLoader::new(),
        dump(&["exports", "imports"]),
        &[target],
    );

    assert_eq!(
        captured.out,
        vec!["[imports] sample.exe", "[exports] sample.exe"]
    );
    assert!(captured.err.is_empty());
}

#[test]
fn test_duplicate_categories_dump_once() {
    let target = PathBuf::from("sample.exe");
    for tokens in [&["imports,imports"][..], &["imports", "imports"][..]] {
        let captured = run(
            FakeParser::accepting([&target]),
            FakeLoader::new(),
            dump(tokens),
            &[target.clone()],
        );
        assert_eq!(captured.out, vec!["[imports] sample.exe"]);
    }
}

#[test]
fn test_all_dumps_every_category_in_canonical_order() {
    let target = PathBuf::from("sample.exe");
    let captured = run(
        FakeParser::accepting([&target]),
        FakeLoader::new(),
        dump(&["tls", "all", "dos"]),
        &[target],
    );

    let expected: Vec<String> = DumpCategory::ALL
        .iter()
        .map(|category| format!("[{}] sample.exe", category))
        .collect();
    assert_eq!(captured.out, expected);
}

#[test]
fn test_resource_dump_carries_the_hash_flag() {
    let target = PathBuf::from("sample.exe");
    let options = AnalysisOptions {
        hashes: true,
        ..dump(&["resources"])
    };
    let captured = run(
        FakeParser::accepting([&target]),
        FakeLoader::new(),
        options,
        &[target],
    );
    assert_eq!(
        captured.out,
        vec!["[resources+hashes] sample.exe", "[hashes] sample.exe"]
    );
}

#[test]
fn test_unknown_categories_produce_no_output() {
    let target = PathBuf::from("sample.exe");
    let captured = run(
        FakeParser::accepting([&target]),
        FakeLoader::new(),
        dump(&["bogus"]),
        &[target],
    );
    assert!(captured.out.is_empty());
    assert!(captured.err.is_empty());
}

#[test]
fn test_success_path_order() {
    let target = PathBuf::from("packed.exe");
    let loader = FakeLoader::new()
        .with_engine(
            EngineKind::Packer,
            FakeEngine::new(vec![
                SignatureMatch::new("upx").with_field("packer_name", "UPX 3.x")
            ]),
        )
        .with_engine(
            EngineKind::Malware,
            FakeEngine::new(vec![
                SignatureMatch::new("trojan").with_field("signature", "Win.Trojan.Test"),
                SignatureMatch::new("unnamed"),
            ]),
        );
    let options = AnalysisOptions {
        hashes: true,
        packer: true,
        malware: true,
        ..Default::default()
    };

    let captured = run(FakeParser::accepting([&target]), loader, options, &[target]);

    assert_eq!(
        captured.out,
        vec![
            "[summary] packed.exe",
            "[hashes] packed.exe",
            "Packer/compiler signature(s):",
            "\tUPX 3.x",
            "",
            "Malware signature(s):",
            "\tWin.Trojan.Test",
            "\tunnamed",
            "",
        ]
    );
}

#[test]
fn test_engines_without_matches_print_nothing() {
    let target = PathBuf::from("clean.exe");
    let packer = FakeEngine::new(Vec::new());
    let scanned = packer.scanned.clone();
    let loader = FakeLoader::new().with_engine(EngineKind::Packer, packer);
    let options = AnalysisOptions {
        packer: true,
        ..Default::default()
    };

    let captured = run(
        FakeParser::accepting([&target]),
        loader,
        options,
        &[target.clone()],
    );
    assert_eq!(captured.out, vec!["[summary] clean.exe"]);
    assert_eq!(*scanned.borrow(), vec![target]);
}

#[test]
fn test_engine_load_failure_aborts_before_any_target() {
    let parser = FakeParser::accepting(["a.exe"]);
    let parsed = parser.parsed.clone();
    let loader = FakeLoader::new().with_engine(EngineKind::Packer, FakeEngine::default());
    let options = AnalysisOptions {
        packer: true,
        malware: true,
        ..Default::default()
    };

    let result = Orchestrator::new(
        Box::new(parser),
        Box::new(loader),
        RulePaths::default(),
        options,
    );
    let err = result.err().unwrap();
    match &err {
        AnalysisError::EngineLoad { engine, path, .. } => {
            assert_eq!(engine, "malware");
            assert_eq!(path, &PathBuf::from("resources/clamav.yara"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.exit_code(), EXIT_ENGINE_LOAD);
    assert!(parsed.borrow().is_empty());
}

#[test]
fn test_unrequested_engines_are_not_loaded() {
    let loader = FakeLoader::new();
    let loads = loader.loads.clone();
    let orchestrator = Orchestrator::new(
        Box::new(FakeParser::default()),
        Box::new(loader),
        RulePaths::default(),
        AnalysisOptions::default(),
    );
    assert!(orchestrator.is_ok());
    assert_eq!(loads.get(), 0);
}

#[test]
fn test_fallback_reports_detected_file_type() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_file(dir.path(), "notexecutable.txt", b"hello");
    let loader = FakeLoader::new().with_engine(
        EngineKind::FileType,
        FakeEngine::new(vec![
            SignatureMatch::new("ascii").with_field("description", "ASCII text")
        ]),
    );

    let captured = run(
        FakeParser::default(),
        loader,
        AnalysisOptions::default(),
        &[target.clone()],
    );

    assert_eq!(
        captured.err,
        vec![
            format!(
                "[!] Error: Could not parse {} (Invalid DOS signature).",
                target.display()
            ),
            "Detected file type(s): ASCII text".to_string(),
            String::new(),
        ]
    );
    assert!(captured.out.is_empty());
    assert_eq!(captured.report.parse_failures, 1);
}

#[test]
fn test_fallback_joins_multiple_descriptions() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_file(dir.path(), "archive.zip", b"PK");
    let loader = FakeLoader::new().with_engine(
        EngineKind::FileType,
        FakeEngine::new(vec![
            SignatureMatch::new("zip").with_field("description", "ZIP archive"),
            SignatureMatch::new("jar_rule"),
        ]),
    );

    let captured = run(
        FakeParser::default(),
        loader,
        AnalysisOptions::default(),
        &[target],
    );
    assert_eq!(captured.err[1], "Detected file type(s): ZIP archive, jar_rule");
}

#[test]
fn test_fallback_engine_is_loaded_once_and_failure_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let targets = vec![
        write_file(dir.path(), "one.txt", b"1"),
        write_file(dir.path(), "two.txt", b"2"),
    ];
    let loader = FakeLoader::new();
    let loads = loader.loads.clone();

    let captured = run(
        FakeParser::default(),
        loader,
        AnalysisOptions::default(),
        &targets,
    );

    assert_eq!(loads.get(), 1);
    assert_eq!(captured.report.parse_failures, 2);
    assert!(captured.err.iter().all(|line| !line.starts_with("Detected")));
    // Diagnostic then blank line, per target
    assert_eq!(captured.err.len(), 4);
}

#[test]
fn test_fallback_skips_directories_and_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FakeEngine::new(vec![SignatureMatch::new("any")]);
    let scanned = engine.scanned.clone();
    let loader = FakeLoader::new().with_engine(EngineKind::FileType, engine);
    let loads = loader.loads.clone();

    let targets = vec![dir.path().to_path_buf(), dir.path().join("gone.exe")];
    let captured = run(
        FakeParser::default(),
        loader,
        AnalysisOptions::default(),
        &targets,
    );

    assert_eq!(captured.report.parse_failures, 2);
    assert_eq!(loads.get(), 0);
    assert!(scanned.borrow().is_empty());
}

#[test]
fn test_separators_between_analyzed_targets() {
    let targets: Vec<PathBuf> = ["a.exe", "b.exe", "c.exe"].iter().map(PathBuf::from).collect();
    let captured = run(
        FakeParser::accepting(&targets),
        FakeLoader::new(),
        AnalysisOptions::default(),
        &targets,
    );

    let separator = "-".repeat(80);
    assert_eq!(
        captured.out,
        vec![
            "[summary] a.exe".to_string(),
            separator.clone(),
            String::new(),
            "[summary] b.exe".to_string(),
            separator,
            String::new(),
            "[summary] c.exe".to_string(),
        ]
    );
}

#[test]
fn test_failed_dump_is_reported_and_batch_continues() {
    let targets = vec![PathBuf::from("a.exe"), PathBuf::from("b.exe")];
    let parser = FakeParser::accepting(&targets).failing("imports");
    let options = AnalysisOptions {
        extract: Some(PathBuf::from("out")),
        ..dump(&["imports,exports"])
    };

    let captured = run(parser, FakeLoader::new(), options, &targets);

    assert_eq!(captured.report.analyzed, 2);
    assert!(captured.out.contains(&"[exports] a.exe".to_string()));
    assert!(captured.out.contains(&"[exports] b.exe".to_string()));
    assert_eq!(captured.err.len(), 2);
    assert!(captured.err[0].starts_with("[!] Error: Could not dump imports of a.exe"));
}

#[test]
fn test_failed_extraction_is_reported() {
    let target = PathBuf::from("a.exe");
    let parser = FakeParser::accepting([&target]).failing("extract");
    let options = AnalysisOptions {
        extract: Some(PathBuf::from("/read-only")),
        hashes: true,
        ..Default::default()
    };

    let captured = run(parser, FakeLoader::new(), options, &[target]);

    assert_eq!(
        captured.err,
        vec!["[!] Error: Could not extract resources to /read-only (read-only file system)."]
    );
    assert_eq!(captured.out, vec!["[summary] a.exe", "[hashes] a.exe"]);
}

/// Output stream on a full disk.
struct FullDisk;

impl Write for FullDisk {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::WriteZero, "no space left on device"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_failed_output_write_ends_the_run_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_file(dir.path(), "a.exe", b"content");
    let orchestrator = Orchestrator::new(
        Box::new(FakeParser::accepting([target.clone()])),
        Box::new(FakeLoader::new()),
        RulePaths::default(),
        AnalysisOptions::default(),
    )
    .unwrap();

    let mut err = Vec::new();
    let result = orchestrator.run(&[target], &mut FullDisk, &mut err);

    let error = result.unwrap_err();
    assert!(matches!(error, AnalysisError::Io(_)));
    assert_eq!(error.exit_code(), EXIT_FAILURE);
}

#[test]
fn test_failed_write_during_dump_is_not_reported_as_a_dump_failure() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_file(dir.path(), "a.exe", b"content");
    let second = write_file(dir.path(), "b.exe", b"content");
    let parser = FakeParser::accepting([first.clone(), second.clone()]);
    let parsed = parser.parsed.clone();
    let orchestrator = Orchestrator::new(
        Box::new(parser),
        Box::new(FakeLoader::new()),
        RulePaths::default(),
        dump(&["imports,exports"]),
    )
    .unwrap();

    let mut err = Vec::new();
    let error = orchestrator
        .run(&[first, second], &mut FullDisk, &mut err)
        .unwrap_err();

    assert!(matches!(error, AnalysisError::Io(_)));
    assert!(err.is_empty(), "{:?}", lines(&err));
    assert_eq!(parsed.borrow().len(), 1);
}
