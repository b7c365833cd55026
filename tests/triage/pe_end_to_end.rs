//! Full pipeline: synthetic PE files, the PE parser and `yara-x` rules.

use std::fs;
use std::path::{Path, PathBuf};

use pescan::formats::pe::ParseOptions;
use pescan::triage::config::RulePaths;
use pescan::triage::dispatch::dump_categories;
use pescan::triage::io::IOLimits;
use pescan::triage::{
    AnalysisOptions, DumpCategorySet, Orchestrator, PeImageParser, RunReport, YaraLoader,
};

use crate::common::pe_builder::PeBuilder;
use crate::common::rules::{MAGIC_RULES, MALWARE_RULES, PACKER_RULES};
use crate::common::test_utils::{lines, write_file, write_rules};

const TITLES: [&str; 12] = [
    "DOS Header",
    "PE Header",
    "Image Optional Header",
    "Sections",
    "Imports",
    "Exports",
    "Resources",
    "Version Info",
    "Debug Info",
    "Relocations",
    "TLS Callbacks",
    "Certificates",
];

fn analyze(
    rules: RulePaths,
    options: AnalysisOptions,
    targets: &[PathBuf],
) -> (RunReport, Vec<String>, Vec<String>) {
    let orchestrator = Orchestrator::new(
        Box::new(PeImageParser::default()),
        Box::new(YaraLoader::default()),
        rules,
        options,
    )
    .unwrap();
    let mut out = Vec::new();
    let mut err = Vec::new();
    let report = orchestrator.run(targets, &mut out, &mut err).unwrap();
    (report, lines(&out), lines(&err))
}

/// Titles of the blocks in `out`: a line followed by an `=` underline.
fn block_titles(out: &[String]) -> Vec<&str> {
    out.windows(2)
        .filter(|pair| !pair[1].is_empty() && pair[1].chars().all(|c| c == '='))
        .map(|pair| pair[0].as_str())
        .collect()
}

fn rules_in(dir: &Path) -> RulePaths {
    write_rules(dir, PACKER_RULES, MALWARE_RULES, MAGIC_RULES)
}

#[test]
fn test_imports_then_exports() {
    let dir = tempfile::tempdir().unwrap();
    let sample = write_file(dir.path(), "sample.exe", &PeBuilder::full().build());
    let options = AnalysisOptions {
        dump: Some(DumpCategorySet::from_tokens(["exports,imports"])),
        ..Default::default()
    };

    let (report, out, err) = analyze(rules_in(dir.path()), options, &[sample]);

    assert_eq!(report.analyzed, 1);
    assert!(err.is_empty(), "unexpected diagnostics: {:?}", err);
    assert_eq!(block_titles(&out), vec!["Imports", "Exports"]);
    assert!(out.iter().any(|line| line.trim() == "KERNEL32.dll"));
    assert!(out.iter().any(|line| line.trim() == "ExitProcess"));
    assert!(out.iter().any(|line| line.ends_with("Hello")));
    assert!(!out.iter().any(|line| line.contains("signature(s)")));
}

#[test]
fn test_all_categories_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let sample = write_file(dir.path(), "sample.exe", &PeBuilder::full().build());
    let options = AnalysisOptions {
        dump: Some(DumpCategorySet::from_tokens(["all"])),
        ..Default::default()
    };

    let (_, out, err) = analyze(rules_in(dir.path()), options, &[sample]);

    assert!(err.is_empty(), "unexpected diagnostics: {:?}", err);
    assert_eq!(block_titles(&out), TITLES.to_vec());
}

#[test]
fn test_summary_hashes_and_signatures() {
    let dir = tempfile::tempdir().unwrap();
    let sample = write_file(dir.path(), "packed.exe", &PeBuilder::full().build());
    let options = AnalysisOptions {
        hashes: true,
        packer: true,
        malware: true,
        ..Default::default()
    };

    let (_, out, err) = analyze(rules_in(dir.path()), options, &[sample]);

    assert!(err.is_empty(), "unexpected diagnostics: {:?}", err);
    assert_eq!(block_titles(&out), vec!["Summary", "Hashes"]);

    let packer = out
        .iter()
        .position(|line| line == "Packer/compiler signature(s):")
        .unwrap();
    assert_eq!(out[packer + 1], "\tTest Packer 1.0");
    let malware = out
        .iter()
        .position(|line| line == "Malware signature(s):")
        .unwrap();
    assert!(malware > packer);
    assert_eq!(out[malware + 1], "\tTest.Signature");
}

#[test]
fn test_text_file_falls_back_to_file_type_rules() {
    let dir = tempfile::tempdir().unwrap();
    let text = write_file(
        dir.path(),
        "notexecutable.txt",
        b"This is a plain text file, long enough to hold a whole DOS header.\n",
    );

    let (report, out, err) = analyze(
        rules_in(dir.path()),
        AnalysisOptions::default(),
        &[text.clone()],
    );

    assert_eq!(report.parse_failures, 1);
    assert!(out.is_empty());
    assert_eq!(
        err[0],
        format!(
            "[!] Error: Could not parse {} (Invalid DOS signature).",
            text.display()
        )
    );
    assert_eq!(err[1], "Detected file type(s): ASCII text");
    assert_eq!(err[2], "");
}

#[test]
fn test_mixed_batch_with_missing_fallback_rules() {
    let dir = tempfile::tempdir().unwrap();
    let rules = RulePaths::in_dir(&dir.path().join("no-rules"));
    let targets = vec![
        write_file(dir.path(), "a.exe", &PeBuilder::new().build()),
        write_file(dir.path(), "b.bin", &[0u8; 64]),
        write_file(dir.path(), "c.dll", &PeBuilder::new().dll().with_exports().build()),
    ];

    let (report, out, err) = analyze(rules, AnalysisOptions::default(), &targets);

    assert_eq!(
        report,
        RunReport {
            attempted: 3,
            analyzed: 2,
            parse_failures: 1
        }
    );
    assert_eq!(block_titles(&out), vec!["Summary", "Summary"]);
    assert_eq!(err.len(), 2);
    assert!(err[0].contains("b.bin"));
}

#[test]
fn test_resource_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = b"<assembly manifestVersion=\"1.0\"/>";
    let sample = write_file(
        dir.path(),
        "sample.exe",
        &PeBuilder::new().with_manifest(manifest).build(),
    );
    let out_dir = dir.path().join("extracted");
    let options = AnalysisOptions {
        extract: Some(out_dir.clone()),
        ..Default::default()
    };

    let (_, _, err) = analyze(rules_in(dir.path()), options, &[sample]);

    assert!(err.is_empty(), "unexpected diagnostics: {:?}", err);
    let written = fs::read(out_dir.join("RT_MANIFEST_1_0409.xml")).unwrap();
    assert_eq!(written, manifest);
}

#[test]
fn test_resource_dump_with_hashes() {
    let dir = tempfile::tempdir().unwrap();
    let sample = write_file(dir.path(), "sample.exe", &PeBuilder::full().build());
    let options = AnalysisOptions {
        dump: Some(DumpCategorySet::from_tokens(["resources"])),
        hashes: true,
        ..Default::default()
    };

    let (_, out, _) = analyze(rules_in(dir.path()), options, &[sample]);

    assert_eq!(block_titles(&out), vec!["Resources", "Hashes"]);
    assert!(out.iter().any(|line| line.trim_start().starts_with("RT_MANIFEST/1/")));
    assert!(out.iter().any(|line| line.trim_start().starts_with("SHA-256:")));
}

#[test]
fn test_relocation_page_at_top_of_address_space() {
    let dir = tempfile::tempdir().unwrap();
    let targets = vec![
        write_file(
            dir.path(),
            "wrapping.exe",
            &PeBuilder::new()
                .with_relocation_block(0xFFFF_FFFF, &[0x3001])
                .build(),
        ),
        write_file(
            dir.path(),
            "regular.exe",
            &PeBuilder::new()
                .with_relocation_block(0x1000, &[0x3010])
                .build(),
        ),
    ];
    let options = AnalysisOptions {
        dump: Some(DumpCategorySet::from_tokens(["relocations"])),
        ..Default::default()
    };

    let (report, out, err) = analyze(rules_in(dir.path()), options, &targets);

    assert!(err.is_empty(), "unexpected diagnostics: {:?}", err);
    assert_eq!(
        report,
        RunReport {
            attempted: 2,
            analyzed: 2,
            parse_failures: 0
        }
    );
    assert_eq!(block_titles(&out), vec!["Relocations", "Relocations"]);
    assert!(out.iter().any(|line| line.trim() == "<overflow>  HIGHLOW"));
    assert!(out.iter().any(|line| line.trim() == "0x00001010  HIGHLOW"));
}

#[test]
fn test_file_over_read_limit_is_not_analyzed_partially() {
    let dir = tempfile::tempdir().unwrap();
    let image = PeBuilder::full().build();
    let sample = write_file(dir.path(), "large.exe", &image);
    let limits = IOLimits {
        max_read_bytes: image.len() as u64 / 2,
        max_file_size: image.len() as u64 * 2,
    };
    let options = AnalysisOptions {
        hashes: true,
        packer: true,
        ..Default::default()
    };

    let orchestrator = Orchestrator::new(
        Box::new(PeImageParser::new(limits.clone(), ParseOptions::default())),
        Box::new(YaraLoader::new(limits)),
        rules_in(dir.path()),
        options,
    )
    .unwrap();
    let mut out = Vec::new();
    let mut err = Vec::new();
    let report = orchestrator.run(&[sample.clone()], &mut out, &mut err).unwrap();

    assert_eq!(report.parse_failures, 1);
    assert!(out.is_empty(), "partial analysis: {:?}", lines(&out));
    let err = lines(&err);
    assert!(err[0].contains("exceeds read limit"), "{:?}", err);
    assert!(!err.iter().any(|line| line.starts_with("Detected file type(s)")));
}

#[test]
fn test_in_memory_image_dumps_every_category() {
    let parser = PeImageParser::new(IOLimits::default(), ParseOptions::default());
    let image = parser
        .parse_bytes(Path::new("memory.exe"), PeBuilder::full().build())
        .unwrap();

    let mut out = Vec::new();
    let mut err = Vec::new();
    let failures =
        dump_categories(image.as_ref(), &DumpCategorySet::all(), true, &mut out, &mut err)
            .unwrap();

    assert_eq!(failures, 0);
    assert!(err.is_empty());
    assert_eq!(block_titles(&lines(&out)), TITLES.to_vec());
}
