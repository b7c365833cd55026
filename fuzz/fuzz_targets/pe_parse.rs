#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io;
use std::path::Path;

use pescan::triage::dispatch::{dump_categories, DumpCategorySet};
use pescan::triage::PeImageParser;

fuzz_target!(|data: &[u8]| {
    let parser = PeImageParser::default();
    let Ok(image) = parser.parse_bytes(Path::new("fuzz-input"), data.to_vec()) else {
        return;
    };
    let mut out = io::sink();
    let mut err = io::sink();
    let _ = image.dump_summary(&mut out);
    let _ = dump_categories(image.as_ref(), &DumpCategorySet::all(), true, &mut out, &mut err);
    let _ = image.dump_hashes(&mut out);
});
