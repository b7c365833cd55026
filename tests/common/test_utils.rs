//! Shared test utilities for creating temporary files and directories.

use pescan::triage::config::RulePaths;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Creates a temporary file with the given content.
///
/// The file is removed when the returned `NamedTempFile` is dropped.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file
}

/// Creates a temporary file with a specific size filled with one byte value.
pub fn create_temp_file_with_size(size: usize, pattern: u8) -> NamedTempFile {
    create_temp_file(&vec![pattern; size])
}

/// Writes `content` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Writes the three rule files into `dir` and returns their paths.
pub fn write_rules(dir: &Path, packer: &str, malware: &str, magic: &str) -> RulePaths {
    let rules = RulePaths::in_dir(dir);
    fs::write(&rules.packer, packer).unwrap();
    fs::write(&rules.malware, malware).unwrap();
    fs::write(&rules.file_type, magic).unwrap();
    rules
}

/// Lines of captured output.
pub fn lines(buffer: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(buffer)
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_temp_file() {
        let temp_file = create_temp_file(b"hello world");
        assert_eq!(fs::read(temp_file.path()).unwrap(), b"hello world");
    }

    #[test]
    fn test_create_temp_file_with_size() {
        let temp_file = create_temp_file_with_size(1024, 0xAA);
        let content = fs::read(temp_file.path()).unwrap();
        assert_eq!(content.len(), 1024);
        assert!(content.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn test_write_rules() {
        let dir = tempfile::tempdir().unwrap();
        let rules = write_rules(dir.path(), "a", "b", "c");
        assert_eq!(fs::read_to_string(&rules.packer).unwrap(), "a");
        assert_eq!(fs::read_to_string(&rules.file_type).unwrap(), "c");
    }
}
