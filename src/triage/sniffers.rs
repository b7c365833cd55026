//! Content sniffing for extracted resources.
//!
//! Uses `infer` to recognise embedded payloads (images, archives, nested
//! executables) whose resource type says nothing about their format.

use tracing::debug;

/// What content sniffing found in a byte slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHint {
    pub mime: &'static str,
    pub extension: &'static str,
}

/// Sniffer for content-based file type detection using `infer`.
pub struct ContentSniffer;

impl ContentSniffer {
    /// Extension used when nothing better is known.
    pub const FALLBACK_EXTENSION: &'static str = "bin";

    /// Identify the content of a byte slice.
    pub fn sniff_bytes(data: &[u8]) -> Option<ContentHint> {
        let kind = infer::get(data)?;
        debug!(
            "Content detected as {} ({})",
            kind.mime_type(),
            kind.extension()
        );
        Some(ContentHint {
            mime: kind.mime_type(),
            extension: kind.extension(),
        })
    }

    /// File extension for `data`, `bin` if the content is not recognised.
    pub fn extension_for(data: &[u8]) -> &'static str {
        Self::sniff_bytes(data)
            .map(|hint| hint.extension)
            .unwrap_or(Self::FALLBACK_EXTENSION)
    }
}
