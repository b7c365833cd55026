//! Batch analysis runtime.
//!
//! Discovery turns command line inputs into targets, the orchestrator runs
//! each target through the image parser, the requested dumps and the
//! signature engines.

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod image;
pub mod io;
pub mod orchestrator;
pub mod signatures;
pub mod sniffers;

pub use config::AnalysisConfig;
pub use discovery::{resolve_targets, validate_inputs};
pub use dispatch::{DumpCategory, DumpCategorySet};
pub use image::{ImageParser, ParsedImage, PeImageParser};
pub use orchestrator::{AnalysisOptions, Orchestrator, RunReport};
pub use signatures::{EngineKind, EngineLoader, SignatureEngine, SignatureMatch, YaraLoader};
