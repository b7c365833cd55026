//! Batch static analysis of PE images.
//!
//! The [`triage`] module drives a run; [`formats::pe`] is the PE parser and
//! text renderer it uses.

pub mod error;
pub mod formats;
pub mod hashing;
pub mod logging;
pub mod triage;

pub use error::{AnalysisError, Result};
