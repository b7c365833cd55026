//! Data directory parsers

pub mod certificate;
pub mod debug;
pub mod export;
pub mod import;
pub mod reloc;
pub mod resource;
pub mod tls;
pub mod version;

pub use certificate::parse_certificates;
pub use debug::parse_debug_directory;
pub use export::{parse_exports, ExportTable};
pub use import::{parse_imports, ImportTable};
pub use reloc::parse_relocations;
pub use resource::parse_resources;
pub use tls::parse_tls_directory;
pub use version::parse_version_info;
