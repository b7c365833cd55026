//! Owned PE image model
//!
//! [`PeImage`] keeps the file bytes and parses the headers and section table
//! up front. Data directories are decoded from the owned bytes each time they
//! are asked for.

pub mod directories;
pub mod dump;
pub mod headers;
pub mod sections;
pub mod types;
pub mod utils;

use directories::*;
use headers::*;
use sections::*;
pub use types::*;
use utils::*;

/// A parsed PE image
#[derive(Debug, Clone)]
pub struct PeImage {
    data: Vec<u8>,
    dos_header: DosHeader,
    nt_headers: NtHeaders,
    data_directories: Vec<DataDirectory>,
    section_table: SectionTable,
    options: ParseOptions,
}

impl PeImage {
    /// Parse with default options
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        Self::with_options(data, ParseOptions::default())
    }

    /// Parse with custom options
    pub fn with_options(data: Vec<u8>, options: ParseOptions) -> Result<Self> {
        let dos_header = parse_dos_header(&data)?;

        let nt_offset = dos_header.e_lfanew as usize;
        let (nt_headers, data_directories) = parse_nt_headers(&data, nt_offset)?;

        let section_offset =
            nt_offset + 24 + nt_headers.file_header.size_of_optional_header as usize;
        let section_headers = parse_section_headers(
            &data,
            section_offset,
            nt_headers.file_header.number_of_sections,
        )?;
        let section_table = SectionTable::new(create_sections(section_headers));

        Ok(Self {
            data,
            dos_header,
            nt_headers,
            data_directories,
            section_table,
            options,
        })
    }

    // Header access methods

    /// Raw file bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn file_size(&self) -> usize {
        self.data.len()
    }

    pub fn dos_header(&self) -> &DosHeader {
        &self.dos_header
    }

    pub fn nt_headers(&self) -> &NtHeaders {
        &self.nt_headers
    }

    pub fn coff_header(&self) -> &CoffHeader {
        &self.nt_headers.file_header
    }

    pub fn optional_header(&self) -> &OptionalHeader {
        &self.nt_headers.optional_header
    }

    pub fn is_64bit(&self) -> bool {
        self.nt_headers.optional_header.is_64bit()
    }

    pub fn is_dll(&self) -> bool {
        self.nt_headers.file_header.is_dll()
    }

    pub fn machine(&self) -> Machine {
        self.nt_headers.file_header.machine
    }

    /// Link timestamp (seconds since the Unix epoch)
    pub fn timestamp(&self) -> u32 {
        self.nt_headers.file_header.time_date_stamp
    }

    pub fn entry_point(&self) -> u32 {
        self.nt_headers.optional_header.entry_point()
    }

    pub fn image_base(&self) -> u64 {
        self.nt_headers.optional_header.image_base()
    }

    pub fn subsystem(&self) -> Subsystem {
        self.nt_headers.optional_header.subsystem()
    }

    // Section access methods

    /// Sections in declaration order
    pub fn sections(&self) -> &[Section] {
        self.section_table.sections()
    }

    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.section_table.section_by_name(name)
    }

    /// Name of the section holding the entry point
    pub fn entry_section(&self) -> Option<String> {
        self.section_table
            .entry_section(self.entry_point())
            .map(|s| s.header.name())
    }

    /// File bytes past the last section's raw data
    pub fn overlay(&self) -> Option<&[u8]> {
        let end = self
            .sections()
            .iter()
            .map(|s| s.data.end)
            .max()
            .unwrap_or(0);
        (end > 0 && end < self.data.len()).then(|| &self.data[end..])
    }

    // Data directories

    pub fn data_directories(&self) -> &[DataDirectory] {
        &self.data_directories
    }

    pub fn data_directory(&self, index: usize) -> Result<&DataDirectory> {
        self.data_directories
            .get(index)
            .ok_or(PeError::DataDirectoryNotFound { index })
    }

    /// Whether the directory slot is populated
    pub fn has_directory(&self, index: usize) -> bool {
        self.data_directory(index)
            .map(DataDirectory::is_present)
            .unwrap_or(false)
    }

    pub fn imports(&self) -> Result<ImportTable<'_>> {
        parse_imports(
            &self.data,
            &self.section_table,
            self.data_directory(IMAGE_DIRECTORY_ENTRY_IMPORT)?,
            self.data_directory(IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT)?,
            self.image_base(),
            self.is_64bit(),
            &self.options,
        )
    }

    pub fn exports(&self) -> Result<ExportTable<'_>> {
        parse_exports(
            &self.data,
            &self.section_table,
            self.data_directory(IMAGE_DIRECTORY_ENTRY_EXPORT)?,
            &self.options,
        )
    }

    /// Import hash (imphash)
    pub fn import_hash(&self) -> Result<String> {
        Ok(self.imports()?.import_hash())
    }

    /// Flattened resource tree
    pub fn resources(&self) -> Result<Vec<ResourceEntry>> {
        parse_resources(
            &self.data,
            &self.section_table,
            self.data_directory(IMAGE_DIRECTORY_ENTRY_RESOURCE)?,
            &self.options,
        )
    }

    /// Bytes of one resource, when they are backed by the file
    pub fn resource_data(&self, entry: &ResourceEntry) -> Option<&[u8]> {
        entry.data.clone().and_then(|range| self.data.get(range))
    }

    /// Decoded version resource, if the image carries one
    pub fn version_info(&self) -> Result<Option<VersionInfo>> {
        let resources = self.resources()?;
        let Some(entry) = resources
            .iter()
            .find(|r| r.kind == ResourceId::Id(resource::RT_VERSION))
        else {
            return Ok(None);
        };
        let blob = self
            .resource_data(entry)
            .ok_or(PeError::InvalidRva { rva: entry.rva })?;
        parse_version_info(blob).map(Some)
    }

    pub fn debug_entries(&self) -> Result<Vec<DebugEntry>> {
        parse_debug_directory(
            &self.data,
            &self.section_table,
            self.data_directory(IMAGE_DIRECTORY_ENTRY_DEBUG)?,
        )
    }

    pub fn tls(&self) -> Result<Option<TlsDirectory>> {
        parse_tls_directory(
            &self.data,
            &self.section_table,
            self.data_directory(IMAGE_DIRECTORY_ENTRY_TLS)?,
            self.image_base(),
            self.is_64bit(),
            &self.options,
        )
    }

    pub fn relocations(&self) -> Result<Vec<RelocationBlock>> {
        parse_relocations(
            &self.data,
            &self.section_table,
            self.data_directory(IMAGE_DIRECTORY_ENTRY_BASERELOC)?,
            &self.options,
        )
    }

    pub fn certificates(&self) -> Result<Vec<Certificate>> {
        parse_certificates(
            &self.data,
            self.data_directory(IMAGE_DIRECTORY_ENTRY_SECURITY)?,
        )
    }

    // Security features

    pub fn security_features(&self) -> SecurityFeatures {
        parse_security_features(self.nt_headers.optional_header.dll_characteristics())
    }

    /// Check if file is signed (has certificate table)
    pub fn is_signed(&self) -> bool {
        self.has_directory(IMAGE_DIRECTORY_ENTRY_SECURITY)
    }

    /// Check if file is .NET/CLR
    pub fn is_dotnet(&self) -> bool {
        self.has_directory(IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR)
    }

    /// Checksum recomputed over the file bytes
    pub fn computed_checksum(&self) -> u32 {
        // CheckSum sits 64 bytes into the optional header in both layouts
        let checksum_offset = self.dos_header.e_lfanew as usize + 24 + 64;
        calculate_pe_checksum(&self.data, checksum_offset)
    }

    /// A zero stored checksum is never checked by the loader
    pub fn checksum_valid(&self) -> bool {
        let stored = self.nt_headers.optional_header.checksum();
        stored == 0 || stored == self.computed_checksum()
    }

    // Utilities

    pub fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        self.section_table.rva_to_offset(rva)
    }

    pub fn offset_to_rva(&self, offset: usize) -> Option<u32> {
        self.section_table.offset_to_rva(offset)
    }
}
