//! Core PE data types and structures

use bitflags::bitflags;
use std::fmt;
use std::ops::Range;

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32PLUS_MAGIC: u16 = 0x20B;

// Data directory indices
pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;
pub const IMAGE_DIRECTORY_ENTRY_RESOURCE: usize = 2;
pub const IMAGE_DIRECTORY_ENTRY_EXCEPTION: usize = 3;
pub const IMAGE_DIRECTORY_ENTRY_SECURITY: usize = 4;
pub const IMAGE_DIRECTORY_ENTRY_BASERELOC: usize = 5;
pub const IMAGE_DIRECTORY_ENTRY_DEBUG: usize = 6;
pub const IMAGE_DIRECTORY_ENTRY_ARCHITECTURE: usize = 7;
pub const IMAGE_DIRECTORY_ENTRY_GLOBALPTR: usize = 8;
pub const IMAGE_DIRECTORY_ENTRY_TLS: usize = 9;
pub const IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG: usize = 10;
pub const IMAGE_DIRECTORY_ENTRY_BOUND_IMPORT: usize = 11;
pub const IMAGE_DIRECTORY_ENTRY_IAT: usize = 12;
pub const IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT: usize = 13;
pub const IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR: usize = 14;

/// Display names of the 16 data directory slots.
pub const DATA_DIRECTORY_NAMES: [&str; 16] = [
    "Export",
    "Import",
    "Resource",
    "Exception",
    "Security",
    "BaseReloc",
    "Debug",
    "Architecture",
    "GlobalPtr",
    "TLS",
    "LoadConfig",
    "BoundImport",
    "IAT",
    "DelayImport",
    "COMDescriptor",
    "Reserved",
];

bitflags! {
    /// COFF file header characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileCharacteristics: u16 {
        const RELOCS_STRIPPED = 0x0001;
        const EXECUTABLE_IMAGE = 0x0002;
        const LINE_NUMS_STRIPPED = 0x0004;
        const LOCAL_SYMS_STRIPPED = 0x0008;
        const AGGRESSIVE_WS_TRIM = 0x0010;
        const LARGE_ADDRESS_AWARE = 0x0020;
        const BYTES_REVERSED_LO = 0x0080;
        const MACHINE_32BIT = 0x0100;
        const DEBUG_STRIPPED = 0x0200;
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;
        const NET_RUN_FROM_SWAP = 0x0800;
        const SYSTEM = 0x1000;
        const DLL = 0x2000;
        const UP_SYSTEM_ONLY = 0x4000;
        const BYTES_REVERSED_HI = 0x8000;
    }
}

bitflags! {
    /// Optional header DLL characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DllCharacteristics: u16 {
        const HIGH_ENTROPY_VA = 0x0020;
        const DYNAMIC_BASE = 0x0040;
        const FORCE_INTEGRITY = 0x0080;
        const NX_COMPAT = 0x0100;
        const NO_ISOLATION = 0x0200;
        const NO_SEH = 0x0400;
        const NO_BIND = 0x0800;
        const APPCONTAINER = 0x1000;
        const WDM_DRIVER = 0x2000;
        const GUARD_CF = 0x4000;
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}

bitflags! {
    /// Section header characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionCharacteristics: u32 {
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const LNK_INFO = 0x0000_0200;
        const LNK_REMOVE = 0x0000_0800;
        const LNK_COMDAT = 0x0000_1000;
        const GPREL = 0x0000_8000;
        const LNK_NRELOC_OVFL = 0x0100_0000;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_NOT_CACHED = 0x0400_0000;
        const MEM_NOT_PAGED = 0x0800_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}

/// Names of the known flags set in a bitflags value, in declaration order.
pub fn flag_names<B: bitflags::Flags>(flags: &B) -> Vec<&'static str> {
    flags.iter_names().map(|(name, _)| name).collect()
}

/// Errors raised while parsing a PE image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeError {
    #[error("Invalid DOS signature")]
    InvalidDosSignature,
    #[error("Invalid PE signature")]
    InvalidPeSignature,
    #[error("Invalid optional header magic: 0x{0:04x}")]
    InvalidMagic(u16),
    #[error("Truncated header: expected {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },
    #[error("Invalid RVA: 0x{rva:08x}")]
    InvalidRva { rva: u32 },
    #[error("Invalid file offset: 0x{offset:x}")]
    InvalidOffset { offset: usize },
    #[error("Malformed import table")]
    MalformedImportTable,
    #[error("Malformed export table")]
    MalformedExportTable,
    #[error("Malformed resource directory")]
    MalformedResourceDirectory,
    #[error("Resource directory nested too deeply")]
    ResourceDepthExceeded,
    #[error("Malformed version information")]
    MalformedVersionInfo,
    #[error("Malformed debug directory")]
    MalformedDebugDirectory,
    #[error("Malformed TLS directory")]
    MalformedTlsDirectory,
    #[error("Malformed base relocation table")]
    MalformedRelocations,
    #[error("Malformed certificate table")]
    MalformedCertificateTable,
    #[error("Data directory {index} is absent")]
    DataDirectoryNotFound { index: usize },
    #[error("Too many {0}")]
    LimitExceeded(&'static str),
    #[error("Invalid string encoding")]
    InvalidString,
    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, PeError>;

/// Machine types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    Unknown,
    I386,   // 0x014c
    X86_64, // 0x8664
    Arm,    // 0x01c0
    Arm64,  // 0xaa64
    ArmNT,  // 0x01c4
    IA64,   // 0x0200
    EBC,    // 0x0ebc
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Self::I386,
            0x8664 => Self::X86_64,
            0x01c0 => Self::Arm,
            0xaa64 => Self::Arm64,
            0x01c4 => Self::ArmNT,
            0x0200 => Self::IA64,
            0x0ebc => Self::EBC,
            0 => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::I386 => write!(f, "x86"),
            Self::X86_64 => write!(f, "x86-64"),
            Self::Arm => write!(f, "ARM"),
            Self::Arm64 => write!(f, "ARM64"),
            Self::ArmNT => write!(f, "ARM Thumb-2"),
            Self::IA64 => write!(f, "IA-64"),
            Self::EBC => write!(f, "EFI byte code"),
            Self::Other(m) => write!(f, "0x{:04x}", m),
        }
    }
}

/// Subsystem types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Unknown,
    Native,                 // 1
    WindowsGui,             // 2
    WindowsCui,             // 3
    Os2Cui,                 // 5
    PosixCui,               // 7
    WindowsCeGui,           // 9
    EfiApplication,         // 10
    EfiBootServiceDriver,   // 11
    EfiRuntimeDriver,       // 12
    EfiRom,                 // 13
    Xbox,                   // 14
    WindowsBootApplication, // 16
    Other(u16),
}

impl From<u16> for Subsystem {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Native,
            2 => Self::WindowsGui,
            3 => Self::WindowsCui,
            5 => Self::Os2Cui,
            7 => Self::PosixCui,
            9 => Self::WindowsCeGui,
            10 => Self::EfiApplication,
            11 => Self::EfiBootServiceDriver,
            12 => Self::EfiRuntimeDriver,
            13 => Self::EfiRom,
            14 => Self::Xbox,
            16 => Self::WindowsBootApplication,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Native => "Native",
            Self::WindowsGui => "Windows GUI",
            Self::WindowsCui => "Windows console",
            Self::Os2Cui => "OS/2 console",
            Self::PosixCui => "POSIX console",
            Self::WindowsCeGui => "Windows CE GUI",
            Self::EfiApplication => "EFI application",
            Self::EfiBootServiceDriver => "EFI boot service driver",
            Self::EfiRuntimeDriver => "EFI runtime driver",
            Self::EfiRom => "EFI ROM",
            Self::Xbox => "Xbox",
            Self::WindowsBootApplication => "Windows boot application",
            Self::Other(v) => return write!(f, "{}", v),
        };
        f.write_str(name)
    }
}

/// DOS header (64 bytes)
#[derive(Debug, Clone, Copy)]
pub struct DosHeader {
    pub e_magic: u16,    // Magic number (MZ)
    pub e_cblp: u16,     // Bytes on last page of file
    pub e_cp: u16,       // Pages in file
    pub e_crlc: u16,     // Relocations
    pub e_cparhdr: u16,  // Size of header in paragraphs
    pub e_minalloc: u16, // Minimum extra paragraphs needed
    pub e_maxalloc: u16, // Maximum extra paragraphs needed
    pub e_ss: u16,       // Initial (relative) SS value
    pub e_sp: u16,       // Initial SP value
    pub e_csum: u16,     // Checksum
    pub e_ip: u16,       // Initial IP value
    pub e_cs: u16,       // Initial (relative) CS value
    pub e_lfarlc: u16,   // File address of relocation table
    pub e_ovno: u16,     // Overlay number
    pub e_oemid: u16,    // OEM identifier
    pub e_oeminfo: u16,  // OEM information
    pub e_lfanew: u32,   // File address of PE header
}

/// COFF header (20 bytes)
#[derive(Debug, Clone, Copy)]
pub struct CoffHeader {
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    pub fn flags(&self) -> FileCharacteristics {
        FileCharacteristics::from_bits_truncate(self.characteristics)
    }

    pub fn is_dll(&self) -> bool {
        self.flags().contains(FileCharacteristics::DLL)
    }
}

/// Data directory entry
#[derive(Debug, Clone, Copy, Default)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size > 0
    }
}

/// Optional header - common fields
#[derive(Debug, Clone)]
pub struct OptionalHeaderCommon {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
}

/// Fields shared by PE32 and PE32+ after the image base, widened to 64 bits.
#[derive(Debug, Clone)]
pub struct OptionalHeaderWindows {
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: Subsystem,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

/// Combined optional header enum
#[derive(Debug, Clone)]
pub enum OptionalHeader {
    Pe32 {
        common: OptionalHeaderCommon,
        base_of_data: u32,
        windows: OptionalHeaderWindows,
    },
    Pe32Plus {
        common: OptionalHeaderCommon,
        windows: OptionalHeaderWindows,
    },
}

impl OptionalHeader {
    pub fn common(&self) -> &OptionalHeaderCommon {
        match self {
            Self::Pe32 { common, .. } | Self::Pe32Plus { common, .. } => common,
        }
    }

    pub fn windows(&self) -> &OptionalHeaderWindows {
        match self {
            Self::Pe32 { windows, .. } | Self::Pe32Plus { windows, .. } => windows,
        }
    }

    pub fn base_of_data(&self) -> Option<u32> {
        match self {
            Self::Pe32 { base_of_data, .. } => Some(*base_of_data),
            Self::Pe32Plus { .. } => None,
        }
    }

    pub fn magic(&self) -> u16 {
        self.common().magic
    }

    pub fn entry_point(&self) -> u32 {
        self.common().address_of_entry_point
    }

    pub fn image_base(&self) -> u64 {
        self.windows().image_base
    }

    pub fn subsystem(&self) -> Subsystem {
        self.windows().subsystem
    }

    pub fn dll_characteristics(&self) -> DllCharacteristics {
        DllCharacteristics::from_bits_truncate(self.windows().dll_characteristics)
    }

    pub fn checksum(&self) -> u32 {
        self.windows().checksum
    }

    pub fn number_of_rva_and_sizes(&self) -> u32 {
        self.windows().number_of_rva_and_sizes
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, Self::Pe32Plus { .. })
    }
}

/// NT headers (PE signature + COFF + Optional)
#[derive(Debug, Clone)]
pub struct NtHeaders {
    pub signature: [u8; 4],
    pub file_header: CoffHeader,
    pub optional_header: OptionalHeader,
}

/// Section header
#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_line_numbers: u32,
    pub number_of_relocations: u16,
    pub number_of_line_numbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).to_string()
    }

    pub fn flags(&self) -> SectionCharacteristics {
        SectionCharacteristics::from_bits_truncate(self.characteristics)
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        let size = self.virtual_size.max(self.size_of_raw_data);
        rva >= self.virtual_address && (rva - self.virtual_address) < size
    }

    pub fn is_executable(&self) -> bool {
        self.flags().contains(SectionCharacteristics::MEM_EXECUTE)
    }

    pub fn is_writable(&self) -> bool {
        self.flags().contains(SectionCharacteristics::MEM_WRITE)
    }
}

/// Section with data reference
#[derive(Debug, Clone)]
pub struct Section {
    pub header: SectionHeader,
    pub data: Range<usize>, // Range in file
}

/// Import descriptor
#[derive(Debug, Clone)]
pub struct ImportDescriptor<'a> {
    pub dll_name: &'a str,
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    pub first_thunk: u32,
    pub delay_load: bool,
    pub entries: Vec<ImportEntry<'a>>,
}

/// Import entry
#[derive(Debug, Clone)]
pub struct ImportEntry<'a> {
    pub name: Option<&'a str>,
    pub ordinal: Option<u16>,
    pub hint: Option<u16>,
    pub iat_va: u64,
}

/// Export entry
#[derive(Debug, Clone)]
pub struct ExportEntry<'a> {
    pub name: Option<&'a str>,
    pub ordinal: u32,
    pub rva: u32,
    pub forwarder: Option<&'a str>,
}

/// Security features
#[derive(Debug, Clone, Default)]
pub struct SecurityFeatures {
    pub nx_compatible: bool,
    pub aslr_enabled: bool,
    pub cfg_enabled: bool,
    pub seh_enabled: bool,
    pub high_entropy_va: bool,
    pub force_integrity: bool,
    pub appcontainer: bool,
}

/// Parse options
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub max_resource_depth: usize,
    pub max_resources: usize,
    pub max_imports: usize,
    pub max_exports: usize,
    pub max_relocation_blocks: usize,
    pub max_tls_callbacks: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_resource_depth: 3,
            max_resources: 10000,
            max_imports: 10000,
            max_exports: 10000,
            max_relocation_blocks: 100000,
            max_tls_callbacks: 256,
        }
    }
}

/// Debug directory entry
#[derive(Debug, Clone)]
pub struct DebugEntry {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub debug_type: u32,
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub codeview: Option<CodeViewInfo>,
}

/// CodeView record referenced by a debug entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeViewInfo {
    /// `RSDS` (PDB 7.0) or `NB10` (PDB 2.0)
    pub signature: String,
    /// GUID for RSDS records, timestamp signature for NB10
    pub guid: String,
    pub age: u32,
    pub pdb_path: String,
}

/// TLS directory
#[derive(Debug, Clone)]
pub struct TlsDirectory {
    pub start_address_of_raw_data: u64,
    pub end_address_of_raw_data: u64,
    pub address_of_index: u64,
    pub address_of_callbacks: u64,
    pub size_of_zero_fill: u32,
    pub characteristics: u32,
    pub callbacks: Vec<u64>,
}

/// Certificate/Authenticode entry
#[derive(Debug, Clone)]
pub struct Certificate {
    pub offset: u32,
    pub length: u32,
    pub revision: u16,
    pub certificate_type: u16,
    pub data: Vec<u8>,
}

/// Resource ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceId {
    Name(String),
    Id(u32),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Id(id) => write!(f, "{}", id),
        }
    }
}

/// A leaf of the resource tree: one type/name/language triple and its data
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub kind: ResourceId,
    pub name: ResourceId,
    pub language: u32,
    pub code_page: u32,
    pub rva: u32,
    pub size: u32,
    /// Range in file, `None` when the data RVA does not map into a section
    pub data: Option<Range<usize>>,
}

/// One block of base relocations
#[derive(Debug, Clone)]
pub struct RelocationBlock {
    pub page_rva: u32,
    pub block_size: u32,
    pub entries: Vec<RelocationEntry>,
}

impl RelocationBlock {
    /// RVA patched by `entry`, or `None` when the page is too close to the
    /// top of the address space to hold it.
    pub fn target_rva(&self, entry: &RelocationEntry) -> Option<u32> {
        self.page_rva.checked_add(u32::from(entry.offset))
    }
}

/// Single base relocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    pub kind: u8,
    pub offset: u16,
}

/// VS_FIXEDFILEINFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedFileInfo {
    pub file_version: [u16; 4],
    pub product_version: [u16; 4],
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
}

/// One StringTable of a StringFileInfo block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStringTable {
    /// Eight hex digits: language then code page
    pub key: String,
    pub strings: Vec<(String, String)>,
}

/// Decoded VS_VERSIONINFO resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub fixed: Option<FixedFileInfo>,
    pub string_tables: Vec<VersionStringTable>,
    pub translations: Vec<(u16, u16)>,
}

impl VersionInfo {
    /// First value recorded under `key` in any string table.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.string_tables
            .iter()
            .flat_map(|t| t.strings.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
