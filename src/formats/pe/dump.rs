//! Text rendering of PE structures
//!
//! Each function writes one titled block of aligned `key: value` lines
//! followed by a blank line. Nothing here mutates the image.

use std::fmt::Display;
use std::io::Write;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::formats::pe::directories::{certificate, debug, reloc, resource};
use crate::formats::pe::types::*;
use crate::formats::pe::PeImage;
use crate::hashing::{sha256_digest, FileHashes};

const KEY_WIDTH: usize = 30;
const SUB_KEY_WIDTH: usize = 14;

fn title(out: &mut dyn Write, text: &str) -> Result<()> {
    writeln!(out, "{}", text)?;
    writeln!(out, "{}", "=".repeat(text.len()))?;
    Ok(())
}

fn field(out: &mut dyn Write, key: &str, value: impl Display) -> Result<()> {
    writeln!(out, "  {:<w$}{}", format!("{}:", key), value, w = KEY_WIDTH)?;
    Ok(())
}

fn subfield(out: &mut dyn Write, key: &str, value: impl Display) -> Result<()> {
    writeln!(out, "    {:<w$}{}", format!("{}:", key), value, w = SUB_KEY_WIDTH)?;
    Ok(())
}

fn end_block(out: &mut dyn Write) -> Result<()> {
    writeln!(out)?;
    Ok(())
}

/// UTC rendering of a PE timestamp; zero means the linker left it unset.
pub fn format_timestamp(timestamp: u32) -> String {
    match DateTime::<Utc>::from_timestamp(timestamp as i64, 0) {
        Some(dt) if timestamp != 0 => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        _ => "not set".to_string(),
    }
}

fn flags_text(names: Vec<&'static str>) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" | ")
    }
}

fn dotted(version: &[u16; 4]) -> String {
    format!(
        "{}.{}.{}.{}",
        version[0], version[1], version[2], version[3]
    )
}

/// Language name, or the raw identifier when it is not a common one.
pub fn language_label(lcid: u32) -> String {
    resource::language_name(lcid)
        .map(str::to_string)
        .unwrap_or_else(|| format!("0x{:04x}", lcid))
}

pub fn dos_header(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let h = image.dos_header();
    title(out, "DOS Header")?;
    field(out, "Magic", format!("0x{:04x}", h.e_magic))?;
    field(out, "Bytes on last page", h.e_cblp)?;
    field(out, "Pages in file", h.e_cp)?;
    field(out, "Relocations", h.e_crlc)?;
    field(out, "Header size (paragraphs)", h.e_cparhdr)?;
    field(out, "Min extra paragraphs", h.e_minalloc)?;
    field(out, "Max extra paragraphs", h.e_maxalloc)?;
    field(out, "Initial SS:SP", format!("{:04x}:{:04x}", h.e_ss, h.e_sp))?;
    field(out, "Checksum", format!("0x{:04x}", h.e_csum))?;
    field(out, "Initial CS:IP", format!("{:04x}:{:04x}", h.e_cs, h.e_ip))?;
    field(out, "Relocation table offset", format!("0x{:04x}", h.e_lfarlc))?;
    field(out, "Overlay number", h.e_ovno)?;
    field(out, "OEM id/info", format!("{}/{}", h.e_oemid, h.e_oeminfo))?;
    field(out, "PE header offset", format!("0x{:08x}", h.e_lfanew))?;
    end_block(out)
}

pub fn pe_header(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let h = image.coff_header();
    title(out, "PE Header")?;
    field(out, "Signature", String::from_utf8_lossy(&image.nt_headers().signature[..2]))?;
    field(out, "Machine", h.machine)?;
    field(out, "Number of sections", h.number_of_sections)?;
    field(
        out,
        "Time date stamp",
        format!("{} (0x{:08x})", format_timestamp(h.time_date_stamp), h.time_date_stamp),
    )?;
    field(out, "Symbol table pointer", format!("0x{:08x}", h.pointer_to_symbol_table))?;
    field(out, "Number of symbols", h.number_of_symbols)?;
    field(out, "Optional header size", h.size_of_optional_header)?;
    field(
        out,
        "Characteristics",
        format!(
            "0x{:04x} ({})",
            h.characteristics,
            flags_text(flag_names(&h.flags()))
        ),
    )?;
    end_block(out)
}

pub fn optional_header(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let opt = image.optional_header();
    let common = opt.common();
    let win = opt.windows();

    title(out, "Image Optional Header")?;
    field(
        out,
        "Magic",
        format!(
            "0x{:03x} ({})",
            common.magic,
            if opt.is_64bit() { "PE32+" } else { "PE32" }
        ),
    )?;
    field(
        out,
        "Linker version",
        format!(
            "{}.{}",
            common.major_linker_version, common.minor_linker_version
        ),
    )?;
    field(out, "Size of code", common.size_of_code)?;
    field(out, "Size of initialized data", common.size_of_initialized_data)?;
    field(out, "Size of uninitialized data", common.size_of_uninitialized_data)?;
    field(
        out,
        "Address of entry point",
        format!("0x{:08x}", common.address_of_entry_point),
    )?;
    field(out, "Base of code", format!("0x{:08x}", common.base_of_code))?;
    if let Some(base_of_data) = opt.base_of_data() {
        field(out, "Base of data", format!("0x{:08x}", base_of_data))?;
    }
    field(out, "Image base", format!("0x{:x}", win.image_base))?;
    field(out, "Section alignment", format!("0x{:x}", win.section_alignment))?;
    field(out, "File alignment", format!("0x{:x}", win.file_alignment))?;
    field(
        out,
        "Operating system version",
        format!(
            "{}.{}",
            win.major_operating_system_version, win.minor_operating_system_version
        ),
    )?;
    field(
        out,
        "Image version",
        format!("{}.{}", win.major_image_version, win.minor_image_version),
    )?;
    field(
        out,
        "Subsystem version",
        format!(
            "{}.{}",
            win.major_subsystem_version, win.minor_subsystem_version
        ),
    )?;
    field(out, "Win32 version value", win.win32_version_value)?;
    field(out, "Size of image", win.size_of_image)?;
    field(out, "Size of headers", win.size_of_headers)?;
    field(
        out,
        "Checksum",
        format!(
            "0x{:08x} (computed 0x{:08x}, {})",
            win.checksum,
            image.computed_checksum(),
            if image.checksum_valid() {
                "valid"
            } else {
                "mismatch"
            }
        ),
    )?;
    field(out, "Subsystem", win.subsystem)?;
    field(
        out,
        "DLL characteristics",
        format!(
            "0x{:04x} ({})",
            win.dll_characteristics,
            flags_text(flag_names(&opt.dll_characteristics()))
        ),
    )?;
    field(out, "Size of stack reserve", format!("0x{:x}", win.size_of_stack_reserve))?;
    field(out, "Size of stack commit", format!("0x{:x}", win.size_of_stack_commit))?;
    field(out, "Size of heap reserve", format!("0x{:x}", win.size_of_heap_reserve))?;
    field(out, "Size of heap commit", format!("0x{:x}", win.size_of_heap_commit))?;
    field(out, "Loader flags", format!("0x{:08x}", win.loader_flags))?;
    field(out, "Number of RVA and sizes", win.number_of_rva_and_sizes)?;

    writeln!(out, "  Data directories:")?;
    for (name, dir) in DATA_DIRECTORY_NAMES
        .iter()
        .zip(image.data_directories())
        .filter(|(_, dir)| dir.is_present())
    {
        writeln!(
            out,
            "    {:<16}RVA 0x{:08x}  size 0x{:08x}",
            name, dir.virtual_address, dir.size
        )?;
    }
    end_block(out)
}

pub fn sections(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    title(out, "Sections")?;
    for section in image.sections() {
        let h = &section.header;
        writeln!(out, "  {}", h.name())?;
        subfield(out, "VirtualSize", format!("0x{:x}", h.virtual_size))?;
        subfield(out, "VirtualAddress", format!("0x{:08x}", h.virtual_address))?;
        subfield(out, "RawSize", format!("0x{:x}", h.size_of_raw_data))?;
        subfield(out, "RawPointer", format!("0x{:08x}", h.pointer_to_raw_data))?;
        subfield(out, "Flags", flags_text(flag_names(&h.flags())))?;
        match section.entropy(image.data()) {
            Some(entropy) => subfield(out, "Entropy", format!("{:.2}", entropy))?,
            None => subfield(out, "Entropy", "raw data outside file")?,
        }
    }
    end_block(out)
}

pub fn imports(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let table = image.imports()?;
    title(out, "Imports")?;
    for desc in &table.descriptors {
        let marker = if desc.delay_load { " (delay-loaded)" } else { "" };
        writeln!(out, "  {}{}", desc.dll_name, marker)?;
        for entry in &desc.entries {
            match (entry.name, entry.ordinal) {
                (Some(name), _) => writeln!(out, "    {}", name)?,
                (None, Some(ordinal)) => writeln!(out, "    #{}", ordinal)?,
                (None, None) => writeln!(out, "    <unresolved>")?,
            }
        }
    }
    end_block(out)
}

pub fn exports(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let table = image.exports()?;
    title(out, "Exports")?;
    if let Some(name) = table.dll_name {
        field(out, "Module name", name)?;
    }
    if table.count() > 0 {
        field(out, "Time date stamp", format_timestamp(table.time_date_stamp))?;
        field(
            out,
            "Version",
            format!("{}.{}", table.major_version, table.minor_version),
        )?;
        field(out, "Ordinal base", table.ordinal_base)?;
    }
    for export in &table.exports {
        let name = export.name.unwrap_or("<unnamed>");
        match export.forwarder {
            Some(target) => writeln!(
                out,
                "  {:>5}  0x{:08x}  {} -> {}",
                export.ordinal, export.rva, name, target
            )?,
            None => writeln!(out, "  {:>5}  0x{:08x}  {}", export.ordinal, export.rva, name)?,
        }
    }
    end_block(out)
}

pub fn resources(image: &PeImage, out: &mut dyn Write, with_hashes: bool) -> Result<()> {
    let entries = image.resources()?;
    title(out, "Resources")?;
    for entry in &entries {
        writeln!(
            out,
            "  {}/{}/{}",
            resource::resource_type_name(&entry.kind),
            entry.name,
            language_label(entry.language)
        )?;
        subfield(out, "Size", format!("{} bytes", entry.size))?;
        subfield(out, "RVA", format!("0x{:08x}", entry.rva))?;
        subfield(out, "Code page", entry.code_page)?;
        match image.resource_data(entry) {
            Some(bytes) => {
                if let Some(kind) = infer::get(bytes) {
                    subfield(out, "Detected", kind.mime_type())?;
                }
                if with_hashes {
                    subfield(out, "SHA-256", sha256_digest(bytes))?;
                }
            }
            None => subfield(out, "Data", "not backed by the file")?,
        }
    }
    end_block(out)
}

pub fn version_info(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    title(out, "Version Info")?;
    let Some(info) = image.version_info()? else {
        return end_block(out);
    };

    if let Some(fixed) = &info.fixed {
        field(out, "File version", dotted(&fixed.file_version))?;
        field(out, "Product version", dotted(&fixed.product_version))?;
        field(
            out,
            "File flags",
            format!("0x{:x}", fixed.file_flags & fixed.file_flags_mask),
        )?;
        field(out, "File OS", format!("0x{:x}", fixed.file_os))?;
        field(
            out,
            "File type",
            format!("0x{:x}/0x{:x}", fixed.file_type, fixed.file_subtype),
        )?;
    }
    for table in &info.string_tables {
        writeln!(out, "  [{}]", table.key)?;
        for (key, value) in &table.strings {
            subfield(out, key, value)?;
        }
    }
    for (language, code_page) in &info.translations {
        field(
            out,
            "Translation",
            format!("{} / code page {}", language_label(*language as u32), code_page),
        )?;
    }
    end_block(out)
}

pub fn debug_info(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let entries = image.debug_entries()?;
    title(out, "Debug Info")?;
    for entry in &entries {
        writeln!(out, "  {}", debug::debug_type_name(entry.debug_type))?;
        subfield(out, "Timestamp", format_timestamp(entry.time_date_stamp))?;
        subfield(
            out,
            "Version",
            format!("{}.{}", entry.major_version, entry.minor_version),
        )?;
        subfield(out, "Size", entry.size_of_data)?;
        subfield(out, "File offset", format!("0x{:08x}", entry.pointer_to_raw_data))?;
        if let Some(cv) = &entry.codeview {
            subfield(out, "Format", &cv.signature)?;
            subfield(out, "GUID", &cv.guid)?;
            subfield(out, "Age", cv.age)?;
            subfield(out, "PDB", &cv.pdb_path)?;
        }
    }
    end_block(out)
}

pub fn relocations(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let blocks = image.relocations()?;
    title(out, "Relocations")?;
    for block in &blocks {
        writeln!(
            out,
            "  Page 0x{:08x} ({} entries)",
            block.page_rva,
            block.entries.len()
        )?;
        // ABSOLUTE entries only pad a block to a 32-bit boundary
        for entry in block.entries.iter().filter(|e| e.kind != 0) {
            let target = match block.target_rva(entry) {
                Some(rva) => format!("0x{:08x}", rva),
                None => "<overflow>".to_string(),
            };
            writeln!(
                out,
                "    {:<10}  {}",
                target,
                reloc::relocation_type_name(entry.kind)
            )?;
        }
    }
    end_block(out)
}

pub fn tls(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    title(out, "TLS Callbacks")?;
    let Some(tls) = image.tls()? else {
        return end_block(out);
    };
    field(
        out,
        "Raw data",
        format!(
            "0x{:x} - 0x{:x}",
            tls.start_address_of_raw_data, tls.end_address_of_raw_data
        ),
    )?;
    field(out, "Address of index", format!("0x{:x}", tls.address_of_index))?;
    field(out, "Address of callbacks", format!("0x{:x}", tls.address_of_callbacks))?;
    field(out, "Size of zero fill", tls.size_of_zero_fill)?;
    field(out, "Characteristics", format!("0x{:08x}", tls.characteristics))?;
    for callback in &tls.callbacks {
        writeln!(out, "    0x{:x}", callback)?;
    }
    end_block(out)
}

pub fn certificates(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let certs = image.certificates()?;
    title(out, "Certificates")?;
    for cert in &certs {
        writeln!(
            out,
            "  {} at 0x{:08x}",
            certificate::certificate_type_name(cert.certificate_type),
            cert.offset
        )?;
        subfield(out, "Length", cert.length)?;
        subfield(out, "Revision", format!("0x{:04x}", cert.revision))?;
        subfield(out, "SHA-256", sha256_digest(&cert.data))?;
    }
    end_block(out)
}

pub fn hashes(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    let digests = FileHashes::compute(image.data());
    title(out, "Hashes")?;
    for (label, value) in digests.entries() {
        field(out, label, value)?;
    }
    match image.import_hash() {
        Ok(imphash) => field(out, "IMPHASH", imphash)?,
        Err(e) => field(out, "IMPHASH", format!("unavailable ({})", e))?,
    }
    end_block(out)
}

/// Default report when no category was requested.
///
/// Directory problems degrade individual lines instead of failing the block.
pub fn summary(image: &PeImage, out: &mut dyn Write) -> Result<()> {
    title(out, "Summary")?;
    field(out, "File size", format!("{} bytes", image.file_size()))?;
    field(
        out,
        "Architecture",
        format!(
            "{} ({})",
            image.machine(),
            if image.is_64bit() { "PE32+" } else { "PE32" }
        ),
    )?;
    field(out, "Type", if image.is_dll() { "DLL" } else { "Executable" })?;
    field(out, "Compilation date", format_timestamp(image.timestamp()))?;
    field(out, "Subsystem", image.subsystem())?;
    field(
        out,
        "Entry point",
        format!(
            "0x{:08x} ({})",
            image.entry_point(),
            image.entry_section().as_deref().unwrap_or("no section")
        ),
    )?;
    field(out, "Image base", format!("0x{:x}", image.image_base()))?;
    field(out, "Sections", image.sections().len())?;

    match image.imports() {
        Ok(table) => {
            field(
                out,
                "Imports",
                format!(
                    "{} functions from {} DLLs",
                    table.count(),
                    table.descriptors.len()
                ),
            )?;
            field(out, "Imphash", table.import_hash())?;
        }
        Err(e) => field(out, "Imports", format!("malformed ({})", e))?,
    }
    if let Ok(table) = image.exports() {
        if table.count() > 0 {
            field(
                out,
                "Exports",
                format!("{} ({} by name)", table.count(), table.named_count()),
            )?;
        }
    }

    let features = image.security_features();
    let mut mitigations = Vec::new();
    if features.aslr_enabled {
        mitigations.push("ASLR");
    }
    if features.high_entropy_va {
        mitigations.push("High-entropy VA");
    }
    if features.nx_compatible {
        mitigations.push("DEP");
    }
    if features.cfg_enabled {
        mitigations.push("CFG");
    }
    if !features.seh_enabled {
        mitigations.push("No SEH");
    }
    if features.force_integrity {
        mitigations.push("Force integrity");
    }
    if features.appcontainer {
        mitigations.push("AppContainer");
    }
    field(out, "Mitigations", flags_text(mitigations))?;
    field(out, "Signed", if image.is_signed() { "yes" } else { "no" })?;
    field(out, ".NET", if image.is_dotnet() { "yes" } else { "no" })?;
    if let Some(overlay) = image.overlay() {
        field(out, "Overlay", format!("{} bytes", overlay.len()))?;
    }

    if let Ok(entries) = image.resources() {
        let mut languages: Vec<u32> = entries.iter().map(|e| e.language).collect();
        languages.sort_unstable();
        languages.dedup();
        if !languages.is_empty() {
            let names: Vec<String> = languages.into_iter().map(language_label).collect();
            field(out, "Detected languages", names.join(", "))?;
        }
    }

    if let Ok(Some(info)) = image.version_info() {
        for key in ["CompanyName", "ProductName", "FileVersion", "OriginalFilename"] {
            if let Some(value) = info.value(key) {
                field(out, key, value)?;
            }
        }
    }
    end_block(out)
}
