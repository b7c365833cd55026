//! Debug directory parsing

use crate::formats::pe::sections::SectionTable;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{format_guid, read_cstring, ReadExt};

pub const IMAGE_DEBUG_TYPE_CODEVIEW: u32 = 2;

const DEBUG_ENTRY_SIZE: usize = 28;
const MAX_DEBUG_ENTRIES: usize = 64;

/// Display name of a debug entry type
pub fn debug_type_name(kind: u32) -> &'static str {
    match kind {
        0 => "UNKNOWN",
        1 => "COFF",
        2 => "CODEVIEW",
        3 => "FPO",
        4 => "MISC",
        5 => "EXCEPTION",
        6 => "FIXUP",
        7 => "OMAP_TO_SRC",
        8 => "OMAP_FROM_SRC",
        9 => "BORLAND",
        10 => "RESERVED10",
        11 => "CLSID",
        12 => "VC_FEATURE",
        13 => "POGO",
        14 => "ILTCG",
        15 => "MPX",
        16 => "REPRO",
        20 => "EX_DLLCHARACTERISTICS",
        _ => "OTHER",
    }
}

fn locate_raw_data(sections: &SectionTable, entry: &DebugEntry) -> Option<usize> {
    if entry.pointer_to_raw_data != 0 {
        Some(entry.pointer_to_raw_data as usize)
    } else {
        sections.rva_to_offset(entry.address_of_raw_data)
    }
}

/// Decode an `RSDS` or `NB10` record
pub fn parse_codeview(record: &[u8]) -> Option<CodeViewInfo> {
    let signature = record.read_slice_at(0, 4)?;
    match signature {
        b"RSDS" => {
            let guid: [u8; 16] = record.read_slice_at(4, 16)?.try_into().ok()?;
            Some(CodeViewInfo {
                signature: "RSDS".to_string(),
                guid: format_guid(&guid),
                age: record.read_u32_le_at(20)?,
                pdb_path: read_cstring(record, 24, 1024).ok()?.to_string(),
            })
        }
        b"NB10" => Some(CodeViewInfo {
            signature: "NB10".to_string(),
            guid: format!("{:08X}", record.read_u32_le_at(8)?),
            age: record.read_u32_le_at(12)?,
            pdb_path: read_cstring(record, 16, 1024).ok()?.to_string(),
        }),
        _ => None,
    }
}

/// Parse the debug directory
pub fn parse_debug_directory(
    data: &[u8],
    sections: &SectionTable,
    debug_dir: &DataDirectory,
) -> Result<Vec<DebugEntry>> {
    if !debug_dir.is_present() {
        return Ok(Vec::new());
    }

    let offset = sections
        .rva_to_offset(debug_dir.virtual_address)
        .ok_or(PeError::InvalidRva {
            rva: debug_dir.virtual_address,
        })?;
    let count = (debug_dir.size as usize / DEBUG_ENTRY_SIZE).min(MAX_DEBUG_ENTRIES);

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let raw = data
            .read_slice_at(offset + i * DEBUG_ENTRY_SIZE, DEBUG_ENTRY_SIZE)
            .ok_or(PeError::MalformedDebugDirectory)?;
        let u32_at = |o: usize| raw.read_u32_le_at(o).unwrap_or_default();
        let u16_at = |o: usize| raw.read_u16_le_at(o).unwrap_or_default();

        let mut entry = DebugEntry {
            characteristics: u32_at(0),
            time_date_stamp: u32_at(4),
            major_version: u16_at(8),
            minor_version: u16_at(10),
            debug_type: u32_at(12),
            size_of_data: u32_at(16),
            address_of_raw_data: u32_at(20),
            pointer_to_raw_data: u32_at(24),
            codeview: None,
        };

        if entry.debug_type == IMAGE_DEBUG_TYPE_CODEVIEW {
            entry.codeview = locate_raw_data(sections, &entry)
                .and_then(|start| data.read_slice_at(start, entry.size_of_data as usize))
                .and_then(parse_codeview);
        }
        entries.push(entry);
    }

    Ok(entries)
}
