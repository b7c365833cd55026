//! Base relocation table parsing

use crate::formats::pe::sections::SectionTable;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;

/// Display name of a base relocation type
pub fn relocation_type_name(kind: u8) -> &'static str {
    match kind {
        0 => "ABSOLUTE",
        1 => "HIGH",
        2 => "LOW",
        3 => "HIGHLOW",
        4 => "HIGHADJ",
        5 => "MACHINE_SPECIFIC_5",
        7 => "THUMB_MOV32",
        8 => "RISCV_LOW12S",
        9 => "MACHINE_SPECIFIC_9",
        10 => "DIR64",
        _ => "UNKNOWN",
    }
}

/// Parse base relocation blocks
pub fn parse_relocations(
    data: &[u8],
    sections: &SectionTable,
    reloc_dir: &DataDirectory,
    options: &ParseOptions,
) -> Result<Vec<RelocationBlock>> {
    if !reloc_dir.is_present() {
        return Ok(Vec::new());
    }

    let start = sections
        .rva_to_offset(reloc_dir.virtual_address)
        .ok_or(PeError::InvalidRva {
            rva: reloc_dir.virtual_address,
        })?;
    let end = start
        .saturating_add(reloc_dir.size as usize)
        .min(data.len());

    let mut blocks = Vec::new();
    let mut offset = start;

    while offset + 8 <= end {
        if blocks.len() >= options.max_relocation_blocks {
            return Err(PeError::LimitExceeded("relocation blocks"));
        }

        let page_rva = data
            .read_u32_le_at(offset)
            .ok_or(PeError::MalformedRelocations)?;
        let block_size = data
            .read_u32_le_at(offset + 4)
            .ok_or(PeError::MalformedRelocations)?;

        // Some linkers pad the table with a zero block
        if page_rva == 0 && block_size == 0 {
            break;
        }
        if block_size < 8 || offset + block_size as usize > end {
            return Err(PeError::MalformedRelocations);
        }

        let count = (block_size as usize - 8) / 2;
        let entries = (0..count)
            .filter_map(|i| data.read_u16_le_at(offset + 8 + i * 2))
            .map(|raw| RelocationEntry {
                kind: (raw >> 12) as u8,
                offset: raw & 0x0FFF,
            })
            .collect();

        blocks.push(RelocationBlock {
            page_rva,
            block_size,
            entries,
        });
        offset += block_size as usize;
    }

    Ok(blocks)
}
