//! Export table parsing

use std::collections::HashMap;

use crate::formats::pe::sections::SectionTable;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{read_cstring, ReadExt};

/// Export table containing all exports
#[derive(Debug, Clone, Default)]
pub struct ExportTable<'a> {
    pub dll_name: Option<&'a str>,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub ordinal_base: u32,
    pub exports: Vec<ExportEntry<'a>>,
}

impl<'a> ExportTable<'a> {
    /// Get export by name
    pub fn get_by_name(&self, name: &str) -> Option<&ExportEntry<'a>> {
        self.exports.iter().find(|e| e.name == Some(name))
    }

    /// Get export by ordinal
    pub fn get_by_ordinal(&self, ordinal: u32) -> Option<&ExportEntry<'a>> {
        self.exports.iter().find(|e| e.ordinal == ordinal)
    }

    /// Count of exports
    pub fn count(&self) -> usize {
        self.exports.len()
    }

    /// Count of named exports
    pub fn named_count(&self) -> usize {
        self.exports.iter().filter(|e| e.name.is_some()).count()
    }
}

/// Parse export table from PE data
pub fn parse_exports<'a>(
    data: &'a [u8],
    sections: &SectionTable,
    export_dir: &DataDirectory,
    options: &ParseOptions,
) -> Result<ExportTable<'a>> {
    if !export_dir.is_present() {
        return Ok(ExportTable::default());
    }

    let dir_offset = sections
        .rva_to_offset(export_dir.virtual_address)
        .ok_or(PeError::InvalidRva {
            rva: export_dir.virtual_address,
        })?;

    // IMAGE_EXPORT_DIRECTORY is 40 bytes
    let header = data
        .read_slice_at(dir_offset, 40)
        .ok_or(PeError::TruncatedHeader {
            expected: dir_offset + 40,
            actual: data.len(),
        })?;
    let field = |o: usize| header.read_u32_le_at(o).ok_or(PeError::MalformedExportTable);

    let time_date_stamp = field(4)?;
    let major_version = header.read_u16_le_at(8).unwrap_or_default();
    let minor_version = header.read_u16_le_at(10).unwrap_or_default();
    let name_rva = field(12)?;
    let ordinal_base = field(16)?;
    // Limit exports to prevent DOS
    let number_of_functions = (field(20)? as usize).min(options.max_exports);
    let number_of_names = (field(24)? as usize).min(options.max_exports);
    let address_table_rva = field(28)?;
    let name_table_rva = field(32)?;
    let ordinal_table_rva = field(36)?;

    let dll_name = match name_rva {
        0 => None,
        rva => sections
            .rva_to_offset(rva)
            .and_then(|offset| read_cstring(data, offset, 256).ok()),
    };

    let addr_offset = sections
        .rva_to_offset(address_table_rva)
        .ok_or(PeError::InvalidRva {
            rva: address_table_rva,
        })?;

    let addresses: Vec<u32> = (0..number_of_functions)
        .map_while(|i| data.read_u32_le_at(addr_offset + i * 4))
        .collect();

    // Function index -> exported name
    let mut name_map = HashMap::new();
    if number_of_names > 0 && name_table_rva != 0 && ordinal_table_rva != 0 {
        let name_offset = sections
            .rva_to_offset(name_table_rva)
            .ok_or(PeError::InvalidRva {
                rva: name_table_rva,
            })?;
        let ord_offset = sections
            .rva_to_offset(ordinal_table_rva)
            .ok_or(PeError::InvalidRva {
                rva: ordinal_table_rva,
            })?;

        for i in 0..number_of_names {
            let (Some(entry_rva), Some(ordinal_index)) = (
                data.read_u32_le_at(name_offset + i * 4),
                data.read_u16_le_at(ord_offset + i * 2),
            ) else {
                break;
            };

            let name = sections
                .rva_to_offset(entry_rva)
                .and_then(|off| read_cstring(data, off, 512).ok());
            if let Some(name) = name {
                name_map.insert(ordinal_index as usize, name);
            }
        }
    }

    let dir_start = export_dir.virtual_address;
    let dir_end = dir_start.saturating_add(export_dir.size);

    let exports = addresses
        .iter()
        .enumerate()
        .filter(|(_, &rva)| rva != 0)
        .map(|(i, &rva)| {
            // RVA inside the export directory is a forwarder string
            let forwarder = if rva >= dir_start && rva < dir_end {
                sections
                    .rva_to_offset(rva)
                    .and_then(|offset| read_cstring(data, offset, 256).ok())
            } else {
                None
            };

            ExportEntry {
                name: name_map.get(&i).copied(),
                ordinal: ordinal_base.wrapping_add(i as u32),
                rva,
                forwarder,
            }
        })
        .collect();

    Ok(ExportTable {
        dll_name,
        time_date_stamp,
        major_version,
        minor_version,
        ordinal_base,
        exports,
    })
}
