//! Import table parsing

use crate::formats::pe::sections::SectionTable;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{read_cstring, ReadExt};

/// Import table containing all imports
#[derive(Debug, Clone, Default)]
pub struct ImportTable<'a> {
    pub descriptors: Vec<ImportDescriptor<'a>>,
}

impl<'a> ImportTable<'a> {
    /// Get total import count
    pub fn count(&self) -> usize {
        self.descriptors.iter().map(|d| d.entries.len()).sum()
    }

    /// Get all DLL names, in descriptor order
    pub fn dll_names(&self) -> Vec<&'a str> {
        self.descriptors.iter().map(|d| d.dll_name).collect()
    }

    /// Check if an import exists by name
    pub fn has_import(&self, name: &str) -> bool {
        self.descriptors
            .iter()
            .flat_map(|d| d.entries.iter())
            .any(|e| e.name == Some(name))
    }

    /// Import hash (imphash) over the regular import directory.
    ///
    /// Module names lose their `.dll`, `.ocx` or `.sys` extension, ordinal
    /// imports render as `ord<N>`, and entries keep table order.
    pub fn import_hash(&self) -> String {
        let mut entries = Vec::new();

        for desc in self.descriptors.iter().filter(|d| !d.delay_load) {
            let lower = desc.dll_name.to_ascii_lowercase();
            let module = [".dll", ".ocx", ".sys"]
                .iter()
                .find_map(|ext| lower.strip_suffix(ext))
                .unwrap_or(&lower);
            for entry in &desc.entries {
                let function = match (entry.name, entry.ordinal) {
                    (Some(name), _) => name.to_ascii_lowercase(),
                    (None, Some(ord)) => format!("ord{}", ord),
                    (None, None) => continue,
                };
                entries.push(format!("{}.{}", module, function));
            }
        }

        format!("{:032x}", md5::compute(entries.join(",").as_bytes()))
    }
}

/// Parse import table from PE data
pub fn parse_imports<'a>(
    data: &'a [u8],
    sections: &SectionTable,
    import_dir: &DataDirectory,
    delay_dir: &DataDirectory,
    image_base: u64,
    is_64bit: bool,
    options: &ParseOptions,
) -> Result<ImportTable<'a>> {
    let mut table = ImportTable::default();
    let ctx = ThunkContext {
        data,
        sections,
        image_base,
        is_64bit,
    };

    if import_dir.is_present() {
        parse_import_directory(&ctx, import_dir.virtual_address, &mut table, options.max_imports)?;
    }

    if delay_dir.is_present() {
        parse_delay_import_directory(
            &ctx,
            delay_dir.virtual_address,
            &mut table,
            options.max_imports,
        )?;
    }

    Ok(table)
}

struct ThunkContext<'a, 's> {
    data: &'a [u8],
    sections: &'s SectionTable,
    image_base: u64,
    is_64bit: bool,
}

impl<'a> ThunkContext<'a, '_> {
    fn offset_of(&self, rva: u32) -> Result<usize> {
        self.sections
            .rva_to_offset(rva)
            .ok_or(PeError::InvalidRva { rva })
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        self.data
            .read_u32_le_at(offset)
            .ok_or(PeError::InvalidOffset { offset })
    }

    fn name_at(&self, rva: u32) -> Result<&'a str> {
        let offset = self.offset_of(rva)?;
        read_cstring(self.data, offset, 256)
    }
}

fn parse_import_directory<'a>(
    ctx: &ThunkContext<'a, '_>,
    dir_rva: u32,
    table: &mut ImportTable<'a>,
    max_imports: usize,
) -> Result<()> {
    let mut offset = ctx.offset_of(dir_rva)?;
    let mut total_imports = table.count();

    // IMAGE_IMPORT_DESCRIPTOR, 20 bytes each, zero terminated
    while let Some(desc_data) = ctx.data.read_slice_at(offset, 20) {
        if desc_data.iter().all(|&b| b == 0) || total_imports >= max_imports {
            break;
        }

        let original_first_thunk = ctx.u32_at(offset)?;
        let time_date_stamp = ctx.u32_at(offset + 4)?;
        let forwarder_chain = ctx.u32_at(offset + 8)?;
        let name_rva = ctx.u32_at(offset + 12)?;
        let first_thunk = ctx.u32_at(offset + 16)?;
        offset += 20;

        // Skip invalid entries
        if name_rva == 0 {
            continue;
        }

        let dll_name = ctx.name_at(name_rva)?;
        let lookup = if original_first_thunk != 0 {
            original_first_thunk
        } else {
            first_thunk
        };
        let entries = parse_thunks(ctx, lookup, first_thunk, max_imports - total_imports)?;
        total_imports += entries.len();

        table.descriptors.push(ImportDescriptor {
            dll_name,
            original_first_thunk,
            time_date_stamp,
            forwarder_chain,
            name_rva,
            first_thunk,
            delay_load: false,
            entries,
        });
    }

    Ok(())
}

fn parse_delay_import_directory<'a>(
    ctx: &ThunkContext<'a, '_>,
    dir_rva: u32,
    table: &mut ImportTable<'a>,
    max_imports: usize,
) -> Result<()> {
    let mut offset = ctx.offset_of(dir_rva)?;
    let mut total_imports = table.count();

    // ImgDelayDescr, 32 bytes each, zero terminated
    while let Some(desc_data) = ctx.data.read_slice_at(offset, 32) {
        if desc_data.iter().all(|&b| b == 0) || total_imports >= max_imports {
            break;
        }

        let attributes = ctx.u32_at(offset)?;
        let name_rva = ctx.u32_at(offset + 4)?;
        let iat_rva = ctx.u32_at(offset + 12)?;
        let int_rva = ctx.u32_at(offset + 16)?;
        let time_date_stamp = ctx.u32_at(offset + 28)?;
        offset += 32;

        // Version 1 descriptors carry RVAs; the legacy form stores VAs
        let rva_based = attributes & 1 != 0;
        let to_rva = |value: u32| -> u32 {
            if rva_based || value == 0 {
                value
            } else {
                value.wrapping_sub(ctx.image_base as u32)
            }
        };

        if name_rva == 0 {
            continue;
        }

        let dll_name = ctx.name_at(to_rva(name_rva))?;
        let entries = parse_thunks(
            ctx,
            to_rva(int_rva),
            to_rva(iat_rva),
            max_imports - total_imports,
        )?;
        total_imports += entries.len();

        table.descriptors.push(ImportDescriptor {
            dll_name,
            original_first_thunk: to_rva(int_rva),
            time_date_stamp,
            forwarder_chain: 0,
            name_rva: to_rva(name_rva),
            first_thunk: to_rva(iat_rva),
            delay_load: true,
            entries,
        });
    }

    Ok(())
}

fn parse_thunks<'a>(
    ctx: &ThunkContext<'a, '_>,
    thunk_rva: u32,
    first_thunk: u32,
    max_count: usize,
) -> Result<Vec<ImportEntry<'a>>> {
    let mut entries = Vec::new();
    if thunk_rva == 0 {
        return Ok(entries);
    }

    let mut thunk_offset = ctx.offset_of(thunk_rva)?;
    let entry_size = if ctx.is_64bit { 8 } else { 4 };
    let mut index = 0;

    while entries.len() < max_count {
        let val = if ctx.is_64bit {
            ctx.data.read_u64_le_at(thunk_offset)
        } else {
            ctx.data.read_u32_le_at(thunk_offset).map(u64::from)
        };

        // Check for terminator or end of data
        let Some(val) = val.filter(|&v| v != 0) else {
            break;
        };

        let iat_va = if first_thunk != 0 {
            ctx.image_base
                .wrapping_add(u64::from(first_thunk))
                .wrapping_add((index * entry_size) as u64)
        } else {
            0
        };

        let ordinal_flag = if ctx.is_64bit { 1u64 << 63 } else { 1u64 << 31 };

        let (name, ordinal, hint) = if val & ordinal_flag != 0 {
            (None, Some((val & 0xFFFF) as u16), None)
        } else {
            let hint_name_rva = (val & 0x7FFF_FFFF) as u32;
            match ctx.sections.rva_to_offset(hint_name_rva) {
                Some(hint_offset) => {
                    let hint = ctx.data.read_u16_le_at(hint_offset);
                    let name = read_cstring(ctx.data, hint_offset + 2, 512).ok();
                    (name, None, hint)
                }
                None => (None, None, None),
            }
        };

        entries.push(ImportEntry {
            name,
            ordinal,
            hint,
            iat_va,
        });

        thunk_offset += entry_size;
        index += 1;
    }

    Ok(entries)
}
