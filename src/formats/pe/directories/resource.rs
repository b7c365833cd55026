//! Resource directory parsing
//!
//! The resource tree is three levels deep (type, name, language). It is
//! flattened into one [`ResourceEntry`] per leaf, in tree order.

use crate::formats::pe::sections::SectionTable;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{read_utf16le_units, ReadExt};

const HIGH_BIT: u32 = 0x8000_0000;

/// Well-known resource type identifiers
pub const RT_CURSOR: u32 = 1;
pub const RT_BITMAP: u32 = 2;
pub const RT_ICON: u32 = 3;
pub const RT_MENU: u32 = 4;
pub const RT_DIALOG: u32 = 5;
pub const RT_STRING: u32 = 6;
pub const RT_FONTDIR: u32 = 7;
pub const RT_FONT: u32 = 8;
pub const RT_ACCELERATOR: u32 = 9;
pub const RT_RCDATA: u32 = 10;
pub const RT_MESSAGETABLE: u32 = 11;
pub const RT_GROUP_CURSOR: u32 = 12;
pub const RT_GROUP_ICON: u32 = 14;
pub const RT_VERSION: u32 = 16;
pub const RT_DLGINCLUDE: u32 = 17;
pub const RT_PLUGPLAY: u32 = 19;
pub const RT_VXD: u32 = 20;
pub const RT_ANICURSOR: u32 = 21;
pub const RT_ANIICON: u32 = 22;
pub const RT_HTML: u32 = 23;
pub const RT_MANIFEST: u32 = 24;

/// Symbolic name of a resource type, or the raw id/name when unknown.
pub fn resource_type_name(kind: &ResourceId) -> String {
    let id = match kind {
        ResourceId::Name(name) => return name.clone(),
        ResourceId::Id(id) => *id,
    };
    let name = match id {
        RT_CURSOR => "RT_CURSOR",
        RT_BITMAP => "RT_BITMAP",
        RT_ICON => "RT_ICON",
        RT_MENU => "RT_MENU",
        RT_DIALOG => "RT_DIALOG",
        RT_STRING => "RT_STRING",
        RT_FONTDIR => "RT_FONTDIR",
        RT_FONT => "RT_FONT",
        RT_ACCELERATOR => "RT_ACCELERATOR",
        RT_RCDATA => "RT_RCDATA",
        RT_MESSAGETABLE => "RT_MESSAGETABLE",
        RT_GROUP_CURSOR => "RT_GROUP_CURSOR",
        RT_GROUP_ICON => "RT_GROUP_ICON",
        RT_VERSION => "RT_VERSION",
        RT_DLGINCLUDE => "RT_DLGINCLUDE",
        RT_PLUGPLAY => "RT_PLUGPLAY",
        RT_VXD => "RT_VXD",
        RT_ANICURSOR => "RT_ANICURSOR",
        RT_ANIICON => "RT_ANIICON",
        RT_HTML => "RT_HTML",
        RT_MANIFEST => "RT_MANIFEST",
        other => return other.to_string(),
    };
    name.to_string()
}

/// Short name of a Windows language identifier for the common cases.
pub fn language_name(lcid: u32) -> Option<&'static str> {
    Some(match lcid {
        0x0000 => "Neutral",
        0x0400 => "Process default",
        0x0401 => "Arabic (Saudi Arabia)",
        0x0404 => "Chinese (Taiwan)",
        0x0405 => "Czech",
        0x0406 => "Danish",
        0x0407 => "German (Germany)",
        0x0408 => "Greek",
        0x0409 => "English (United States)",
        0x040a => "Spanish (Traditional Sort)",
        0x040b => "Finnish",
        0x040c => "French (France)",
        0x040d => "Hebrew",
        0x040e => "Hungarian",
        0x0410 => "Italian (Italy)",
        0x0411 => "Japanese",
        0x0412 => "Korean",
        0x0413 => "Dutch (Netherlands)",
        0x0414 => "Norwegian (Bokmal)",
        0x0415 => "Polish",
        0x0416 => "Portuguese (Brazil)",
        0x0418 => "Romanian",
        0x0419 => "Russian",
        0x041d => "Swedish",
        0x041f => "Turkish",
        0x0422 => "Ukrainian",
        0x0429 => "Persian",
        0x0804 => "Chinese (PRC)",
        0x0809 => "English (United Kingdom)",
        0x080a => "Spanish (Mexico)",
        0x0816 => "Portuguese (Portugal)",
        0x0c0a => "Spanish (Modern Sort)",
        _ => return None,
    })
}

struct Walker<'a, 's> {
    data: &'a [u8],
    sections: &'s SectionTable,
    base: usize,
    options: &'s ParseOptions,
    entries: Vec<ResourceEntry>,
}

impl Walker<'_, '_> {
    fn u32_at(&self, offset: usize) -> Result<u32> {
        self.data
            .read_u32_le_at(offset)
            .ok_or(PeError::MalformedResourceDirectory)
    }

    fn u16_at(&self, offset: usize) -> Result<u16> {
        self.data
            .read_u16_le_at(offset)
            .ok_or(PeError::MalformedResourceDirectory)
    }

    fn entry_id(&self, raw: u32) -> Result<ResourceId> {
        if raw & HIGH_BIT == 0 {
            return Ok(ResourceId::Id(raw));
        }
        // IMAGE_RESOURCE_DIR_STRING_U: u16 length, then UTF-16 code units
        let offset = self.base.saturating_add((raw & !HIGH_BIT) as usize);
        let len = self.u16_at(offset)? as usize;
        read_utf16le_units(self.data, offset + 2, len)
            .map(ResourceId::Name)
            .map_err(|_| PeError::MalformedResourceDirectory)
    }

    fn walk(&mut self, dir_offset: usize, path: &mut Vec<ResourceId>) -> Result<()> {
        if path.len() >= self.options.max_resource_depth {
            return Err(PeError::ResourceDepthExceeded);
        }

        // IMAGE_RESOURCE_DIRECTORY: 16 bytes, then named entries then id entries
        let named = self.u16_at(dir_offset + 12)? as usize;
        let ids = self.u16_at(dir_offset + 14)? as usize;

        for i in 0..named + ids {
            if self.entries.len() >= self.options.max_resources {
                return Ok(());
            }

            let entry_offset = dir_offset + 16 + i * 8;
            let name_field = self.u32_at(entry_offset)?;
            let data_field = self.u32_at(entry_offset + 4)?;

            path.push(self.entry_id(name_field)?);
            let target = self.base.saturating_add((data_field & !HIGH_BIT) as usize);
            if data_field & HIGH_BIT != 0 {
                self.walk(target, path)?;
            } else {
                self.leaf(target, path)?;
            }
            path.pop();
        }

        Ok(())
    }

    fn leaf(&mut self, offset: usize, path: &[ResourceId]) -> Result<()> {
        // IMAGE_RESOURCE_DATA_ENTRY
        let rva = self.u32_at(offset)?;
        let size = self.u32_at(offset + 4)?;
        let code_page = self.u32_at(offset + 8)?;

        let data = self.sections.rva_to_offset(rva).and_then(|start| {
            let end = start.checked_add(size as usize)?;
            (end <= self.data.len()).then_some(start..end)
        });

        let language = match path.get(2) {
            Some(ResourceId::Id(lang)) => *lang,
            _ => 0,
        };

        self.entries.push(ResourceEntry {
            kind: path.first().cloned().unwrap_or(ResourceId::Id(0)),
            name: path.get(1).cloned().unwrap_or(ResourceId::Id(0)),
            language,
            code_page,
            rva,
            size,
            data,
        });
        Ok(())
    }
}

/// Parse the resource directory into a flat list of leaves
pub fn parse_resources(
    data: &[u8],
    sections: &SectionTable,
    resource_dir: &DataDirectory,
    options: &ParseOptions,
) -> Result<Vec<ResourceEntry>> {
    if !resource_dir.is_present() {
        return Ok(Vec::new());
    }

    let base = sections
        .rva_to_offset(resource_dir.virtual_address)
        .ok_or(PeError::InvalidRva {
            rva: resource_dir.virtual_address,
        })?;

    let mut walker = Walker {
        data,
        sections,
        base,
        options,
        entries: Vec::new(),
    };
    walker.walk(base, &mut Vec::with_capacity(3))?;
    Ok(walker.entries)
}
