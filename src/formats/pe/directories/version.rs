//! VS_VERSIONINFO decoding
//!
//! Every node of the version resource is a block of
//! `wLength, wValueLength, wType, szKey, padding, Value, padding, Children`
//! with 32-bit alignment measured from the start of the resource data.

use std::ops::Range;

use crate::formats::pe::types::*;
use crate::formats::pe::utils::{align_up, read_utf16le_string, read_utf16le_units, ReadExt};

const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const MAX_KEY_CHARS: usize = 256;

struct Block<'a> {
    key: String,
    text: bool,
    value: &'a [u8],
    children: Range<usize>,
    next: usize,
}

fn read_block(blob: &[u8], offset: usize) -> Result<Block<'_>> {
    let length = blob
        .read_u16_le_at(offset)
        .ok_or(PeError::MalformedVersionInfo)? as usize;
    let value_length = blob
        .read_u16_le_at(offset + 2)
        .ok_or(PeError::MalformedVersionInfo)? as usize;
    let kind = blob
        .read_u16_le_at(offset + 4)
        .ok_or(PeError::MalformedVersionInfo)?;

    if length < 6 {
        return Err(PeError::MalformedVersionInfo);
    }
    let end = (offset + length).min(blob.len());

    let (key, consumed) = read_utf16le_string(blob, offset + 6, MAX_KEY_CHARS)
        .map_err(|_| PeError::MalformedVersionInfo)?;

    // Text values count UTF-16 units, binary values count bytes
    let text = kind == 1;
    let value_bytes = if text { value_length * 2 } else { value_length };
    let value_start = align_up(offset + 6 + consumed, 4).min(end);
    let value_end = (value_start + value_bytes).min(end);

    Ok(Block {
        key,
        text,
        value: &blob[value_start..value_end],
        children: align_up(value_end, 4).min(end)..end,
        next: align_up(end, 4),
    })
}

fn children(blob: &[u8], range: Range<usize>) -> Result<Vec<Block<'_>>> {
    let mut blocks = Vec::new();
    let mut offset = range.start;
    while offset + 6 <= range.end {
        let block = read_block(blob, offset)?;
        if block.next <= offset {
            break;
        }
        offset = block.next;
        blocks.push(block);
    }
    Ok(blocks)
}

fn text_value(block: &Block<'_>) -> String {
    let units = block.value.len() / 2;
    let raw = if block.text {
        read_utf16le_units(block.value, 0, units).unwrap_or_default()
    } else {
        String::new()
    };
    raw.trim_end_matches('\0').to_string()
}

fn parse_fixed(value: &[u8]) -> Option<FixedFileInfo> {
    if value.read_u32_le_at(0)? != FIXED_FILE_INFO_SIGNATURE {
        return None;
    }
    let split = |ms: u32, ls: u32| {
        [
            (ms >> 16) as u16,
            (ms & 0xFFFF) as u16,
            (ls >> 16) as u16,
            (ls & 0xFFFF) as u16,
        ]
    };
    Some(FixedFileInfo {
        file_version: split(value.read_u32_le_at(8)?, value.read_u32_le_at(12)?),
        product_version: split(value.read_u32_le_at(16)?, value.read_u32_le_at(20)?),
        file_flags_mask: value.read_u32_le_at(24)?,
        file_flags: value.read_u32_le_at(28)?,
        file_os: value.read_u32_le_at(32)?,
        file_type: value.read_u32_le_at(36)?,
        file_subtype: value.read_u32_le_at(40)?,
    })
}

/// Decode the data of an RT_VERSION resource.
pub fn parse_version_info(blob: &[u8]) -> Result<VersionInfo> {
    let root = read_block(blob, 0)?;
    if root.key != "VS_VERSION_INFO" {
        return Err(PeError::MalformedVersionInfo);
    }

    let mut info = VersionInfo {
        fixed: parse_fixed(root.value),
        ..Default::default()
    };

    for child in children(blob, root.children.clone())? {
        match child.key.as_str() {
            "StringFileInfo" => {
                for table in children(blob, child.children.clone())? {
                    let strings = children(blob, table.children.clone())?
                        .iter()
                        .map(|s| (s.key.clone(), text_value(s)))
                        .collect();
                    info.string_tables.push(VersionStringTable {
                        key: table.key,
                        strings,
                    });
                }
            }
            "VarFileInfo" => {
                for var in children(blob, child.children.clone())? {
                    if var.key != "Translation" {
                        continue;
                    }
                    info.translations.extend(var.value.chunks_exact(4).map(|pair| {
                        (
                            u16::from_le_bytes([pair[0], pair[1]]),
                            u16::from_le_bytes([pair[2], pair[3]]),
                        )
                    }));
                }
            }
            _ => {}
        }
    }

    Ok(info)
}
