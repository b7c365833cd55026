//! Utility functions for PE parsing

use crate::formats::pe::types::{PeError, Result};

/// Extension trait for reading primitive types from byte slices
pub trait ReadExt {
    fn read_u8_at(&self, offset: usize) -> Option<u8>;
    fn read_u16_le_at(&self, offset: usize) -> Option<u16>;
    fn read_u32_le_at(&self, offset: usize) -> Option<u32>;
    fn read_u64_le_at(&self, offset: usize) -> Option<u64>;
    fn read_cstring_at(&self, offset: usize, max_len: usize) -> Option<&str>;
    fn read_slice_at(&self, offset: usize, len: usize) -> Option<&[u8]>;
}

impl ReadExt for [u8] {
    #[inline(always)]
    fn read_u8_at(&self, offset: usize) -> Option<u8> {
        self.get(offset).copied()
    }

    #[inline(always)]
    fn read_u16_le_at(&self, offset: usize) -> Option<u16> {
        self.get(offset..offset.checked_add(2)?)
            .and_then(|b| b.try_into().ok())
            .map(u16::from_le_bytes)
    }

    #[inline(always)]
    fn read_u32_le_at(&self, offset: usize) -> Option<u32> {
        self.get(offset..offset.checked_add(4)?)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
    }

    #[inline(always)]
    fn read_u64_le_at(&self, offset: usize) -> Option<u64> {
        self.get(offset..offset.checked_add(8)?)
            .and_then(|b| b.try_into().ok())
            .map(u64::from_le_bytes)
    }

    fn read_cstring_at(&self, offset: usize, max_len: usize) -> Option<&str> {
        let end = offset.saturating_add(max_len).min(self.len());
        let slice = self.get(offset..end)?;

        // Find null terminator
        let len = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        std::str::from_utf8(&slice[..len]).ok()
    }

    #[inline(always)]
    fn read_slice_at(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.get(offset..offset.checked_add(len)?)
    }
}

/// Helper to read a null-terminated string from a buffer
pub fn read_cstring(data: &[u8], offset: usize, max_len: usize) -> Result<&str> {
    data.read_cstring_at(offset, max_len)
        .ok_or(PeError::InvalidString)
}

/// Helper to read a null-terminated UTF-16LE string from a buffer.
///
/// Returns the string and the number of bytes consumed, terminator included.
pub fn read_utf16le_string(data: &[u8], offset: usize, max_len: usize) -> Result<(String, usize)> {
    let end = offset.saturating_add(max_len.saturating_mul(2)).min(data.len());
    if offset >= end {
        return Err(PeError::InvalidOffset { offset });
    }

    let slice = &data[offset..end];
    let mut words = Vec::new();
    let mut consumed = 0;

    for pair in slice.chunks_exact(2) {
        consumed += 2;
        let word = u16::from_le_bytes([pair[0], pair[1]]);
        if word == 0 {
            break;
        }
        words.push(word);
    }

    let text = String::from_utf16(&words).map_err(|_| PeError::InvalidString)?;
    Ok((text, consumed))
}

/// Read exactly `count` UTF-16LE code units (no terminator).
pub fn read_utf16le_units(data: &[u8], offset: usize, count: usize) -> Result<String> {
    let bytes = data
        .read_slice_at(offset, count.saturating_mul(2))
        .ok_or(PeError::InvalidOffset { offset })?;
    let words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&words))
}

/// Format a 16-byte little-endian GUID in registry form.
pub fn format_guid(bytes: &[u8; 16]) -> String {
    let d1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let d2 = u16::from_le_bytes([bytes[4], bytes[5]]);
    let d3 = u16::from_le_bytes([bytes[6], bytes[7]]);
    format!(
        "{:08X}-{:04X}-{:04X}-{}-{}",
        d1,
        d2,
        d3,
        hex::encode_upper(&bytes[8..10]),
        hex::encode_upper(&bytes[10..16])
    )
}

/// Calculate entropy of a byte slice
pub fn calculate_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &counts {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }

    entropy
}

/// Align a value up to the specified alignment
#[inline(always)]
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        value
    } else {
        (value + alignment - 1) & !(alignment - 1)
    }
}

/// Check if a range is within bounds
#[inline(always)]
pub fn check_bounds(offset: usize, size: usize, data_len: usize) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= data_len => Ok(()),
        _ => Err(PeError::InvalidOffset { offset }),
    }
}

/// PE image checksum as computed by the Windows loader
pub fn calculate_pe_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let mut sum = 0u64;
    let mut i = 0;

    // Sum all 16-bit words
    while i < data.len() {
        // Skip the checksum field itself
        if i == checksum_offset || i == checksum_offset + 2 {
            i += 2;
            continue;
        }

        let word = if i + 1 < data.len() {
            u16::from_le_bytes([data[i], data[i + 1]]) as u64
        } else {
            data[i] as u64
        };

        sum = sum.wrapping_add(word);
        sum = (sum & 0xFFFF) + (sum >> 16);
        i += 2;
    }

    // Fold carries
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    // Add file size
    sum.wrapping_add(data.len() as u64) as u32
}
