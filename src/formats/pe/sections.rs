//! Section management for PE files

use crate::formats::pe::types::*;
use crate::formats::pe::utils::{calculate_entropy, ReadExt};

/// Section table for RVA resolution.
///
/// Sections keep their on-disk declaration order; a separate index sorted by
/// virtual address backs the binary search.
#[derive(Debug, Clone)]
pub struct SectionTable {
    sections: Vec<Section>,
    by_address: Vec<usize>,
}

impl SectionTable {
    /// Create a new section table
    pub fn new(sections: Vec<Section>) -> Self {
        let mut by_address: Vec<usize> = (0..sections.len()).collect();
        by_address.sort_by_key(|&i| sections[i].header.virtual_address);
        Self {
            sections,
            by_address,
        }
    }

    /// Sections in declaration order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Find section by name
    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.header.name() == name)
    }

    /// Find section containing RVA
    pub fn section_containing_rva(&self, rva: u32) -> Option<&Section> {
        let idx = self
            .by_address
            .binary_search_by(|&i| {
                let header = &self.sections[i].header;
                let size = header.virtual_size.max(header.size_of_raw_data);
                if rva < header.virtual_address {
                    std::cmp::Ordering::Greater
                } else if rva - header.virtual_address >= size {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()?;
        Some(&self.sections[self.by_address[idx]])
    }

    /// Convert RVA to file offset.
    ///
    /// RVAs that fall in the zero-filled tail of a section have no file
    /// backing and resolve to `None`.
    #[inline]
    pub fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        let section = self.section_containing_rva(rva)?;
        let delta = rva - section.header.virtual_address;
        if delta >= section.header.size_of_raw_data {
            return None;
        }
        Some(section.header.pointer_to_raw_data as usize + delta as usize)
    }

    /// Convert file offset to RVA
    pub fn offset_to_rva(&self, offset: usize) -> Option<u32> {
        self.sections.iter().find_map(|section| {
            let raw_start = section.header.pointer_to_raw_data as usize;
            let raw_end = raw_start + section.header.size_of_raw_data as usize;
            if offset < raw_start || offset >= raw_end {
                return None;
            }
            section
                .header
                .virtual_address
                .checked_add((offset - raw_start) as u32)
        })
    }

    /// Get the entry point section
    pub fn entry_section(&self, entry_rva: u32) -> Option<&Section> {
        self.section_containing_rva(entry_rva)
    }
}

/// Parse section headers from data
pub fn parse_section_headers(data: &[u8], offset: usize, count: u16) -> Result<Vec<SectionHeader>> {
    let mut sections = Vec::with_capacity(count as usize);

    for i in 0..count {
        let section_offset = offset + (i as usize * 40);
        let raw = data
            .read_slice_at(section_offset, 40)
            .ok_or(PeError::TruncatedHeader {
                expected: section_offset + 40,
                actual: data.len(),
            })?;

        let mut name = [0u8; 8];
        name.copy_from_slice(&raw[..8]);

        // The slice is exactly 40 bytes, so every field read below succeeds.
        let u32_at = |o: usize| raw.read_u32_le_at(o).unwrap_or_default();
        let u16_at = |o: usize| raw.read_u16_le_at(o).unwrap_or_default();

        sections.push(SectionHeader {
            name,
            virtual_size: u32_at(8),
            virtual_address: u32_at(12),
            size_of_raw_data: u32_at(16),
            pointer_to_raw_data: u32_at(20),
            pointer_to_relocations: u32_at(24),
            pointer_to_line_numbers: u32_at(28),
            number_of_relocations: u16_at(32),
            number_of_line_numbers: u16_at(34),
            characteristics: u32_at(36),
        });
    }

    Ok(sections)
}

/// Create section objects with data ranges
pub fn create_sections(headers: Vec<SectionHeader>) -> Vec<Section> {
    headers
        .into_iter()
        .map(|header| {
            let start = header.pointer_to_raw_data as usize;
            let end = start + header.size_of_raw_data as usize;
            Section {
                header,
                data: start..end,
            }
        })
        .collect()
}

impl Section {
    /// Get section data from the file
    pub fn data<'a>(&self, file_data: &'a [u8]) -> Option<&'a [u8]> {
        file_data.get(self.data.clone())
    }

    /// Calculate entropy of section data
    pub fn entropy(&self, file_data: &[u8]) -> Option<f64> {
        self.data(file_data).map(calculate_entropy)
    }
}
