//! TLS directory parsing

use crate::formats::pe::sections::SectionTable;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;

/// Parse the TLS directory and walk its callback array.
///
/// Callback addresses are virtual addresses; they are returned as stored.
pub fn parse_tls_directory(
    data: &[u8],
    sections: &SectionTable,
    tls_dir: &DataDirectory,
    image_base: u64,
    is_64bit: bool,
    options: &ParseOptions,
) -> Result<Option<TlsDirectory>> {
    if !tls_dir.is_present() {
        return Ok(None);
    }

    let offset = sections
        .rva_to_offset(tls_dir.virtual_address)
        .ok_or(PeError::InvalidRva {
            rva: tls_dir.virtual_address,
        })?;

    let ptr_size = if is_64bit { 8 } else { 4 };
    let read_ptr = |at: usize| -> Option<u64> {
        if is_64bit {
            data.read_u64_le_at(at)
        } else {
            data.read_u32_le_at(at).map(u64::from)
        }
    };
    let field = |index: usize| read_ptr(offset + index * ptr_size).ok_or(PeError::MalformedTlsDirectory);

    let mut tls = TlsDirectory {
        start_address_of_raw_data: field(0)?,
        end_address_of_raw_data: field(1)?,
        address_of_index: field(2)?,
        address_of_callbacks: field(3)?,
        size_of_zero_fill: data
            .read_u32_le_at(offset + 4 * ptr_size)
            .ok_or(PeError::MalformedTlsDirectory)?,
        characteristics: data
            .read_u32_le_at(offset + 4 * ptr_size + 4)
            .ok_or(PeError::MalformedTlsDirectory)?,
        callbacks: Vec::new(),
    };

    if tls.address_of_callbacks > image_base {
        let callbacks_rva = (tls.address_of_callbacks - image_base) as u32;
        if let Some(mut at) = sections.rva_to_offset(callbacks_rva) {
            while tls.callbacks.len() < options.max_tls_callbacks {
                match read_ptr(at) {
                    Some(0) | None => break,
                    Some(va) => tls.callbacks.push(va),
                }
                at += ptr_size;
            }
        }
    }

    Ok(Some(tls))
}
