//! PE header parsing

use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;

fn truncated(expected: usize, data: &[u8]) -> PeError {
    PeError::TruncatedHeader {
        expected,
        actual: data.len(),
    }
}

fn u8_at(data: &[u8], offset: usize) -> Result<u8> {
    data.read_u8_at(offset).ok_or(truncated(offset + 1, data))
}

fn u16_at(data: &[u8], offset: usize) -> Result<u16> {
    data.read_u16_le_at(offset).ok_or(truncated(offset + 2, data))
}

fn u32_at(data: &[u8], offset: usize) -> Result<u32> {
    data.read_u32_le_at(offset).ok_or(truncated(offset + 4, data))
}

fn u64_at(data: &[u8], offset: usize) -> Result<u64> {
    data.read_u64_le_at(offset).ok_or(truncated(offset + 8, data))
}

/// Parse DOS header from data
pub fn parse_dos_header(data: &[u8]) -> Result<DosHeader> {
    if data.len() < 64 {
        return Err(truncated(64, data));
    }

    let e_magic = u16_at(data, 0)?;
    if e_magic != DOS_SIGNATURE {
        return Err(PeError::InvalidDosSignature);
    }

    Ok(DosHeader {
        e_magic,
        e_cblp: u16_at(data, 2)?,
        e_cp: u16_at(data, 4)?,
        e_crlc: u16_at(data, 6)?,
        e_cparhdr: u16_at(data, 8)?,
        e_minalloc: u16_at(data, 10)?,
        e_maxalloc: u16_at(data, 12)?,
        e_ss: u16_at(data, 14)?,
        e_sp: u16_at(data, 16)?,
        e_csum: u16_at(data, 18)?,
        e_ip: u16_at(data, 20)?,
        e_cs: u16_at(data, 22)?,
        e_lfarlc: u16_at(data, 24)?,
        e_ovno: u16_at(data, 26)?,
        e_oemid: u16_at(data, 36)?,
        e_oeminfo: u16_at(data, 38)?,
        e_lfanew: u32_at(data, 60)?,
    })
}

/// Parse COFF header from data at offset
pub fn parse_coff_header(data: &[u8], offset: usize) -> Result<CoffHeader> {
    if offset + 20 > data.len() {
        return Err(truncated(offset + 20, data));
    }

    Ok(CoffHeader {
        machine: Machine::from(u16_at(data, offset)?),
        number_of_sections: u16_at(data, offset + 2)?,
        time_date_stamp: u32_at(data, offset + 4)?,
        pointer_to_symbol_table: u32_at(data, offset + 8)?,
        number_of_symbols: u32_at(data, offset + 12)?,
        size_of_optional_header: u16_at(data, offset + 16)?,
        characteristics: u16_at(data, offset + 18)?,
    })
}

/// Parse optional header from data at offset
pub fn parse_optional_header(data: &[u8], offset: usize, size: u16) -> Result<OptionalHeader> {
    if size < 2 {
        return Err(truncated(offset + 2, data));
    }

    if offset + size as usize > data.len() {
        return Err(truncated(offset + size as usize, data));
    }

    let magic = u16_at(data, offset)?;

    match magic {
        PE32_MAGIC => parse_optional_header32(data, offset, size),
        PE32PLUS_MAGIC => parse_optional_header64(data, offset, size),
        _ => Err(PeError::InvalidMagic(magic)),
    }
}

fn parse_common(data: &[u8], offset: usize) -> Result<OptionalHeaderCommon> {
    Ok(OptionalHeaderCommon {
        magic: u16_at(data, offset)?,
        major_linker_version: u8_at(data, offset + 2)?,
        minor_linker_version: u8_at(data, offset + 3)?,
        size_of_code: u32_at(data, offset + 4)?,
        size_of_initialized_data: u32_at(data, offset + 8)?,
        size_of_uninitialized_data: u32_at(data, offset + 12)?,
        address_of_entry_point: u32_at(data, offset + 16)?,
        base_of_code: u32_at(data, offset + 20)?,
    })
}

/// Fields from section alignment through the image checksum and subsystem
/// sit at the same offsets in both layouts.
fn parse_windows_fields(
    data: &[u8],
    offset: usize,
    image_base: u64,
    wide: bool,
) -> Result<OptionalHeaderWindows> {
    let (stack_reserve, stack_commit, heap_reserve, heap_commit, tail) = if wide {
        (
            u64_at(data, offset + 72)?,
            u64_at(data, offset + 80)?,
            u64_at(data, offset + 88)?,
            u64_at(data, offset + 96)?,
            offset + 104,
        )
    } else {
        (
            u32_at(data, offset + 72)? as u64,
            u32_at(data, offset + 76)? as u64,
            u32_at(data, offset + 80)? as u64,
            u32_at(data, offset + 84)? as u64,
            offset + 88,
        )
    };

    Ok(OptionalHeaderWindows {
        image_base,
        section_alignment: u32_at(data, offset + 32)?,
        file_alignment: u32_at(data, offset + 36)?,
        major_operating_system_version: u16_at(data, offset + 40)?,
        minor_operating_system_version: u16_at(data, offset + 42)?,
        major_image_version: u16_at(data, offset + 44)?,
        minor_image_version: u16_at(data, offset + 46)?,
        major_subsystem_version: u16_at(data, offset + 48)?,
        minor_subsystem_version: u16_at(data, offset + 50)?,
        win32_version_value: u32_at(data, offset + 52)?,
        size_of_image: u32_at(data, offset + 56)?,
        size_of_headers: u32_at(data, offset + 60)?,
        checksum: u32_at(data, offset + 64)?,
        subsystem: Subsystem::from(u16_at(data, offset + 68)?),
        dll_characteristics: u16_at(data, offset + 70)?,
        size_of_stack_reserve: stack_reserve,
        size_of_stack_commit: stack_commit,
        size_of_heap_reserve: heap_reserve,
        size_of_heap_commit: heap_commit,
        loader_flags: u32_at(data, tail)?,
        number_of_rva_and_sizes: u32_at(data, tail + 4)?,
    })
}

fn parse_optional_header32(data: &[u8], offset: usize, size: u16) -> Result<OptionalHeader> {
    if size < 96 {
        return Err(PeError::TruncatedHeader {
            expected: offset + 96,
            actual: offset + size as usize,
        });
    }

    let common = parse_common(data, offset)?;
    let base_of_data = u32_at(data, offset + 24)?;
    let image_base = u32_at(data, offset + 28)? as u64;
    let windows = parse_windows_fields(data, offset, image_base, false)?;

    Ok(OptionalHeader::Pe32 {
        common,
        base_of_data,
        windows,
    })
}

fn parse_optional_header64(data: &[u8], offset: usize, size: u16) -> Result<OptionalHeader> {
    if size < 112 {
        return Err(PeError::TruncatedHeader {
            expected: offset + 112,
            actual: offset + size as usize,
        });
    }

    let common = parse_common(data, offset)?;
    let image_base = u64_at(data, offset + 24)?;
    let windows = parse_windows_fields(data, offset, image_base, true)?;

    Ok(OptionalHeader::Pe32Plus { common, windows })
}

/// Parse data directories from data at offset
pub fn parse_data_directories(data: &[u8], offset: usize, count: u32) -> Vec<DataDirectory> {
    let count = count.min(16) as usize; // Maximum 16 directories
    let mut directories = Vec::with_capacity(16);

    for i in 0..count {
        let dir_offset = offset + i * 8;
        match (
            data.read_u32_le_at(dir_offset),
            data.read_u32_le_at(dir_offset + 4),
        ) {
            (Some(virtual_address), Some(size)) => directories.push(DataDirectory {
                virtual_address,
                size,
            }),
            _ => break,
        }
    }

    // Pad with empty directories if needed
    directories.resize(16, DataDirectory::default());
    directories
}

/// Parse NT headers (PE signature + COFF + Optional)
pub fn parse_nt_headers(data: &[u8], offset: usize) -> Result<(NtHeaders, Vec<DataDirectory>)> {
    // Check PE signature
    let signature: [u8; 4] = data
        .read_slice_at(offset, 4)
        .and_then(|b| b.try_into().ok())
        .ok_or(truncated(offset + 4, data))?;

    if signature != PE_SIGNATURE {
        return Err(PeError::InvalidPeSignature);
    }

    let coff_header = parse_coff_header(data, offset + 4)?;

    let opt_offset = offset + 24; // 4 (signature) + 20 (COFF)
    let optional_header =
        parse_optional_header(data, opt_offset, coff_header.size_of_optional_header)?;

    // Directories follow the fixed part of the optional header
    let fixed = if optional_header.is_64bit() { 112 } else { 96 };
    let directories = parse_data_directories(
        data,
        opt_offset + fixed,
        optional_header.number_of_rva_and_sizes(),
    );

    let nt_headers = NtHeaders {
        signature,
        file_header: coff_header,
        optional_header,
    };

    Ok((nt_headers, directories))
}

/// Parse security features from DLL characteristics
pub fn parse_security_features(flags: DllCharacteristics) -> SecurityFeatures {
    SecurityFeatures {
        nx_compatible: flags.contains(DllCharacteristics::NX_COMPAT),
        aslr_enabled: flags.contains(DllCharacteristics::DYNAMIC_BASE),
        cfg_enabled: flags.contains(DllCharacteristics::GUARD_CF),
        seh_enabled: !flags.contains(DllCharacteristics::NO_SEH),
        high_entropy_va: flags.contains(DllCharacteristics::HIGH_ENTROPY_VA),
        force_integrity: flags.contains(DllCharacteristics::FORCE_INTEGRITY),
        appcontainer: flags.contains(DllCharacteristics::APPCONTAINER),
    }
}
