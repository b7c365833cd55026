//! Attribute certificate table parsing
//!
//! The security data directory holds a file offset, not an RVA.

use crate::formats::pe::types::*;
use crate::formats::pe::utils::{align_up, ReadExt};

const MAX_CERTIFICATES: usize = 32;

/// Display name of a `WIN_CERT_TYPE_*` value
pub fn certificate_type_name(kind: u16) -> &'static str {
    match kind {
        1 => "X509",
        2 => "PKCS_SIGNED_DATA",
        3 => "RESERVED_1",
        4 => "TS_STACK_SIGNED",
        _ => "UNKNOWN",
    }
}

/// Parse the `WIN_CERTIFICATE` entries of the certificate table
pub fn parse_certificates(data: &[u8], security_dir: &DataDirectory) -> Result<Vec<Certificate>> {
    if !security_dir.is_present() {
        return Ok(Vec::new());
    }

    let start = security_dir.virtual_address as usize;
    let end = start
        .checked_add(security_dir.size as usize)
        .filter(|&end| end <= data.len())
        .ok_or(PeError::MalformedCertificateTable)?;

    let mut certificates = Vec::new();
    let mut offset = start;

    while offset + 8 <= end && certificates.len() < MAX_CERTIFICATES {
        let length = data
            .read_u32_le_at(offset)
            .ok_or(PeError::MalformedCertificateTable)?;
        let revision = data
            .read_u16_le_at(offset + 4)
            .ok_or(PeError::MalformedCertificateTable)?;
        let certificate_type = data
            .read_u16_le_at(offset + 6)
            .ok_or(PeError::MalformedCertificateTable)?;

        if length < 8 || offset + length as usize > end {
            return Err(PeError::MalformedCertificateTable);
        }

        certificates.push(Certificate {
            offset: offset as u32,
            length,
            revision,
            certificate_type,
            data: data[offset + 8..offset + length as usize].to_vec(),
        });

        offset = align_up(offset + length as usize, 8);
    }

    Ok(certificates)
}
