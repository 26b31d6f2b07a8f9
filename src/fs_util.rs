use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::DecodeFailure;

/// Name of the only member a raw capture archive carries.
pub const RAW_MEMBER: &str = "data";

/// Reads the sample bytes out of a single-member raw capture archive.
///
/// The member must hold exactly `expected` bytes; the declared size is checked
/// before anything is allocated and the read never goes past `expected + 1`.
pub fn read_raw_member(payload: &[u8], expected: usize) -> Result<Vec<u8>, DecodeFailure> {
    let mut archive = ZipArchive::new(Cursor::new(payload))
        .map_err(|err| DecodeFailure::InvalidContainer(err.to_string()))?;
    if archive.len() != 1 {
        return Err(DecodeFailure::InvalidContainer(format!(
            "expected a single member, found {}",
            archive.len()
        )));
    }

    let entry = archive
        .by_name(RAW_MEMBER)
        .map_err(|err| DecodeFailure::InvalidContainer(format!("member {RAW_MEMBER}: {err}")))?;
    let declared = entry.size();
    if declared != expected as u64 {
        return Err(DecodeFailure::SizeMismatch {
            expected,
            actual: usize::try_from(declared).unwrap_or(usize::MAX),
        });
    }

    let mut content = Vec::with_capacity(expected);
    entry
        .take(expected as u64 + 1)
        .read_to_end(&mut content)
        .map_err(|err| DecodeFailure::InvalidContainer(err.to_string()))?;
    if content.len() != expected {
        return Err(DecodeFailure::SizeMismatch {
            expected,
            actual: content.len(),
        });
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn archive(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn reads_data_member() {
        let payload = archive(&[("data", &[1, 2, 3, 4])]);
        assert_eq!(read_raw_member(&payload, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    fn set_declared_size(payload: &mut [u8], size: u32) {
        // Uncompressed size sits at offset 22 of the local header and 24 of the
        // central directory header.
        for (signature, offset) in [([0x50, 0x4b, 0x03, 0x04], 22), ([0x50, 0x4b, 0x01, 0x02], 24)] {
            let start = payload
                .windows(4)
                .position(|window| window == signature)
                .unwrap();
            payload[start + offset..start + offset + 4].copy_from_slice(&size.to_le_bytes());
        }
    }

    #[test]
    fn huge_declared_size_is_size_mismatch() {
        let mut payload = archive(&[("data", &[1, 2, 3, 4])]);
        set_declared_size(&mut payload, 0x7fff_0000);
        assert_eq!(
            read_raw_member(&payload, 4).unwrap_err(),
            DecodeFailure::SizeMismatch {
                expected: 4,
                actual: 0x7fff_0000
            }
        );
    }

    #[test]
    fn declared_size_must_match_expected() {
        let payload = archive(&[("data", &[1, 2, 3, 4])]);
        assert_eq!(
            read_raw_member(&payload, 8).unwrap_err(),
            DecodeFailure::SizeMismatch {
                expected: 8,
                actual: 4
            }
        );
    }

    #[test]
    fn rejects_plain_bytes() {
        let err = read_raw_member(&[0u8; 16], 16).unwrap_err();
        assert!(matches!(err, DecodeFailure::InvalidContainer(_)));
    }

    #[test]
    fn rejects_wrong_member_name() {
        let payload = archive(&[("image.raw", &[1, 2])]);
        assert!(matches!(
            read_raw_member(&payload, 2),
            Err(DecodeFailure::InvalidContainer(_))
        ));
    }

    #[test]
    fn rejects_extra_members() {
        let payload = archive(&[("data", &[1]), ("extra", &[2])]);
        assert!(matches!(
            read_raw_member(&payload, 2),
            Err(DecodeFailure::InvalidContainer(_))
        ));
    }
}
