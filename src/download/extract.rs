//! Payload extraction
//!
//! Published payloads are usually zip archives holding the asset under an
//! arbitrary entry name. Entries are written to the asset's own path; any
//! payload that is not a zip archive is written unchanged.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use zip::ZipArchive;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid zip payload: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Write `payload` to `dest`, unpacking a zip archive first. Returns bytes written.
pub fn write_payload(payload: &[u8], dest: &Path) -> Result<u64, ExtractError> {
    let io_err = |source: io::Error| ExtractError::Io {
        path: dest.display().to_string(),
        source,
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    if payload.get(..4) != Some(&ZIP_MAGIC[..]) {
        fs::write(dest, payload).map_err(io_err)?;
        return Ok(payload.len() as u64);
    }

    let mut archive = ZipArchive::new(Cursor::new(payload))?;
    let mut written = 0u64;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        // The declared size comes from the archive header and is not trusted
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(io_err)?;
        fs::write(dest, &data).map_err(io_err)?;
        written += data.len() as u64;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn zip_with(name: &str, contents: &[u8]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_raw_payload_written_as_is() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a/b/c.bytes");
        assert_eq!(write_payload(b"plain", &dest).unwrap(), 5);
        assert_eq!(fs::read(&dest).unwrap(), b"plain");
    }

    #[test]
    fn test_zip_entry_written_to_asset_path() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("gamedata/excel/skill_table.bytes");
        let payload = zip_with("whatever_name.dat", b"table-bytes");

        assert_eq!(write_payload(&payload, &dest).unwrap(), 11);
        assert_eq!(fs::read(&dest).unwrap(), b"table-bytes");
    }

    #[test]
    fn test_declared_entry_size_does_not_drive_allocation() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("x.bytes");
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer.start_file("x", stored).unwrap();
        writer.write_all(b"data").unwrap();
        let mut payload = writer.finish().unwrap().into_inner();

        // Claim a ~4 GiB uncompressed size in the central directory
        let central = payload.windows(4).position(|w| w == b"PK\x01\x02").unwrap();
        payload[central + 24..central + 28].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        assert_eq!(write_payload(&payload, &dest).unwrap(), 4);
        assert_eq!(fs::read(&dest).unwrap(), b"data");
    }

    #[test]
    fn test_truncated_zip_is_error() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("x.bytes");
        let mut payload = zip_with("x", b"data");
        payload.truncate(10);
        assert!(matches!(write_payload(&payload, &dest), Err(ExtractError::Zip(_))));
    }
}
