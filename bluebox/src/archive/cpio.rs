//! Streaming CPIO archive writer (newc format)
//!
//! The newc format uses ASCII headers (110 bytes each) followed by the
//! NUL-terminated filename and the file data, both padded to 4 bytes.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use tracing::debug;

use super::{ArchiveEntry, ArchiveSummary};

const MAGIC: &str = "070701";
const HEADER_LEN: usize = 110;
const TRAILER: &str = "TRAILER!!!";
const S_IFREG: u32 = 0o100000;
const S_IFMT: u32 = 0o170000;

/// Writes regular files into a newc stream in insertion order.
///
/// Entry names must be unique. [`CpioWriter::finish`] writes the trailer;
/// a writer dropped without finishing leaves a truncated archive.
pub struct CpioWriter<W: Write> {
    inner: W,
    names: HashSet<String>,
    entries: Vec<ArchiveEntry>,
    next_ino: u32,
    written: u64,
}

impl<W: Write> CpioWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            names: HashSet::new(),
            entries: Vec::new(),
            next_ino: 1,
            written: 0,
        }
    }

    /// Write one record: header, name, exactly `size` bytes from `reader`.
    pub fn add_entry<R: Read>(
        &mut self,
        name: &str,
        permissions: u32,
        size: u64,
        reader: R,
    ) -> BlueboxResult<()> {
        validate_name(name)?;
        if self.names.contains(name) {
            return Err(BlueboxError::DuplicateEntry(name.to_string()));
        }
        let filesize = u32::try_from(size).map_err(|_| {
            BlueboxError::Archive(format!(
                "{} is {} bytes, newc entries are limited to 4 GiB",
                name, size
            ))
        })?;

        let ino = self.next_ino;
        self.next_ino += 1;

        let namesize = name.len() + 1;
        let mode = S_IFREG | (permissions & 0o7777);
        let header = format_header(ino, mode, 1, filesize, namesize as u32);
        self.write_raw(header.as_bytes())?;
        self.write_raw(name.as_bytes())?;
        self.write_raw(&[0])?;
        self.pad(HEADER_LEN + namesize)?;

        let copied = io::copy(&mut reader.take(size), &mut self.inner)?;
        if copied != size {
            return Err(BlueboxError::Archive(format!(
                "{}: expected {} bytes but the source ended after {}",
                name, size, copied
            )));
        }
        self.written += copied;
        self.pad(size as usize)?;

        debug!(name, size, "archived entry");
        self.names.insert(name.to_string());
        self.entries.push(ArchiveEntry {
            name: name.to_string(),
            permissions: permissions & 0o7777,
            size,
        });
        Ok(())
    }

    /// Add the regular file at `path` as `name`, keeping its permission bits.
    pub fn add_file_as(&mut self, name: &str, path: &Path) -> BlueboxResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let file = File::open(path).map_err(|e| {
            BlueboxError::Archive(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(BlueboxError::NotRegularFile(path.to_path_buf()));
        }
        self.add_entry(name, meta.permissions().mode(), meta.len(), file)
    }

    /// Write the trailer and flush.
    pub fn finish(mut self) -> BlueboxResult<ArchiveSummary> {
        let namesize = TRAILER.len() + 1;
        let header = format_header(0, 0, 1, 0, namesize as u32);
        self.write_raw(header.as_bytes())?;
        self.write_raw(TRAILER.as_bytes())?;
        self.write_raw(&[0])?;
        self.pad(HEADER_LEN + namesize)?;
        self.inner.flush()?;

        Ok(ArchiveSummary {
            entries: self.entries,
            bytes: self.written,
        })
    }

    fn write_raw(&mut self, buf: &[u8]) -> BlueboxResult<()> {
        self.inner.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn pad(&mut self, len: usize) -> BlueboxResult<()> {
        let pad = align_to_4(len) - len;
        if pad > 0 {
            self.write_raw(&[0u8; 3][..pad])?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> BlueboxResult<()> {
    if name.is_empty() || name == "." || name == ".." || name == TRAILER {
        return Err(BlueboxError::Archive(format!("invalid entry name '{}'", name)));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(BlueboxError::Archive(format!(
            "entry name '{}' must be a base name",
            name
        )));
    }
    Ok(())
}

/// Format newc header (110 bytes ASCII)
///
/// Format: "070701" magic + 13 fields, each 8 hex chars. Owner, mtime and
/// device numbers are zero so the output only depends on the inputs.
fn format_header(ino: u32, mode: u32, nlink: u32, filesize: u32, namesize: u32) -> String {
    format!(
        "{MAGIC}\
         {:08X}{:08X}{:08X}{:08X}{:08X}{:08X}{:08X}\
         {:08X}{:08X}{:08X}{:08X}{:08X}{:08X}",
        ino,      // c_ino
        mode,     // c_mode
        0,        // c_uid
        0,        // c_gid
        nlink,    // c_nlink
        0,        // c_mtime
        filesize, // c_filesize
        0,        // c_devmajor
        0,        // c_devminor
        0,        // c_rdevmajor
        0,        // c_rdevminor
        namesize, // c_namesize
        0,        // c_check
    )
}

fn align_to_4(n: usize) -> usize {
    (n + 3) & !3
}

/// Read back every regular file entry of a newc stream, up to the trailer.
///
/// Returns the entries in archive order together with their contents.
pub fn read_entries<R: Read>(mut reader: R) -> BlueboxResult<Vec<(ArchiveEntry, Vec<u8>)>> {
    let mut entries = Vec::new();
    loop {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header)?;
        if &header[..6] != MAGIC.as_bytes() {
            return Err(BlueboxError::Archive("bad newc magic".to_string()));
        }
        let field = |i: usize| -> BlueboxResult<u32> {
            let start = 6 + i * 8;
            let text = std::str::from_utf8(&header[start..start + 8])
                .map_err(|_| BlueboxError::Archive("non-ASCII header field".to_string()))?;
            u32::from_str_radix(text, 16)
                .map_err(|_| BlueboxError::Archive(format!("bad header field '{}'", text)))
        };
        let mode = field(1)?;
        let filesize = field(6)? as usize;
        let namesize = field(11)? as usize;

        let mut name = vec![0u8; namesize];
        reader.read_exact(&mut name)?;
        skip(&mut reader, align_to_4(HEADER_LEN + namesize) - (HEADER_LEN + namesize))?;
        name.pop();
        let name = String::from_utf8(name)
            .map_err(|_| BlueboxError::Archive("non UTF-8 entry name".to_string()))?;

        if name == TRAILER {
            return Ok(entries);
        }

        let mut data = vec![0u8; filesize];
        reader.read_exact(&mut data)?;
        skip(&mut reader, align_to_4(filesize) - filesize)?;

        if mode & S_IFMT == S_IFREG {
            entries.push((
                ArchiveEntry {
                    name,
                    permissions: mode & 0o7777,
                    size: filesize as u64,
                },
                data,
            ));
        }
    }
}

fn skip<R: Read>(reader: &mut R, n: usize) -> BlueboxResult<()> {
    let mut buf = [0u8; 3];
    reader.read_exact(&mut buf[..n])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_header_format() {
        let header = format_header(1, 0o100755, 1, 100, 5);
        assert_eq!(header.len(), HEADER_LEN);
        assert!(header.starts_with("070701"));
        assert_eq!(&header[14..22], "000081ED");
    }

    #[test]
    fn test_align_to_4() {
        assert_eq!(align_to_4(0), 0);
        assert_eq!(align_to_4(1), 4);
        assert_eq!(align_to_4(4), 4);
        assert_eq!(align_to_4(5), 8);
    }

    #[test]
    fn entries_keep_insertion_order_and_mode() {
        let mut out = Vec::new();
        let mut writer = CpioWriter::new(&mut out);
        writer.add_entry("init", 0o755, 5, &b"stage"[..]).unwrap();
        writer.add_entry("data.bin", 0o444, 3, &b"abc"[..]).unwrap();
        let summary = writer.finish().unwrap();

        assert_eq!(summary.names(), vec!["init", "data.bin"]);
        assert_eq!(summary.bytes, out.len() as u64);
        assert_eq!(out.len() % 4, 0);

        let entries = read_entries(Cursor::new(&out)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.permissions, 0o755);
        assert_eq!(entries[0].1, b"stage");
        assert_eq!(entries[1].0.name, "data.bin");
        assert_eq!(entries[1].0.permissions, 0o444);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut writer = CpioWriter::new(Vec::new());
        writer.add_entry("date", 0o755, 0, io::empty()).unwrap();
        let err = writer.add_entry("date", 0o755, 0, io::empty()).unwrap_err();
        assert!(matches!(err, BlueboxError::DuplicateEntry(n) if n == "date"));
    }

    #[test]
    fn short_source_is_an_error() {
        let mut writer = CpioWriter::new(Vec::new());
        let err = writer.add_entry("short", 0o644, 10, &b"abc"[..]).unwrap_err();
        assert!(matches!(err, BlueboxError::Archive(_)));
    }

    #[test]
    fn paths_are_not_entry_names() {
        let mut writer = CpioWriter::new(Vec::new());
        assert!(writer.add_entry("bin/sh", 0o755, 0, io::empty()).is_err());
        assert!(writer.add_entry("", 0o755, 0, io::empty()).is_err());
        assert!(writer.add_entry(TRAILER, 0o755, 0, io::empty()).is_err());
    }

    #[test]
    fn directory_is_not_a_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CpioWriter::new(Vec::new());
        let err = writer.add_file_as("somedir", dir.path()).unwrap_err();
        assert!(matches!(err, BlueboxError::NotRegularFile(_)));
    }

    #[test]
    fn empty_archive_is_just_a_trailer() {
        let mut out = Vec::new();
        CpioWriter::new(&mut out).finish().unwrap();
        assert!(out.starts_with(b"070701"));
        assert_eq!(out.len(), align_to_4(HEADER_LEN + TRAILER.len() + 1));
        assert!(read_entries(Cursor::new(&out)).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn records_stay_aligned(name in "[a-z][a-z0-9_.-]{0,40}", len in 0usize..64) {
            let data = vec![0xAAu8; len];
            let mut out = Vec::new();
            let mut writer = CpioWriter::new(&mut out);
            writer.add_entry(&name, 0o600, len as u64, &data[..]).unwrap();
            writer.finish().unwrap();
            prop_assert_eq!(out.len() % 4, 0);

            let entries = read_entries(Cursor::new(&out)).unwrap();
            prop_assert_eq!(entries.len(), 1);
            prop_assert_eq!(&entries[0].0.name, &name);
            prop_assert_eq!(&entries[0].1, &data);
        }
    }
}
