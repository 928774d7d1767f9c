//! Embedded configuration table.
//!
//! A stage binary carries its configuration at the very end of the file:
//!
//! ```text
//! +----------------+------------------------+-----------------+
//! | payload (JSON) | payload length (u64 LE) | MAGIC (8 bytes) |
//! +----------------+------------------------+-----------------+
//! ```
//!
//! The kernel ignores trailing bytes of an ELF executable, so the table can be
//! appended to a pre-built static binary without relinking it.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constants::table::{FOOTER_LEN, MAGIC};
use crate::errors::{BlueboxError, BlueboxResult};

/// Serialize `config` into table payload bytes.
pub fn render<T: Serialize>(config: &T) -> BlueboxResult<Vec<u8>> {
    Ok(serde_json::to_vec(config)?)
}

/// Append `payload` as a configuration table to `writer`.
pub fn append<W: Write>(writer: &mut W, payload: &[u8]) -> BlueboxResult<()> {
    writer.write_all(payload)?;
    writer.write_all(&(payload.len() as u64).to_le_bytes())?;
    writer.write_all(MAGIC)?;
    Ok(())
}

/// Read the raw payload of the table at the end of `reader`.
///
/// Returns `Ok(None)` if the stream does not end with a table.
pub fn read_payload<R: Read + Seek>(reader: &mut R) -> BlueboxResult<Option<Vec<u8>>> {
    let total = reader.seek(SeekFrom::End(0))?;
    if total < FOOTER_LEN as u64 {
        return Ok(None);
    }

    reader.seek(SeekFrom::End(-(FOOTER_LEN as i64)))?;
    let mut footer = [0u8; FOOTER_LEN];
    reader.read_exact(&mut footer)?;

    if &footer[8..] != MAGIC {
        return Ok(None);
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&footer[..8]);
    let len = u64::from_le_bytes(len_bytes);

    if len > total - FOOTER_LEN as u64 {
        return Err(BlueboxError::Config(format!(
            "configuration table claims {} bytes but only {} precede it",
            len,
            total - FOOTER_LEN as u64
        )));
    }

    reader.seek(SeekFrom::Start(total - FOOTER_LEN as u64 - len))?;
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}

/// Load and decode the configuration table embedded in the binary at `path`.
pub fn load<T: DeserializeOwned>(path: &Path) -> BlueboxResult<T> {
    let mut file = File::open(path).map_err(|e| {
        BlueboxError::Config(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let payload = read_payload(&mut file)?.ok_or_else(|| {
        BlueboxError::Config(format!(
            "{} does not carry a configuration table",
            path.display()
        ))
    })?;

    Ok(serde_json::from_slice(&payload)?)
}
