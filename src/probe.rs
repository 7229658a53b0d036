//! Best-effort file metadata used when a task is enqueued and dispatched.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Local};
use memchr::memmem;
use tracing::trace;

/// `VS_FIXEDFILEINFO.dwSignature` as it appears on disk.
const FIXED_FILE_INFO_SIGNATURE: [u8; 4] = 0xFEEF_04BDu32.to_le_bytes();

/// Signature, struct version, then the two file-version dwords.
const FIXED_FILE_INFO_PREFIX: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

/// Size and modification time; a failed stat yields zero size and no time.
pub fn stat(path: &Path) -> FileStat {
    match std::fs::metadata(path) {
        Ok(meta) => FileStat {
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
        },
        Err(err) => {
            trace!("stat failed for {}: {err}", path.display());
            FileStat::default()
        }
    }
}

/// Version string of a PE image (`major.minor.build.revision`), if it carries one.
///
/// Only files no larger than `scan_limit` are considered, and only the two
/// header bytes are read unless they are `MZ`.
pub fn file_version(path: &Path, scan_limit: u64) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    if len < 2 || len > scan_limit {
        return None;
    }
    read_version(&mut file, len)
}

pub(crate) fn read_version<R: Read>(reader: &mut R, len: u64) -> Option<String> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic).ok()?;
    if &magic != b"MZ" {
        return None;
    }
    let mut image = Vec::with_capacity(len as usize);
    image.extend_from_slice(&magic);
    reader.read_to_end(&mut image).ok()?;
    version_from_image(&image)
}

pub(crate) fn version_from_image(image: &[u8]) -> Option<String> {
    if !image.starts_with(b"MZ") {
        return None;
    }
    let at = memmem::find(image, &FIXED_FILE_INFO_SIGNATURE)?;
    let info = image.get(at..at + FIXED_FILE_INFO_PREFIX)?;
    let ms = u32::from_le_bytes([info[8], info[9], info[10], info[11]]);
    let ls = u32::from_le_bytes([info[12], info[13], info[14], info[15]]);
    Some(format!(
        "{}.{}.{}.{}",
        ms >> 16,
        ms & 0xFFFF,
        ls >> 16,
        ls & 0xFFFF
    ))
}
