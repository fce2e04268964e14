use crate::error::{FlowlineError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Open a file and map it into memory (read-only)
///
/// Returns `None` for an empty file, which cannot be mapped on every platform.
pub fn mmap_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).map_err(|e| {
        FlowlineError::OutputMalformed(format!("Cannot open {}: {}", path.display(), e))
    })?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(mmap))
}
