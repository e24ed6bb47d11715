use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// Content ID for change detection (xxh64 over the exact bytes)
pub type ContentId = String;

pub fn content_id(text: &str) -> ContentId {
    let h = xxhash_rust::xxh64::xxh64(text.as_bytes(), 0);
    format!("{:016x}", h)
}

/// Read a UTF-8 text file; large files go through a memory map.
/// Invalid UTF-8 is an error, never silently replaced.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD {
        let file =
            File::open(path).with_context(|| format!("Failed to open file {}", path.display()))?;

        // Safety: read-only map; the pipeline owns the file for the run
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to memory-map {}", path.display()))?;

        let text = std::str::from_utf8(&mmap)
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        Ok(text.to_string())
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read file {}", path.display()))
    }
}

/// Atomic write: same-dir temp file, fsync, rename over the target.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    // Preserve original permissions
    let perms = fs::metadata(path).map(|m| m.permissions()).ok();

    let tmp = match tempfile::NamedTempFile::new_in(dir) {
        Ok(t) => t,
        Err(_) => tempfile::NamedTempFile::new()?, // fallback to /tmp
    };

    let mut file = tmp.as_file();
    file.write_all(data)?;
    file.sync_all()?;

    if let Some(perms) = perms {
        fs::set_permissions(tmp.path(), perms).context("set temp permissions")?;
    }

    match tmp.persist(path) {
        Ok(_) => {}
        Err(e) => {
            // Different filesystem? Copy instead
            fs::copy(e.file.path(), path)
                .with_context(|| format!("Failed to replace {}", path.display()))?;
        }
    }

    // fsync parent dir so the rename is durable
    #[cfg(unix)]
    {
        if let Ok(parent_file) = File::open(dir) {
            let _ = parent_file.sync_all();
        }
    }

    Ok(())
}
