//! Atomic file replacement: write a unique temp file next to the target, then rename.
//!
//! Readers see either the old file or the new one, never a partial write.
//! Temp files are named `.{file_name}.{ulid}.tmp` so concurrent writers never
//! share one and directory listings can skip them.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use ulid::Ulid;

pub const TMP_SUFFIX: &str = ".tmp";

pub async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path(path)?;
    let result = write_then_rename(&tmp, path, bytes).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

/// True for names produced by `write_atomic` for its temp files.
pub fn is_tmp_name(file_name: &str) -> bool {
    file_name.starts_with('.') && file_name.ends_with(TMP_SUFFIX)
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp, path).await
}

fn tmp_path(path: &Path) -> io::Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    Ok(path.with_file_name(format!(".{name}.{}{TMP_SUFFIX}", Ulid::new())))
}
