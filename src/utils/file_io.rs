use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use tracing::debug;
use tracing::error;

use crate::Result;
use crate::StorageError;

pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.exists() {
            if let Err(e) = create_dir_all(parent_dir) {
                error!("Failed to create directory {:?}: {:?}", parent_dir, e);
                return Err(StorageError::PathError {
                    path: parent_dir.to_path_buf(),
                    source: e,
                }
                .into());
            }
        }
    }
    Ok(())
}

pub fn open_file_for_append(path: &Path) -> Result<File> {
    create_parent_dir_if_not_exist(path)?;
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(file)
}

/// Replaces the content of `path` with `buf`.
///
/// Writes a sibling temp file first and renames it over the target, so a
/// reader never observes a half written file.
pub fn write_atomically(
    path: &Path,
    buf: &[u8],
) -> Result<()> {
    create_parent_dir_if_not_exist(path)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    let map_err = |e: std::io::Error| StorageError::PathError {
        path: path.to_path_buf(),
        source: e,
    };
    {
        let mut file = File::create(tmp).map_err(map_err)?;
        file.write_all(buf).map_err(map_err)?;
        file.sync_all().map_err(map_err)?;
    }
    std::fs::rename(tmp, path).map_err(map_err)?;
    debug!(?path, bytes = buf.len(), "file replaced");
    Ok(())
}
