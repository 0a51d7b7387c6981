use crate::utils::error::{EtlError, Result};
use std::path::{Path, PathBuf};

/// List the regular files in `dir` whose name ends with `suffix`, sorted by name.
///
/// Failing to read the directory is fatal for the run.
pub async fn discover_files(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let discovery_error = |source| EtlError::Discovery {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(discovery_error)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(discovery_error)? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            tracing::debug!("Skipping non UTF-8 file name: {:?}", entry.file_name());
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }

        // 跟隨 symlink，只保留一般檔案
        match tokio::fs::metadata(entry.path()).await {
            Ok(meta) if meta.is_file() => files.push(entry.path()),
            Ok(_) => {}
            Err(e) => tracing::debug!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    files.sort();
    Ok(files)
}
