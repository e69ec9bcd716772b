//! Turns picked paths into upload selections
//!
//! Folder trees are walked recursively and every regular file becomes a
//! [`SelectedFile`] whose `relative_path` starts with the folder's own
//! name, mirroring how browser folder pickers report paths. The maximum
//! depth filter itself is applied at enqueue time by the upload manager.

use crate::model::selected_file::{FileOrigin, SelectedFile};
use color_eyre::eyre::{self, Report};
use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Number of components in a relative path ("docs/a/b.txt" has depth 3)
pub fn path_depth(relative_path: &str) -> usize {
    relative_path.split('/').filter(|p| !p.is_empty()).count()
}

/// True when the path does not exceed the maximum directory depth
pub fn within_depth(relative_path: &str, max_depth: usize) -> bool {
    path_depth(relative_path) <= max_depth
}

/// Stat a single picked file; its relative path equals its name
pub async fn collect_file(path: &Path) -> eyre::Result<SelectedFile> {
    let metadata = fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(Report::msg(format!(
            "not a regular file: {}",
            path.display()
        )));
    }
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Report::msg(format!("path has no file name: {}", path.display())))?;
    Ok(SelectedFile {
        size: metadata.len(),
        relative_path: name.clone(),
        name,
        origin: FileOrigin::Disk(path.to_path_buf()),
    })
}

/// Walk a folder tree, yielding every regular file beneath it
pub async fn collect_folder(root: &Path) -> eyre::Result<Vec<SelectedFile>> {
    let root_name = root
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Report::msg(format!("path has no folder name: {}", root.display())))?;
    let mut files = Vec::new();
    walk(root.to_path_buf(), root_name, &mut files).await?;
    // Directory iteration order is platform-dependent; keep the queue
    // deterministic
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

fn walk<'a>(
    dir: PathBuf,
    prefix: String,
    out: &'a mut Vec<SelectedFile>,
) -> BoxFuture<'a, eyre::Result<()>> {
    async move {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = format!("{}/{}", prefix, name);
            if metadata.is_dir() {
                walk(path, relative, out).await?;
            } else if metadata.is_file() {
                out.push(SelectedFile {
                    name,
                    size: metadata.len(),
                    relative_path: relative,
                    origin: FileOrigin::Disk(path),
                });
            }
        }
        Ok(())
    }
    .boxed()
}
