//! File selection tuples consumed by the upload queue

use bytes::Bytes;
use std::path::PathBuf;

/// Where an item's bytes come from.
///
/// Picker-selected files stay on disk and are read chunk by chunk during
/// transfer; dropped payloads arrive as in-memory bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOrigin {
    Disk(PathBuf),
    Memory(Bytes),
}

/// A file selected for upload, before it is enqueued.
///
/// `relative_path` is the path within the selected folder tree (equal to
/// `name` for individually picked files).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
    pub relative_path: String,
    pub origin: FileOrigin,
}

impl SelectedFile {
    /// A file backed by in-memory bytes; the size is taken from the data.
    pub fn from_memory(name: impl Into<String>, data: Bytes) -> Self {
        let name = name.into();
        SelectedFile {
            size: data.len() as u64,
            relative_path: name.clone(),
            name,
            origin: FileOrigin::Memory(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_memory_sets_size_and_relative_path() {
        let file = SelectedFile::from_memory("notes.txt", Bytes::from_static(b"hello"));
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 5);
        assert_eq!(file.relative_path, "notes.txt");
        assert!(matches!(file.origin, FileOrigin::Memory(_)));
    }
}
