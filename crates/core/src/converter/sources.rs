use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::progress::MarkerProtocol;

/// All source audio files under `dir`, recursively, in path order.
///
/// A missing directory yields an empty list. A single matching file is
/// returned as-is.
pub fn find_source_files(dir: &Path, protocol: &MarkerProtocol) -> Vec<PathBuf> {
    if dir.is_file() {
        return if protocol.is_source_file(dir) {
            vec![dir.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| protocol.is_source_file(path))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finds_nested_sources_only() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("CD1")).unwrap();
        std::fs::write(root.join("CD1").join("01.mp3"), b"a").unwrap();
        std::fs::write(root.join("02.MP3"), b"b").unwrap();
        std::fs::write(root.join("cover.jpg"), b"c").unwrap();

        let files = find_source_files(root, &MarkerProtocol::V1);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| MarkerProtocol::V1.is_source_file(f)));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        assert!(find_source_files(Path::new("/nonexistent/dir"), &MarkerProtocol::V1).is_empty());
    }

    #[test]
    fn test_single_file_source() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("book.mp3");
        std::fs::write(&file, b"a").unwrap();
        assert_eq!(find_source_files(&file, &MarkerProtocol::V1), vec![file]);
    }
}
