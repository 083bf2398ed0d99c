//! Read-only view of the two staging trees.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::error::ProgressError;
use super::markers::MarkerProtocol;
use crate::converter::find_source_files;

/// What the tool has written for one book under `untagged`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UntaggedObservation {
    /// Name of the first in-progress file found, if any.
    pub in_progress: Option<String>,
    pub has_settling: bool,
    /// Outputs that are not in progress (plain + settling).
    pub converted: u32,
    /// Every output file, in progress or not.
    pub all_outputs: u32,
}

/// Lists and counts files in the merge and untagged directories.
#[derive(Debug, Clone)]
pub struct StagingScanner {
    merge_dir: PathBuf,
    untagged_dir: PathBuf,
    protocol: MarkerProtocol,
}

impl StagingScanner {
    pub fn new(merge_dir: PathBuf, untagged_dir: PathBuf, protocol: MarkerProtocol) -> Self {
        Self {
            merge_dir,
            untagged_dir,
            protocol,
        }
    }

    pub fn merge_dir(&self) -> &Path {
        &self.merge_dir
    }

    pub fn untagged_dir(&self) -> &Path {
        &self.untagged_dir
    }

    /// Folder names directly under `untagged`, sorted.
    pub fn untagged_folders(&self) -> Result<Vec<String>, ProgressError> {
        subdirectories(&self.untagged_dir)
    }

    /// Book folder names directly under `merge`, sorted.
    pub fn merge_book_folders(&self) -> Result<Vec<String>, ProgressError> {
        subdirectories(&self.merge_dir)
    }

    /// The book's input folder, when the tool staged it in its own directory.
    pub fn merge_book_dir(&self, book_name: &str) -> Option<PathBuf> {
        let dir = self.merge_dir.join(book_name);
        dir.is_dir().then_some(dir)
    }

    /// Source files staged for `book_name`.
    ///
    /// Counts `merge/{book}/` recursively when it exists, else the loose
    /// source files at the merge root.
    pub fn merge_count(&self, book_name: &str) -> u32 {
        if let Some(dir) = self.merge_book_dir(book_name) {
            return find_source_files(&dir, &self.protocol).len() as u32;
        }

        let Ok(entries) = fs::read_dir(&self.merge_dir) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| self.protocol.is_source_file(&entry.path()))
            .count() as u32
    }

    /// The `untagged` folder belonging to `book_name`, if any.
    pub fn find_untagged_folder(&self, book_name: &str) -> Result<Option<String>, ProgressError> {
        Ok(self.untagged_folders()?.into_iter().find(|folder| {
            folder == book_name || self.protocol.book_name_from_folder(folder) == book_name
        }))
    }

    /// Walk one `untagged` folder and tally its outputs.
    pub fn observe_untagged(&self, folder: &str) -> UntaggedObservation {
        let mut observation = UntaggedObservation::default();
        let mut names: Vec<String> = WalkDir::new(self.untagged_dir.join(folder))
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| self.protocol.is_output_file(name))
            .collect();
        names.sort();

        for name in names {
            observation.all_outputs += 1;
            if self.protocol.is_in_progress(&name) {
                if observation.in_progress.is_none() {
                    observation.in_progress = Some(name);
                }
                continue;
            }
            if self.protocol.is_settling(&name) {
                observation.has_settling = true;
            }
            observation.converted += 1;
        }
        observation
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<String>, ProgressError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| ProgressError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: PathBuf) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn scanner(temp: &TempDir) -> StagingScanner {
        StagingScanner::new(
            temp.path().join("merge"),
            temp.path().join("untagged"),
            MarkerProtocol::V1,
        )
    }

    #[test]
    fn test_missing_dirs_are_empty() {
        let temp = TempDir::new().unwrap();
        let s = scanner(&temp);
        assert!(s.untagged_folders().unwrap().is_empty());
        assert!(s.merge_book_folders().unwrap().is_empty());
        assert_eq!(s.merge_count("Dune"), 0);
        assert_eq!(s.observe_untagged("Dune"), UntaggedObservation::default());
    }

    #[test]
    fn test_merge_count_prefers_book_folder() {
        let temp = TempDir::new().unwrap();
        let merge = temp.path().join("merge");
        touch(merge.join("Dune").join("01.mp3"));
        touch(merge.join("Dune").join("CD2").join("02.mp3"));
        touch(merge.join("Dune").join("cover.jpg"));
        touch(merge.join("loose1.mp3"));
        touch(merge.join("loose2.mp3"));
        touch(merge.join("loose3.mp3"));

        let s = scanner(&temp);
        assert_eq!(s.merge_count("Dune"), 2);
        assert_eq!(s.merge_count("Emma"), 3);
        assert_eq!(s.merge_book_folders().unwrap(), vec!["Dune".to_string()]);
    }

    #[test]
    fn test_observe_untagged() {
        let temp = TempDir::new().unwrap();
        let book = temp.path().join("untagged").join("Dune-tmpfiles");
        touch(book.join("01.m4b"));
        touch(book.join("nested").join("02-finished.m4b"));
        touch(book.join("03-converting.m4b"));
        touch(book.join("notes.txt"));

        let s = scanner(&temp);
        let observation = s.observe_untagged("Dune-tmpfiles");
        assert_eq!(observation.in_progress.as_deref(), Some("03-converting.m4b"));
        assert!(observation.has_settling);
        assert_eq!(observation.converted, 2);
        assert_eq!(observation.all_outputs, 3);

        assert_eq!(
            s.find_untagged_folder("Dune").unwrap().as_deref(),
            Some("Dune-tmpfiles")
        );
        assert!(s.find_untagged_folder("Emma").unwrap().is_none());
    }
}
