//! Filename conventions the conversion tool leaves behind.

use std::path::Path;

/// Versioned set of staging filename markers.
///
/// The tool cannot report progress, so the inferencer reads these suffixes
/// instead. A tool upgrade that renames them gets a new variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerProtocol {
    #[default]
    V1,
}

impl MarkerProtocol {
    /// Extension of the source audio files, without the dot.
    pub fn source_extension(&self) -> &'static str {
        match self {
            Self::V1 => "mp3",
        }
    }

    /// Extension of converted output files, without the dot.
    pub fn output_extension(&self) -> &'static str {
        match self {
            Self::V1 => "m4b",
        }
    }

    /// Suffix of a file the tool is still writing.
    pub fn in_progress_suffix(&self) -> &'static str {
        match self {
            Self::V1 => "-converting.m4b",
        }
    }

    /// Suffix of a written file the tool has not finalized yet.
    pub fn settling_suffix(&self) -> &'static str {
        match self {
            Self::V1 => "-finished.m4b",
        }
    }

    /// Suffix the tool appends to a book's folder under `untagged`.
    pub fn folder_suffix(&self) -> &'static str {
        match self {
            Self::V1 => "-tmpfiles",
        }
    }

    /// `{book}.m4b`
    pub fn output_file_name(&self, book_name: &str) -> String {
        format!("{}.{}", book_name, self.output_extension())
    }

    /// Book name for an `untagged` folder name.
    pub fn book_name_from_folder<'a>(&self, folder_name: &'a str) -> &'a str {
        folder_name
            .strip_suffix(self.folder_suffix())
            .unwrap_or(folder_name)
    }

    /// Source audio file, case-insensitive on the extension.
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(self.source_extension()))
    }

    /// Any output file, including in-progress and settling ones.
    pub fn is_output_file(&self, file_name: &str) -> bool {
        file_name.ends_with(&format!(".{}", self.output_extension()))
    }

    pub fn is_in_progress(&self, file_name: &str) -> bool {
        file_name.ends_with(self.in_progress_suffix())
    }

    pub fn is_settling(&self, file_name: &str) -> bool {
        file_name.ends_with(self.settling_suffix())
    }

    /// Output that counts towards `converted_files`: anything not in progress.
    pub fn is_converted(&self, file_name: &str) -> bool {
        self.is_output_file(file_name) && !self.is_in_progress(file_name)
    }
}
