use std::fmt;
use std::path::{Path, PathBuf};

/// Extension of the intermediate per-table files.
pub const OUTPUT_FILE_EXTENSION: &str = "csv";

/// Identifies one output stream, i.e. one table of one source.
///
/// Every extraction worker owns exactly one key and the writer keeps one output file per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputKey {
    pub source: String,
    pub table: String,
}

impl OutputKey {
    pub fn new(source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            table: table.into(),
        }
    }

    /// Directory holding all files of this key's source.
    pub fn source_dir(&self, archive_root: &Path) -> PathBuf {
        archive_root.join(&self.source)
    }

    /// Path of the intermediate file, `<archive_root>/<source>/<table>.csv`.
    pub fn file_path(&self, archive_root: &Path) -> PathBuf {
        self.source_dir(archive_root)
            .join(format!("{}.{OUTPUT_FILE_EXTENSION}", self.table))
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_nests_table_under_source() {
        let key = OutputKey::new("thailand", "users");

        assert_eq!(
            key.file_path(Path::new("archive")),
            PathBuf::from("archive/thailand/users.csv")
        );
        assert_eq!(key.to_string(), "thailand/users");
    }
}
