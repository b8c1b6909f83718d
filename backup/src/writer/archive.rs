//! Finalization of output files into single-entry `.tar.gz` archives.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{info, warn};

use crate::backup_error;
use crate::error::{BackupError, BackupResult, ErrorKind};
use crate::types::OutputKey;
use crate::writer::actor::{FILE_MODE, OutputFile};

/// Suffix appended to an output file's path to name its archive.
const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// What happened to one output file during finalization.
#[derive(Debug, Clone)]
pub enum ArtifactOutcome {
    /// The file was compressed and the intermediate file removed.
    Archived { archive_path: PathBuf },
    /// The file was empty and removed without producing an archive.
    Discarded,
    /// Finalization failed; the intermediate file is left in place when possible.
    Failed { error: BackupError },
}

#[derive(Debug, Clone)]
pub struct ArtifactReport {
    pub key: OutputKey,
    pub path: PathBuf,
    pub outcome: ArtifactOutcome,
}

/// Per-file outcomes of a finalization pass, ordered by file path.
#[derive(Debug, Clone, Default)]
pub struct FinalizeReport {
    pub artifacts: Vec<ArtifactReport>,
}

impl FinalizeReport {
    pub fn archived(&self) -> usize {
        self.count(|outcome| matches!(outcome, ArtifactOutcome::Archived { .. }))
    }

    pub fn discarded(&self) -> usize {
        self.count(|outcome| matches!(outcome, ArtifactOutcome::Discarded))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ArtifactOutcome::Failed { .. }))
    }

    /// Returns `true` if no file failed to finalize.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&ArtifactOutcome) -> bool) -> usize {
        self.artifacts
            .iter()
            .filter(|artifact| predicate(&artifact.outcome))
            .count()
    }
}

/// Archives every output file independently. A failure never stops the other files.
pub(crate) fn finalize(files: HashMap<OutputKey, OutputFile>) -> FinalizeReport {
    let mut files: Vec<_> = files.into_iter().collect();
    files.sort_by(|(_, a), (_, b)| a.path.cmp(&b.path));

    let mut report = FinalizeReport::default();
    for (key, output) in files {
        let path = output.path.clone();

        let outcome = match finalize_file(output) {
            Ok(Some(archive_path)) => {
                info!(output = %key, path = %archive_path.display(), "archived output file");
                ArtifactOutcome::Archived { archive_path }
            }
            Ok(None) => {
                warn!(output = %key, path = %path.display(), "output file is empty, removed without archiving");
                ArtifactOutcome::Discarded
            }
            Err(error) => {
                warn!(output = %key, path = %path.display(), error = %error, "failed to archive output file");
                ArtifactOutcome::Failed { error }
            }
        };

        report.artifacts.push(ArtifactReport { key, path, outcome });
    }

    info!(
        archived = report.archived(),
        discarded = report.discarded(),
        failed = report.failed(),
        "everything is done"
    );

    report
}

/// Returns the archive path, or `None` if the file was empty and has been removed.
fn finalize_file(output: OutputFile) -> BackupResult<Option<PathBuf>> {
    let OutputFile { path, mut file } = output;

    let metadata = file
        .metadata()
        .map_err(|err| archive_error("Failed to inspect output file", &path, err))?;

    if metadata.len() == 0 {
        drop(file);
        fs::remove_file(&path)
            .map_err(|err| archive_error("Failed to remove empty output file", &path, err))?;
        return Ok(None);
    }

    let archive_path = archive_path_for(&path);
    if let Err(err) = write_archive(&mut file, &metadata, &path, &archive_path) {
        if let Err(remove_err) = fs::remove_file(&archive_path)
            && remove_err.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %archive_path.display(), error = %remove_err, "failed to remove partial archive");
        }

        return Err(archive_error("Failed to compress output file", &path, err));
    }

    drop(file);
    fs::remove_file(&path)
        .map_err(|err| archive_error("Failed to remove archived output file", &path, err))?;

    Ok(Some(archive_path))
}

fn write_archive(
    file: &mut File,
    metadata: &Metadata,
    path: &Path,
    archive_path: &Path,
) -> io::Result<()> {
    let entry_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name")
    })?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);
    let archive = options.open(archive_path)?;

    let mut builder = tar::Builder::new(GzEncoder::new(archive, Compression::default()));

    let mut header = tar::Header::new_gnu();
    header.set_size(metadata.len());
    header.set_mode(FILE_MODE);
    header.set_mtime(
        metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default(),
    );

    // The handle is in append mode, reads start wherever the last write left the cursor.
    file.seek(SeekFrom::Start(0))?;
    builder.append_data(&mut header, entry_name, file.take(metadata.len()))?;

    let archive = builder.into_inner()?.finish()?;
    archive.sync_all()
}

fn archive_path_for(path: &Path) -> PathBuf {
    let mut archive_path = OsString::from(path.as_os_str());
    archive_path.push(ARCHIVE_SUFFIX);

    PathBuf::from(archive_path)
}

fn archive_error(description: &'static str, path: &Path, err: io::Error) -> BackupError {
    backup_error!(
        ErrorKind::ArchiveFailed,
        description,
        path.display(),
        source: err
    )
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::read::GzDecoder;

    use super::*;

    fn output_file(root: &Path, table: &str, contents: &[u8]) -> (OutputKey, OutputFile) {
        let key = OutputKey::new("s1", table);
        let mut output = OutputFile::open(key.file_path(root)).unwrap();
        output.file.write_all(contents).unwrap();

        (key, output)
    }

    fn read_single_entry(archive_path: &Path) -> (String, u32, Vec<u8>) {
        let decoder = GzDecoder::new(File::open(archive_path).unwrap());
        let mut archive = tar::Archive::new(decoder);
        let mut entries = archive.entries().unwrap();

        let mut entry = entries.next().unwrap().unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mode = entry.header().mode().unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        drop(entry);

        assert!(entries.next().is_none());

        (name, mode, contents)
    }

    #[test]
    fn empty_file_is_removed_without_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (key, output) = output_file(dir.path(), "sales", b"");
        let path = output.path.clone();

        let report = finalize(HashMap::from([(key, output)]));

        assert_eq!(report.discarded(), 1);
        assert!(!path.exists());
        assert!(!archive_path_for(&path).exists());
    }

    #[test]
    fn archive_holds_the_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let contents = b"1,alice\n2,bob\n3,carol\n";
        let (key, output) = output_file(dir.path(), "users", contents);
        let path = output.path.clone();

        let report = finalize(HashMap::from([(key, output)]));

        assert_eq!(report.archived(), 1);
        assert!(report.is_success());
        assert!(!path.exists());

        let (name, mode, archived) = read_single_entry(&archive_path_for(&path));
        assert_eq!(name, "users.csv");
        assert_eq!(mode, FILE_MODE);
        assert_eq!(archived, contents);
    }

    #[test]
    fn one_failure_does_not_stop_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let (sales_key, sales) = output_file(dir.path(), "sales", b"1,1,9.99\n");
        let (users_key, users) = output_file(dir.path(), "users", b"1,alice\n");
        // A directory squatting on the archive path makes creating it fail.
        let blocked = archive_path_for(&sales.path);
        fs::create_dir(&blocked).unwrap();
        let sales_path = sales.path.clone();

        let report = finalize(HashMap::from([(users_key, users), (sales_key, sales)]));

        assert_eq!(report.failed(), 1);
        assert_eq!(report.archived(), 1);
        assert!(!report.is_success());
        assert!(sales_path.exists());
        assert!(blocked.is_dir());
        assert!(dir.path().join("s1/users.csv.tar.gz").is_file());

        let failed = &report.artifacts[0];
        assert_eq!(failed.key.table, "sales");
        let ArtifactOutcome::Failed { error } = &failed.outcome else {
            panic!("expected a failure, got {:?}", failed.outcome);
        };
        assert_eq!(error.kind(), ErrorKind::ArchiveFailed);
    }
}
