use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{DirBuilder, File, OpenOptions};
use std::io::{self, BufWriter, Write};
#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backup_error;
use crate::error::{BackupResult, ErrorKind};
use crate::types::OutputKey;
use crate::writer::archive::{FinalizeReport, finalize};
use crate::writer::handle::{WriteCommand, WriterHandle};

/// Permission bits of source directories created under the archive root.
const DIR_MODE: u32 = 0o700;

/// Permission bits of intermediate output files.
pub(crate) const FILE_MODE: u32 = 0o600;

/// Lifecycle of the writer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// Receiving commands until the last worker has signalled completion.
    Running,
    /// Processing whatever is still buffered in the inbox.
    Draining,
    /// Done with the inbox, files are handed to the finalizer.
    Finalizing,
}

/// Open append handle of one `<source>/<table>.csv` file.
#[derive(Debug)]
pub(crate) struct OutputFile {
    pub(crate) path: PathBuf,
    pub(crate) file: File,
}

impl OutputFile {
    /// Creates the parent directory if needed and opens the file for appending.
    pub(crate) fn open(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            create_dir(parent)?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true).read(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        let file = options.open(&path)?;

        Ok(Self { path, file })
    }

    /// Appends every line in order and flushes them to the file.
    fn append(&mut self, lines: &[String]) -> io::Result<()> {
        let mut writer = BufWriter::new(&self.file);
        for line in lines {
            writer.write_all(line.as_bytes())?;
        }

        writer.flush()
    }
}

fn create_dir(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);

    builder.create(path)
}

/// Single owner of every output file of a run.
///
/// Workers talk to it through [`WriterHandle`]s. The writer counts completion sentinels down from
/// the number set with [`FileWriter::set_workers`]; when the count reaches zero it processes the
/// commands still buffered in its inbox and then archives every file it wrote.
///
/// [`FileWriter::run`] blocks the calling thread and is meant to be run with
/// [`tokio::task::spawn_blocking`].
#[derive(Debug)]
pub struct FileWriter {
    archive_root: PathBuf,
    inbox: mpsc::Receiver<WriteCommand>,
    live_workers: usize,
    files: HashMap<OutputKey, OutputFile>,
    state: WriterState,
}

impl FileWriter {
    /// Creates a writer whose inbox buffers up to `inbox_capacity` commands.
    pub fn new(archive_root: impl Into<PathBuf>, inbox_capacity: usize) -> (Self, WriterHandle) {
        let (tx, inbox) = mpsc::channel(inbox_capacity);

        let writer = Self {
            archive_root: archive_root.into(),
            inbox,
            live_workers: 0,
            files: HashMap::new(),
            state: WriterState::Running,
        };

        (writer, WriterHandle::new(tx))
    }

    /// Sets how many completion sentinels the writer waits for.
    pub fn set_workers(&mut self, workers: usize) {
        self.live_workers = workers;
    }

    /// Runs the writer to completion and returns the outcome of archiving its files.
    pub fn run(mut self) -> FinalizeReport {
        info!(workers = self.live_workers, archive_root = %self.archive_root.display(), "writer started");

        if self.live_workers == 0 {
            self.state = WriterState::Draining;
        }

        loop {
            match self.state {
                WriterState::Running => match self.inbox.blocking_recv() {
                    Some(command) => self.handle_command(command),
                    None => {
                        warn!(
                            live_workers = self.live_workers,
                            "writer inbox closed before every worker completed"
                        );
                        self.state = WriterState::Draining;
                    }
                },
                WriterState::Draining => {
                    self.drain();
                    self.state = WriterState::Finalizing;
                }
                WriterState::Finalizing => break,
            }
        }

        info!(files = self.files.len(), "writer finished, archiving output files");

        finalize(self.files)
    }

    fn handle_command(&mut self, command: WriteCommand) {
        match command {
            WriteCommand::DataBatch { key, lines, reply } => {
                let result = self.append(&key, &lines);
                match &result {
                    Ok(()) => debug!(output = %key, lines = lines.len(), "appended batch"),
                    Err(err) => error!(output = %key, error = %err, "failed to append batch"),
                }

                if reply.send(result).is_err() {
                    warn!(output = %key, "worker stopped waiting for the write reply");
                }
            }
            WriteCommand::WorkerDone { key } => {
                if self.state != WriterState::Running {
                    debug!(output = %key, "ignoring completion received while draining");
                    return;
                }

                self.live_workers = self.live_workers.saturating_sub(1);
                debug!(output = %key, live_workers = self.live_workers, "worker completed");

                if self.live_workers == 0 {
                    self.state = WriterState::Draining;
                }
            }
        }
    }

    /// Processes every command already buffered, without waiting for new ones.
    fn drain(&mut self) {
        // Closing rejects new sends while keeping buffered commands receivable.
        self.inbox.close();

        let mut drained = 0usize;
        while let Ok(command) = self.inbox.try_recv() {
            self.handle_command(command);
            drained += 1;
        }

        info!(drained, "writer inbox drained");
    }

    fn append(&mut self, key: &OutputKey, lines: &[String]) -> BackupResult<()> {
        let output = match self.files.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = key.file_path(&self.archive_root);
                let output = OutputFile::open(path.clone()).map_err(|err| {
                    backup_error!(
                        ErrorKind::OutputIoError,
                        "Failed to open output file",
                        path.display(),
                        source: err
                    )
                })?;

                info!(output = %key, path = %output.path.display(), "opened output file");
                entry.insert(output)
            }
        };

        output.append(lines).map_err(|err| {
            backup_error!(
                ErrorKind::OutputIoError,
                "Failed to append to output file",
                output.path.display(),
                source: err
            )
        })
    }
}
