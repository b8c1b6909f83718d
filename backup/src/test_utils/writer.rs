use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::backup_error;
use crate::error::ErrorKind;
use crate::types::OutputKey;
use crate::writer::{WriteCommand, WriterHandle};

/// A command observed by a [`RecordingWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCommand {
    Batch {
        key: OutputKey,
        lines: Vec<String>,
        /// Whether the batch was acknowledged with success.
        accepted: bool,
    },
    Done {
        key: OutputKey,
    },
}

#[derive(Debug, Default)]
struct Inner {
    commands: Vec<RecordedCommand>,
    failing_writes: u32,
}

/// Stand-in for the writer actor that records every command instead of touching files.
///
/// Batches are acknowledged right away unless failures were scripted with
/// [`RecordingWriter::fail_next_writes`].
#[derive(Debug)]
pub struct RecordingWriter {
    inner: Arc<Mutex<Inner>>,
    task: JoinHandle<()>,
}

impl RecordingWriter {
    /// Starts the recorder and returns it with a handle to give to workers.
    pub fn spawn(inbox_capacity: usize) -> (Self, WriterHandle) {
        let (tx, mut rx) = mpsc::channel(inbox_capacity);
        let inner = Arc::new(Mutex::new(Inner::default()));

        let task = tokio::spawn({
            let inner = inner.clone();
            async move {
                while let Some(command) = rx.recv().await {
                    let mut inner = inner.lock().await;
                    match command {
                        WriteCommand::DataBatch { key, lines, reply } => {
                            let accepted = inner.failing_writes == 0;
                            let result = if accepted {
                                Ok(())
                            } else {
                                inner.failing_writes -= 1;
                                Err(backup_error!(
                                    ErrorKind::OutputIoError,
                                    "Scripted write failure",
                                    &key
                                ))
                            };

                            inner.commands.push(RecordedCommand::Batch {
                                key,
                                lines,
                                accepted,
                            });
                            let _ = reply.send(result);
                        }
                        WriteCommand::WorkerDone { key } => {
                            inner.commands.push(RecordedCommand::Done { key });
                        }
                    }
                }
            }
        });

        (Self { inner, task }, WriterHandle::new(tx))
    }

    /// Makes the next `count` batches fail with an output error.
    pub async fn fail_next_writes(&self, count: u32) {
        self.inner.lock().await.failing_writes = count;
    }

    /// Commands recorded so far.
    pub async fn commands(&self) -> Vec<RecordedCommand> {
        self.inner.lock().await.commands.clone()
    }

    /// Waits until every handle is dropped and returns all recorded commands.
    pub async fn finish(self) -> Vec<RecordedCommand> {
        let Self { inner, task } = self;
        task.await.expect("recording writer task panicked");

        let commands = inner.lock().await.commands.clone();
        commands
    }
}
