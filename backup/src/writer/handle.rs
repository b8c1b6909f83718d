use tokio::sync::{mpsc, oneshot};

use crate::backup_error;
use crate::error::{BackupResult, ErrorKind};
use crate::types::OutputKey;

/// Outcome of one [`WriteCommand::DataBatch`], sent back on the batch's reply channel.
pub type WriteReply = BackupResult<()>;

/// Commands accepted by the writer actor.
#[derive(Debug)]
pub enum WriteCommand {
    /// Lines to append, in order, to the output file of `key`.
    DataBatch {
        key: OutputKey,
        lines: Vec<String>,
        reply: oneshot::Sender<WriteReply>,
    },
    /// Completion sentinel: the worker owning `key` will send nothing further.
    WorkerDone { key: OutputKey },
}

/// Cloneable sending side of the writer inbox, handed to every extraction worker.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriterHandle {
    pub(crate) fn new(tx: mpsc::Sender<WriteCommand>) -> Self {
        Self { tx }
    }

    #[cfg(test)]
    pub(crate) fn tx(&self) -> &mpsc::Sender<WriteCommand> {
        &self.tx
    }

    /// Sends a batch and waits until the writer has appended it.
    ///
    /// Returns the writer's reply. Fails with [`ErrorKind::WriterUnavailable`] if the writer is
    /// gone before it could answer.
    pub async fn write_batch(&self, key: &OutputKey, lines: Vec<String>) -> WriteReply {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = WriteCommand::DataBatch {
            key: key.clone(),
            lines,
            reply: reply_tx,
        };
        if self.tx.send(command).await.is_err() {
            return Err(backup_error!(
                ErrorKind::WriterUnavailable,
                "Writer inbox is closed",
                key
            ));
        }

        match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => Err(backup_error!(
                ErrorKind::WriterUnavailable,
                "Writer dropped the batch without replying",
                key
            )),
        }
    }

    /// Sends the completion sentinel for `key`.
    pub async fn worker_done(&self, key: &OutputKey) -> BackupResult<()> {
        let command = WriteCommand::WorkerDone { key: key.clone() };
        if self.tx.send(command).await.is_err() {
            return Err(backup_error!(
                ErrorKind::WriterUnavailable,
                "Writer inbox is closed",
                key
            ));
        }

        Ok(())
    }
}
