//! The single-owner writer actor and the archival of its output files.

mod actor;
mod archive;
mod handle;

pub use actor::FileWriter;
pub use archive::{ArtifactOutcome, ArtifactReport, FinalizeReport};
pub use handle::{WriteCommand, WriteReply, WriterHandle};
