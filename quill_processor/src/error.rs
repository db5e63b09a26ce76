use quill_pipeline_core::SendError;
use snafu::Snafu;

/// Processor error types.
///
/// The message is forwarded to the host's error sink, so it should say
/// what failed in terms the operator can act on.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProcessorError {
    /// A coalesced batch could not be persisted. Fatal: recovery is a
    /// restart from the last checkpoint.
    #[snafu(display("failed to persist an operation batch"))]
    Persist { source: SendError },
    /// The processor task is no longer accepting messages.
    #[snafu(display("processor is not running"))]
    Stopped,
}

pub type Result<T, E = ProcessorError> = std::result::Result<T, E>;
