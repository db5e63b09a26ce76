use std::path::PathBuf;

use quill_processor::ProcessorError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("failed to initialize observability"))]
    Observability {
        source: quill_observability::ObservabilityError,
    },
    #[snafu(display("failed to read {}", path.display()))]
    ReadInput {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("failed to deliver a message to the processor"))]
    Deliver { source: ProcessorError },
    #[snafu(display("processor task terminated abnormally"))]
    ProcessorTask { source: tokio::task::JoinError },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;
