use clap::{Parser, Subcommand};
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;

use crate::error::{ObservabilitySnafu, Result};
use crate::replay::ReplayArgs;

mod error;
mod replay;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Quill document-operation scribe CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a file of log envelopes through the processor
    Replay {
        #[clap(flatten)]
        inner: ReplayArgs,
    },
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<()> {
    quill_observability::init_observability(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .context(ObservabilitySnafu)?;

    let cli = Cli::parse();

    let ct = CancellationToken::new();
    let ct_clone = ct.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ct_clone.cancel();
    });

    match cli.command {
        Commands::Replay { inner } => inner.run(ct).await,
    }
}
