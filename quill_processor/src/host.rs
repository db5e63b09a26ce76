//! The contract between the processor and whatever hosts it.

use std::sync::Mutex;

use quill_pipeline_core::Offset;

use crate::error::ProcessorError;

/// Callbacks into the hosting runtime. Invoked only from the
/// processor's own task.
pub trait HostContext: Send + Sync {
    /// Advances the durable log position: every message at or below
    /// `offset` has been fully processed. Idempotent for equal values,
    /// called once per distinct offset.
    fn checkpoint(&self, offset: Offset);

    /// Fatal error sink. With `restart` set, the host is expected to
    /// tear the processor down and restart it from the last checkpoint.
    fn error(&self, error: ProcessorError, restart: bool);
}

/// Records host calls in memory. For tests and development.
#[derive(Debug, Default)]
pub struct MemoryHostContext {
    checkpoints: Mutex<Vec<Offset>>,
    errors: Mutex<Vec<(String, bool)>>,
}

impl MemoryHostContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoints(&self) -> Vec<Offset> {
        self.checkpoints.lock().expect("lock poisoned").clone()
    }

    pub fn last_checkpoint(&self) -> Option<Offset> {
        self.checkpoints.lock().expect("lock poisoned").last().copied()
    }

    pub fn errors(&self) -> Vec<(String, bool)> {
        self.errors.lock().expect("lock poisoned").clone()
    }
}

impl HostContext for MemoryHostContext {
    fn checkpoint(&self, offset: Offset) {
        self.checkpoints.lock().expect("lock poisoned").push(offset);
    }

    fn error(&self, error: ProcessorError, restart: bool) {
        self.errors
            .lock()
            .expect("lock poisoned")
            .push((error.to_string(), restart));
    }
}

/// Logs host calls. Used where the checkpoint has no durable home,
/// such as the replay CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHostContext;

impl HostContext for TracingHostContext {
    fn checkpoint(&self, offset: Offset) {
        tracing::info!(offset, "checkpoint advanced");
    }

    fn error(&self, error: ProcessorError, restart: bool) {
        tracing::error!(%error, restart, "processor failed");
    }
}
