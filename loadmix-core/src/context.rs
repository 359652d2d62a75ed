//! Identity of one worker thread, passed explicitly to everything it drives.

use std::fmt;

use tracing::{info_span, Span};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadContext {
    process_id: String,
    thread_id: u32,
}

impl ThreadContext {
    pub fn new(process_id: impl Into<String>, thread_id: u32) -> Self {
        Self {
            process_id: process_id.into(),
            thread_id,
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Span tagging every log line emitted on behalf of this thread.
    pub fn span(&self) -> Span {
        info_span!("worker", process = %self.process_id, thread = self.thread_id)
    }

    /// Span for one run of this thread, nested under [`Self::span`].
    pub fn run_span(&self, run: u64) -> Span {
        info_span!("run", run)
    }
}

impl fmt::Display for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.process_id, self.thread_id)
    }
}
