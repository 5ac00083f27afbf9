//! Leveled diagnostics addressed to a corpus.
//!
//! The engine never fails a view because of user-authored mistakes when the
//! corpus runs in lenient mode; instead it hands a [`Message`] to a
//! [`MessageSink`]. What the sink does with it (flash notice, stderr, a
//! test buffer) is up to the caller.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub text: String,
    pub severity: Severity,
    pub corpus: String,
    pub details: String,
    pub user: Option<String>,
    /// Unix time in seconds.
    pub time: u64,
}

impl Message {
    pub fn new(
        text: impl Into<String>,
        severity: Severity,
        corpus: impl Into<String>,
    ) -> Self {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            text: text.into(),
            severity,
            corpus: corpus.into(),
            details: String::new(),
            user: None,
            time,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn for_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Fire-and-forget receiver for diagnostics.
pub trait MessageSink: Send + Sync {
    fn emit(&self, message: Message);
}

/// Write `message` to the log (when `use_log` is set) and hand it to `sink`.
pub fn report(sink: &dyn MessageSink, message: Message, use_log: bool) {
    if use_log {
        match message.severity {
            Severity::Info => tracing::info!(
                corpus = %message.corpus,
                details = %message.details,
                "{}",
                message.text
            ),
            Severity::Warning => tracing::warn!(
                corpus = %message.corpus,
                details = %message.details,
                "{}",
                message.text
            ),
            Severity::Error => tracing::error!(
                corpus = %message.corpus,
                details = %message.details,
                "{}",
                message.text
            ),
        }
    }
    sink.emit(message);
}

/// In-memory sink that keeps every message it receives.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<Vec<Message>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all messages received so far.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Remove and return all messages received so far.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Messages whose text contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.text.contains(needle))
            .cloned()
            .collect()
    }
}

impl MessageSink for MessageLog {
    fn emit(&self, message: Message) {
        self.messages.lock().push(message);
    }
}
