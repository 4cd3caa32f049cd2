//! Progress reporting for long-running calls.
//!
//! A handler receives a [`CallScope`] for every invocation. The scope carries a
//! [`ProgressReporter`] only when the caller supplied a progress token and the
//! server has a [`ProgressSink`] attached; otherwise reporting is a no-op.
//!
//! Each reporter owns a fresh counter, so the values delivered under one token
//! are strictly increasing. Delivery failures are logged and never turn into
//! call failures.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::SinkError;
use crate::mcp::protocol::Request;
use crate::mcp::types::{ProgressNotification, ProgressToken};

/// Destination for progress notifications.
pub trait ProgressSink: Send + Sync {
    /// Delivers one progress notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be handed over.
    fn deliver(&self, notification: ProgressNotification) -> Result<(), SinkError>;
}

/// A sink that forwards notifications to a channel as envelopes.
///
/// The stdio server drains the receiving half and writes each envelope to the
/// client ahead of the call's response.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Request>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn deliver(&self, notification: ProgressNotification) -> Result<(), SinkError> {
        self.sender
            .send(notification.into_request())
            .map_err(|_| SinkError::Closed)
    }
}

/// Reports progress for one call under one token.
#[derive(Clone)]
pub struct ProgressReporter {
    token: ProgressToken,
    sink: Arc<dyn ProgressSink>,
    // Held across delivery so the sink observes values in order.
    counter: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl ProgressReporter {
    /// Creates a reporter with a counter starting at zero.
    #[must_use]
    pub fn new(token: ProgressToken, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            token,
            sink,
            counter: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the caller's token.
    #[must_use]
    pub const fn token(&self) -> &ProgressToken {
        &self.token
    }

    /// Advances the counter by `step` (at least one) and delivers the new value.
    ///
    /// Returns the value that was reported.
    pub fn advance(&self, step: u64, total: Option<u64>, message: Option<&str>) -> u64 {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        *counter = counter.saturating_add(step.max(1));
        let progress = *counter;

        let notification = ProgressNotification {
            progress_token: self.token.clone(),
            progress,
            total,
            message: message.map(str::to_string),
        };

        if let Err(e) = self.sink.deliver(notification) {
            tracing::warn!(token = %self.token, progress, error = %e, "Failed to deliver progress");
        }

        progress
    }
}

/// Per-invocation context handed to every handler.
///
/// Lives for exactly one dispatch; nothing in it outlives the handler call.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    progress: Option<ProgressReporter>,
}

impl CallScope {
    /// A scope without progress reporting.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// A scope that reports progress through `sink` under `token`.
    #[must_use]
    pub fn with_progress(token: ProgressToken, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            progress: Some(ProgressReporter::new(token, sink)),
        }
    }

    /// Returns the caller's progress token, if reporting is active.
    #[must_use]
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress.as_ref().map(ProgressReporter::token)
    }

    /// Reports one step of progress. No-op when reporting is inactive.
    pub fn report_progress(&self, total: Option<u64>, message: Option<&str>) {
        if let Some(reporter) = &self.progress {
            reporter.advance(1, total, message);
        }
    }
}
