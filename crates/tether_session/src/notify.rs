//! # Notification Collaborator
//!
//! Fire-and-forget, user-visible notices. The session raises them for
//! observability only and never branches on their outcome.

use std::sync::Arc;

use parking_lot::Mutex;

/// How prominent a notification is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Neutral information.
    Information,
    /// Something finished successfully.
    Success,
    /// Something did not complete.
    Warning,
    /// Something failed.
    Error,
}

/// A user-visible notice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Prominence.
    pub severity: Severity,
}

impl Notification {
    /// Creates a notification.
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Interface to whatever shows notifications to the user.
pub trait Notifier {
    /// Shows a notification.
    fn notify(&mut self, notification: Notification);
}

/// Forwards notifications to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, n: Notification) {
        match n.severity {
            Severity::Information | Severity::Success => {
                tracing::info!(title = %n.title, "{}", n.message);
            }
            Severity::Warning => tracing::warn!(title = %n.title, "{}", n.message),
            Severity::Error => tracing::error!(title = %n.title, "{}", n.message),
        }
    }
}

/// Keeps every notification it receives. Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything received so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    /// Number of notifications with the given title.
    #[must_use]
    pub fn count_titled(&self, title: &str) -> usize {
        self.seen.lock().iter().filter(|n| n.title == title).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}
