//! User-visible alerts.
//!
//! The timer core raises notifications through [`Notifier`] and never lets a
//! failing notifier abort a use-case: errors are logged and dropped.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    /// Collapses repeated alerts for the same subject.
    #[serde(default)]
    pub tag: Option<String>,
}

impl NotificationOptions {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

pub trait Notifier: Send + Sync {
    fn show(&self, title: &str, options: &NotificationOptions) -> Result<(), CoreError>;
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn show(&self, _title: &str, _options: &NotificationOptions) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, title: &str, options: &NotificationOptions) -> Result<(), CoreError> {
        tracing::info!(title, body = %options.body, tag = ?options.tag, "notification");
        Ok(())
    }
}

/// Notifier for the given preference.
pub fn notifier_for(enabled: bool) -> Box<dyn Notifier> {
    if enabled {
        Box::new(LogNotifier)
    } else {
        Box::new(NoopNotifier)
    }
}

/// Show a notification, logging instead of propagating failures.
pub(crate) fn show_best_effort(notifier: &dyn Notifier, title: &str, options: &NotificationOptions) {
    if let Err(e) = notifier.show(title, options) {
        tracing::warn!(error = %e, title, "notification failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Notifier for Failing {
        fn show(&self, _: &str, _: &NotificationOptions) -> Result<(), CoreError> {
            Err(CoreError::Custom("permission denied".into()))
        }
    }

    #[test]
    fn failures_are_swallowed() {
        show_best_effort(&Failing, "Countdown", &NotificationOptions::new("done"));
    }

    #[test]
    fn options_builder() {
        let opts = NotificationOptions::new("body").with_tag("task-1");
        assert_eq!(opts.tag.as_deref(), Some("task-1"));
    }
}
