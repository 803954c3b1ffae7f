use serde::Deserialize;
use std::time::Duration;

const DEFAULT_THREAD_NAME: &str = "event-dispatch";

/// Where the subscriber walk of a publish call runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Tokio's blocking pool when a runtime is current, otherwise a dedicated thread.
    #[default]
    Auto,
    /// Always a dedicated, named OS thread.
    Thread,
    /// The caller's thread. `publish` then returns only after the walk has finished.
    Inline,
}

/// Dispatcher settings, deserializable from the host application's configuration.
///
/// # Examples
/// ```rust
/// use reqhub_events::{DispatcherConfig, ExecutionMode};
///
/// let config = DispatcherConfig::default()
///     .with_execution(ExecutionMode::Thread)
///     .with_slow_subscriber_ms(250);
/// assert_eq!(config.thread_name, "event-dispatch");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub execution: ExecutionMode,
    pub thread_name: String,
    /// Log subscriber errors (`warn`) and panics (`error`) as they are collected.
    pub log_failures: bool,
    /// Warn about subscribers running longer than this many milliseconds.
    pub slow_subscriber_ms: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::Auto,
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            log_failures: true,
            slow_subscriber_ms: None,
        }
    }
}

impl DispatcherConfig {
    #[must_use = "Customize where dispatches run"]
    pub const fn with_execution(mut self, execution: ExecutionMode) -> Self {
        self.execution = execution;
        self
    }

    #[must_use = "Customize the dispatch thread name"]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self.normalized()
    }

    #[must_use = "Customize failure logging"]
    pub const fn with_log_failures(mut self, enabled: bool) -> Self {
        self.log_failures = enabled;
        self
    }

    #[must_use = "Customize the slow subscriber threshold"]
    pub const fn with_slow_subscriber_ms(mut self, millis: u64) -> Self {
        self.slow_subscriber_ms = Some(millis);
        self
    }

    pub(crate) fn slow_threshold(&self) -> Option<Duration> {
        self.slow_subscriber_ms.map(Duration::from_millis)
    }

    pub(crate) fn normalized(mut self) -> Self {
        if self.thread_name.trim().is_empty() {
            DEFAULT_THREAD_NAME.clone_into(&mut self.thread_name);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_thread_name_falls_back() {
        let config = DispatcherConfig::default().with_thread_name("   ");
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);

        let config = DispatcherConfig::default().with_thread_name("validators");
        assert_eq!(config.thread_name, "validators");
    }

    #[test]
    fn test_slow_threshold() {
        assert!(DispatcherConfig::default().slow_threshold().is_none());
        let config = DispatcherConfig::default().with_slow_subscriber_ms(5);
        assert_eq!(config.slow_threshold(), Some(Duration::from_millis(5)));
    }
}
