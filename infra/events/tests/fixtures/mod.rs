#![allow(dead_code, unreachable_pub)]

use parking_lot::Mutex;
use reqhub_events::{Dispatcher, DispatcherConfig, ExecutionMode};
use std::sync::Arc;

/// Shared, append-only log subscribers write into.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<i32>>>);

impl CallLog {
    pub fn push(&self, value: i32) {
        self.0.lock().push(value);
    }

    #[must_use]
    pub fn entries(&self) -> Vec<i32> {
        self.0.lock().clone()
    }
}

/// Payload used by the configuration validation scenario.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TemplateConfig {
    pub template: String,
    pub handled: bool,
}

/// Registers a subscriber that appends `value` to `log`.
pub fn record(dispatcher: &Dispatcher, id: &str, log: &CallLog, value: i32, priority: i32) {
    let log = log.clone();
    dispatcher.subscribe(
        id,
        move |_, _| {
            log.push(value);
            Ok(())
        },
        priority,
    );
}

#[must_use]
pub fn inline_dispatcher() -> Dispatcher {
    Dispatcher::with_config(DispatcherConfig::default().with_execution(ExecutionMode::Inline))
}
