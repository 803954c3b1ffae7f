use reqhub_events::{Dispatcher, DispatcherConfig, ExecutionMode};
use serde_json::json;

#[test]
fn config_defaults_are_sane() {
    let config = DispatcherConfig::default();
    assert_eq!(config.execution, ExecutionMode::Auto);
    assert_eq!(config.thread_name, "event-dispatch");
    assert!(config.log_failures);
    assert!(config.slow_subscriber_ms.is_none());
}

#[test]
fn config_deserializes_with_partial_fields() {
    let raw = json!({ "execution": "thread", "slow_subscriber_ms": 250 });

    let config: DispatcherConfig = serde_json::from_value(raw).expect("config deserialize");
    assert_eq!(config.execution, ExecutionMode::Thread);
    assert_eq!(config.slow_subscriber_ms, Some(250));
    assert_eq!(config.thread_name, "event-dispatch");
    assert!(config.log_failures);
}

#[test]
fn config_rejects_unknown_execution_mode() {
    let raw = json!({ "execution": "parallel" });
    assert!(serde_json::from_value::<DispatcherConfig>(raw).is_err());
}

#[test]
fn dispatcher_normalizes_blank_thread_name() {
    let raw = json!({ "thread_name": "  " });
    let config: DispatcherConfig = serde_json::from_value(raw).expect("config deserialize");

    let dispatcher = Dispatcher::with_config(config);
    assert_eq!(dispatcher.config().thread_name, "event-dispatch");
}
