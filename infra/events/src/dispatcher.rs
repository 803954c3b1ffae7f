use crate::completion::{DispatchReport, DoneReceiver, DoneSender, done_channel};
use crate::config::{DispatcherConfig, ExecutionMode};
use crate::error::{BoxError, DispatchError};
use crate::event::{Event, PublishArgs};
use crate::registry::{Entry, Registry, Snapshot, Subscription};
use crate::subscriber::Subscriber;
use std::any::Any;
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

/// In-process publish/subscribe dispatcher.
///
/// Subscribers are registered per event ID with an integer priority. A publish call walks the
/// subscribers of the event's ID sequentially, lowest priority first (ties in registration
/// order), catches panics, collects errors, honours [`PublishArgs::stop_propagation`] and
/// delivers one [`DispatchReport`] through the completion channel.
///
/// Cloning is cheap; all clones share one registry. Construct one per process and hand it to
/// the modules that need it.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    config: Arc<DispatcherConfig>,
}

impl Dispatcher {
    /// Creates a dispatcher with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher with a custom configuration.
    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self { registry: Arc::default(), config: Arc::new(config.normalized()) }
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Registers a subscriber function for `event_id`.
    ///
    /// Lower priorities run earlier; equal priorities run in registration order. The same
    /// function may be registered several times and then runs once per registration.
    ///
    /// # Examples
    /// ```rust
    /// use reqhub_events::{Dispatcher, Envelope};
    ///
    /// let dispatcher = Dispatcher::new();
    /// dispatcher.subscribe("config.validate", |event, _args| {
    ///     event.payload().with_mut(|seen: &mut Vec<i32>| seen.push(2));
    ///     Ok(())
    /// }, 2);
    /// dispatcher.subscribe("config.validate", |event, _args| {
    ///     event.payload().with_mut(|seen: &mut Vec<i32>| seen.push(1));
    ///     Ok(())
    /// }, 1);
    ///
    /// let event = Envelope::new("config.validate", Vec::<i32>::new());
    /// let payload = event.payload().clone();
    /// # use reqhub_events::Event;
    /// assert!(dispatcher.dispatch(event).is_clean());
    /// assert_eq!(payload.with(|seen: &Vec<i32>| seen.clone()), Some(vec![1, 2]));
    /// ```
    pub fn subscribe<F>(&self, event_id: &str, subscriber: F, priority: i32) -> Subscription
    where
        F: Fn(&dyn Event, &mut PublishArgs) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.subscribe_with(event_id, subscriber, priority)
    }

    /// Registers any [`Subscriber`] implementation for `event_id`.
    pub fn subscribe_with<S: Subscriber>(
        &self,
        event_id: &str,
        subscriber: S,
        priority: i32,
    ) -> Subscription {
        self.registry.insert(event_id, Arc::new(subscriber), priority)
    }

    /// Removes a registration. Returns `false` if it was already removed.
    ///
    /// Dispatches that already started keep running the subscriber.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.registry.remove(subscription)
    }

    /// Number of subscribers currently registered for `event_id`.
    #[must_use]
    pub fn subscriber_count(&self, event_id: &str) -> usize {
        self.registry.len(event_id)
    }

    /// Sorted list of event IDs with at least one subscriber.
    #[must_use]
    pub fn event_ids(&self) -> Vec<String> {
        self.registry.event_ids()
    }

    /// Drops every registration. Returns the number of event IDs that were cleared.
    #[must_use = "The number of cleared event IDs is returned for diagnostics"]
    pub fn clear(&self) -> usize {
        self.registry.clear()
    }

    /// Publishes `event` without blocking the caller.
    ///
    /// The subscriber list is snapshotted before this call returns; later registrations do not
    /// take part in this dispatch. With `done` present, exactly one [`DispatchReport`] is
    /// delivered and the channel closes. With `done` absent, the report is discarded.
    ///
    /// Where the walk runs is decided by [`DispatcherConfig::execution`].
    pub fn publish<E: Event>(&self, event: E, done: Option<DoneSender>) {
        let job = Job { snapshot: self.snapshot_for(&event), event, done };

        match self.config.execution {
            ExecutionMode::Inline => job.run(&self.config),
            ExecutionMode::Auto => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let config = self.config.clone();
                    drop(handle.spawn_blocking(move || job.run(&config)));
                },
                Err(_) => self.spawn_thread(job),
            },
            ExecutionMode::Thread => self.spawn_thread(job),
        }
    }

    /// Publishes `event`, delivering the report through the event's own completion sender
    /// ([`Event::take_done`]). Fire-and-forget when the event carries none.
    pub fn emit<E: Event>(&self, mut event: E) {
        let done = event.take_done();
        self.publish(event, done);
    }

    /// Publishes `event` and waits for its report.
    pub async fn publish_and_wait<E: Event>(&self, event: E) -> DispatchReport {
        let event_id = event.id().to_owned();
        let (tx, rx) = done_channel();
        self.publish(event, Some(tx));
        await_report(event_id, rx).await
    }

    /// Runs the subscriber walk on the caller's thread and returns the report.
    #[must_use = "The report carries every subscriber failure"]
    pub fn dispatch<E: Event>(&self, event: E) -> DispatchReport {
        let snapshot = self.snapshot_for(&event);
        walk(&event, snapshot.as_deref().map_or(&[][..], Vec::as_slice), &self.config)
    }

    fn snapshot_for<E: Event>(&self, event: &E) -> Option<Snapshot> {
        if event.id().is_empty() { None } else { self.registry.snapshot(event.id()) }
    }

    fn spawn_thread<E: Event>(&self, job: Job<E>) {
        let config = self.config.clone();
        let slot = Arc::new(parking_lot::Mutex::new(Some(job)));
        let handoff = slot.clone();

        let spawned = std::thread::Builder::new().name(config.thread_name.clone()).spawn({
            let config = config.clone();
            move || {
                let job = handoff.lock().take();
                if let Some(job) = job {
                    job.run(&config);
                }
            }
        });

        if let Err(e) = spawned {
            error!(
                error = %e,
                thread = %config.thread_name,
                "Failed to spawn dispatch thread; running inline"
            );
            let job = slot.lock().take();
            if let Some(job) = job {
                job.run(&config);
            }
        }
    }
}

/// One scheduled publish call.
struct Job<E> {
    event: E,
    snapshot: Option<Snapshot>,
    done: Option<DoneSender>,
}

impl<E: Event> Job<E> {
    fn run(self, config: &DispatcherConfig) {
        let entries = self.snapshot.as_deref().map_or(&[][..], Vec::as_slice);
        let report = walk(&self.event, entries, config);

        match self.done {
            Some(done) => done.send(report),
            None => trace!(event = report.event_id(), "Fire-and-forget dispatch finished"),
        }
    }
}

/// Waits for one report, standing in an `Abandoned` report if the sender is dropped unsent.
async fn await_report(event_id: String, mut rx: DoneReceiver) -> DispatchReport {
    match rx.recv().await {
        Some(report) => report,
        None => {
            error!(event = %event_id, "Dispatch abandoned before reporting");
            DispatchReport::new(
                event_id,
                vec![DispatchError::Abandoned {
                    message: "completion sender dropped without a report".into(),
                    context: None,
                }],
                0,
                false,
            )
        },
    }
}

/// Drops a panic payload whose destructor may itself panic.
fn discard_payload(payload: Box<dyn Any + Send>) {
    if let Err(nested) = catch_unwind(AssertUnwindSafe(|| drop(payload))) {
        std::mem::forget(nested);
    }
}

/// Formats a subscriber-supplied error for logging, tolerating a panicking `Display`.
fn render<T: Display + ?Sized>(err: &T) -> String {
    match catch_unwind(AssertUnwindSafe(|| err.to_string())) {
        Ok(text) => text,
        Err(nested) => {
            discard_payload(nested);
            "<error display panicked>".to_owned()
        },
    }
}

/// Invokes `entries` in order against one event. Never panics on behalf of a subscriber.
fn walk(event: &dyn Event, entries: &[Entry], config: &DispatcherConfig) -> DispatchReport {
    let event_id = event.id();

    if event_id.is_empty() {
        warn!("Rejected event with an empty ID");
        return DispatchReport::new(
            String::new(),
            vec![DispatchError::InvalidEvent {
                message: "event ID must not be empty".into(),
                context: None,
            }],
            0,
            false,
        );
    }

    trace!(event = event_id, subscribers = entries.len(), "Dispatch started");

    let slow = config.slow_threshold();
    let mut args = PublishArgs::default();
    let mut errors = Vec::new();
    let mut stopped = false;

    for (position, entry) in entries.iter().enumerate() {
        args.mark_invoked();
        let started = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| entry.subscriber.handle(event, &mut args)));

        match outcome {
            Ok(Ok(())) => {},
            Ok(Err(source)) => {
                if config.log_failures {
                    warn!(
                        event = event_id,
                        subscriber = %entry.name,
                        priority = entry.priority,
                        error = %render(&*source),
                        "Subscriber failed"
                    );
                }
                errors.push(DispatchError::Subscriber {
                    source,
                    context: Some(entry.label(position)),
                });
            },
            Err(panic) => {
                let err = DispatchError::panicked(&*panic, entry.label(position));
                discard_payload(panic);
                if config.log_failures {
                    error!(
                        event = event_id,
                        subscriber = %entry.name,
                        priority = entry.priority,
                        error = %render(&err),
                        "Subscriber panicked"
                    );
                }
                errors.push(err);
            },
        }

        if let Some(limit) = slow {
            let elapsed = started.elapsed();
            if elapsed > limit {
                warn!(
                    event = event_id,
                    subscriber = %entry.name,
                    ?elapsed,
                    ?limit,
                    "Slow subscriber"
                );
            }
        }

        if args.stop_propagation {
            stopped = true;
            let skipped = entries.len() - position - 1;
            debug!(event = event_id, subscriber = %entry.name, skipped, "Propagation stopped");
            break;
        }
    }

    trace!(
        event = event_id,
        invoked = args.invoked(),
        errors = errors.len(),
        stopped,
        "Dispatch finished"
    );
    DispatchReport::new(event_id.to_owned(), errors, args.invoked(), stopped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Envelope;
    use parking_lot::Mutex;

    fn inline() -> Dispatcher {
        Dispatcher::with_config(DispatcherConfig::default().with_execution(ExecutionMode::Inline))
    }

    #[test]
    fn test_walk_without_subscribers_is_clean() {
        let report = walk(&Envelope::new("nobody", ()), &[], &DispatcherConfig::default());
        assert!(report.is_clean());
        assert_eq!(report.invoked(), 0);
        assert!(!report.stopped());
    }

    #[test]
    fn test_empty_id_is_reported_not_raised() {
        let dispatcher = inline();
        dispatcher.subscribe("", |_, _| Ok(()), 0);

        let report = dispatcher.dispatch(Envelope::new("", ()));
        assert_eq!(report.errors().len(), 1);
        assert!(matches!(report.errors()[0], DispatchError::InvalidEvent { .. }));
        assert_eq!(report.invoked(), 0);
    }

    #[test]
    fn test_inline_publish_delivers_before_returning() {
        let dispatcher = inline();
        dispatcher.subscribe("x", |_, _| Err("nope".into()), 0);

        let (tx, mut rx) = done_channel();
        dispatcher.publish(Envelope::new("x", ()), Some(tx));

        let report = rx.try_recv().expect("inline dispatch reports synchronously");
        assert_eq!(report.errors().len(), 1);
    }

    #[test]
    fn test_error_context_names_subscriber() {
        let dispatcher = inline();
        dispatcher.subscribe_with("x", crate::named("validator", |_, _| Err("bad".into())), 4);

        let report = dispatcher.dispatch(Envelope::new("x", ()));
        assert_eq!(report.errors()[0].context_str(), Some("validator (priority 4, position 0)"));
    }

    #[test]
    fn test_invoked_counter_visible_to_subscribers() {
        let dispatcher = inline();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for priority in 0..3 {
            let seen = seen.clone();
            dispatcher.subscribe(
                "x",
                move |_, args| {
                    seen.lock().push(args.invoked());
                    Ok(())
                },
                priority,
            );
        }

        let report = dispatcher.dispatch(Envelope::new("x", ()));
        assert_eq!(report.invoked(), 3);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dropped_sender_yields_abandoned_report() {
        let (tx, rx) = done_channel();
        drop(tx);

        let report = await_report("orphan".to_owned(), rx).await;

        assert_eq!(report.event_id(), "orphan");
        assert_eq!(report.invoked(), 0);
        assert!(!report.stopped());
        assert!(matches!(report.errors(), [DispatchError::Abandoned { .. }]));
    }

    #[test]
    fn test_render_survives_panicking_display() {
        struct Garbled;

        impl std::fmt::Display for Garbled {
            fn fmt(&self, _: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                panic!("display exploded")
            }
        }

        assert_eq!(render(&Garbled), "<error display panicked>");
        assert_eq!(render("plain"), "plain");
    }

    #[test]
    fn test_thread_mode_without_runtime() {
        let dispatcher = Dispatcher::with_config(
            DispatcherConfig::default()
                .with_execution(ExecutionMode::Thread)
                .with_thread_name("dispatch-test"),
        );
        let thread_name = Arc::new(Mutex::new(None));
        let sink = thread_name.clone();
        dispatcher.subscribe(
            "x",
            move |_, _| {
                *sink.lock() = std::thread::current().name().map(str::to_owned);
                Ok(())
            },
            0,
        );

        let (event, mut rx) = Envelope::new("x", ()).with_done();
        dispatcher.emit(event);

        assert!(rx.blocking_recv().unwrap().is_clean());
        assert_eq!(thread_name.lock().as_deref(), Some("dispatch-test"));
    }
}
