//! # Event Dispatcher
//!
//! An in-process, synchronous publish/subscribe dispatcher used to decouple feature modules
//! (e.g. letting a domain module validate a configuration without the core knowing about it).
//!
//! ## Overview
//!
//! Subscribers are registered per event ID with an integer priority. Publishing an event walks
//! that ID's subscribers one after another on a single execution context and delivers one
//! [`DispatchReport`] through a one-shot completion channel.
//!
//! ## Guarantees
//!
//! * **Ordering**: ascending priority; equal priorities run in registration order.
//! * **Panic isolation**: a panicking subscriber becomes a [`DispatchError::Panicked`]; the
//!   walk continues with the next subscriber.
//! * **Error aggregation**: every failure is collected, in dispatch order.
//! * **Early stop**: [`PublishArgs::stop_propagation`] skips the remaining subscribers.
//! * **Completion**: exactly one report per completion channel, after which it is closed.
//!   Without a channel the dispatch is fire-and-forget and never blocks.
//! * **Snapshots**: the subscriber list is captured when `publish` is called; concurrent
//!   registrations never affect a dispatch that already started.
//!
//! # Example
//!
//! ```rust
//! use reqhub_events::{Dispatcher, Envelope, Event};
//!
//! #[derive(Debug, Default)]
//! struct ProjectConfig {
//!     template: String,
//!     validated: bool,
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::new();
//!
//!     dispatcher.subscribe("config.validate", |event, args| {
//!         let known = event.payload().with_mut(|cfg: &mut ProjectConfig| {
//!             cfg.validated = true;
//!             cfg.template == "iso-29148"
//!         });
//!         if known == Some(true) {
//!             args.stop();
//!             Ok(())
//!         } else {
//!             Err("unknown template".into())
//!         }
//!     }, 10);
//!
//!     let event = Envelope::new(
//!         "config.validate",
//!         ProjectConfig { template: "iso-29148".into(), ..Default::default() },
//!     );
//!     let payload = event.payload().clone();
//!
//!     let report = dispatcher.publish_and_wait(event).await;
//!     assert!(report.is_clean());
//!     assert_eq!(payload.with(|cfg: &ProjectConfig| cfg.validated), Some(true));
//! }
//! ```

mod completion;
mod config;
mod dispatcher;
mod error;
mod event;
mod registry;
mod subscriber;

pub use completion::{DispatchReport, DoneReceiver, DoneSender, TryRecvError, done_channel};
pub use config::{DispatcherConfig, ExecutionMode};
pub use dispatcher::Dispatcher;
pub use error::{BoxError, DispatchError, DispatchErrorExt};
pub use event::{Envelope, Event, Payload, PublishArgs};
pub use registry::Subscription;
pub use subscriber::{Named, Subscriber, named};
