use crate::error::BoxError;
use crate::event::{Event, PublishArgs};
use std::borrow::Cow;
use std::fmt;

/// A function invoked for every published event whose ID it was registered under.
///
/// Implemented for any `Fn(&dyn Event, &mut PublishArgs) -> Result<(), BoxError>` closure, so
/// most callers never implement it by hand.
///
/// # Examples
/// ```rust
/// use reqhub_events::{BoxError, Event, PublishArgs, Subscriber};
/// use std::borrow::Cow;
///
/// struct RejectEmpty;
///
/// impl Subscriber for RejectEmpty {
///     fn handle(&self, event: &dyn Event, _args: &mut PublishArgs) -> Result<(), BoxError> {
///         match event.payload().with(|s: &String| s.is_empty()) {
///             Some(true) => Err("empty document".into()),
///             _ => Ok(()),
///         }
///     }
///
///     fn name(&self) -> Cow<'static, str> {
///         "reject-empty".into()
///     }
/// }
/// ```
pub trait Subscriber: Send + Sync + 'static {
    /// Handles one event. Errors are collected into the dispatch report.
    ///
    /// # Errors
    /// Any error is recorded verbatim; it never stops the remaining subscribers.
    fn handle(&self, event: &dyn Event, args: &mut PublishArgs) -> Result<(), BoxError>;

    /// Label used in logs and in the context of collected errors.
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

impl<F> Subscriber for F
where
    F: Fn(&dyn Event, &mut PublishArgs) -> Result<(), BoxError> + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, event: &dyn Event, args: &mut PublishArgs) -> Result<(), BoxError> {
        self(event, args)
    }
}

/// A subscriber with an explicit label. Built with [`named`].
pub struct Named<S> {
    name: Cow<'static, str>,
    inner: S,
}

/// Labels a subscriber closure for logs and error context.
///
/// # Examples
/// ```rust
/// use reqhub_events::{Dispatcher, named};
///
/// let dispatcher = Dispatcher::new();
/// dispatcher.subscribe_with("config.validate", named("noop", |_, _| Ok(())), 0);
/// assert_eq!(dispatcher.subscriber_count("config.validate"), 1);
/// ```
pub fn named<F>(name: impl Into<Cow<'static, str>>, inner: F) -> Named<F>
where
    F: Fn(&dyn Event, &mut PublishArgs) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Named { name: name.into(), inner }
}

impl<S: Subscriber> Subscriber for Named<S> {
    #[inline]
    fn handle(&self, event: &dyn Event, args: &mut PublishArgs) -> Result<(), BoxError> {
        self.inner.handle(event, args)
    }

    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }
}

impl<S> fmt::Debug for Named<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Named").field("name", &self.name).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Envelope;

    #[test]
    fn test_closure_is_subscriber() {
        let sub = |event: &dyn Event, args: &mut PublishArgs| -> Result<(), BoxError> {
            if event.id() == "stop" {
                args.stop();
            }
            Ok(())
        };

        let mut args = PublishArgs::default();
        sub.handle(&Envelope::new("stop", ()), &mut args).unwrap();
        assert!(args.stop_propagation);
    }

    #[test]
    fn test_named_overrides_label() {
        let sub = named("audit", |_, _| Ok(()));
        assert_eq!(sub.name(), "audit");
        assert!(format!("{sub:?}").contains("audit"));
    }
}
