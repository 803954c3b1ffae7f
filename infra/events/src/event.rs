use crate::completion::{DoneReceiver, DoneSender, done_channel};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// An identified, mutable payload carrier routed by the [`Dispatcher`](crate::Dispatcher).
///
/// The ID selects the subscriber list. The payload is shared between the publisher and every
/// subscriber of one dispatch, so in-place mutations are visible downstream and to the
/// publisher once the dispatch has completed.
pub trait Event: Send + 'static {
    /// Stable identifier grouping subscribers. Must not be empty.
    fn id(&self) -> &str;

    /// The shared payload handle.
    fn payload(&self) -> &Payload;

    /// Hands out the event's own completion sender, if it carries one.
    ///
    /// Used by [`Dispatcher::emit`](crate::Dispatcher::emit). Returns `None` for
    /// fire-and-forget events and on every call after the first.
    fn take_done(&mut self) -> Option<DoneSender> {
        None
    }
}

/// Shared, type-erased, mutable payload.
///
/// Cloning is cheap and yields another handle to the same value. Access is serialized by a
/// non-poisoning lock: a subscriber that panics while holding it does not make the payload
/// unusable for the subscribers after it.
#[derive(Clone)]
pub struct Payload {
    inner: Arc<Mutex<Box<dyn Any + Send>>>,
}

impl Payload {
    /// Wraps a value into a new shared payload.
    pub fn new<T: Any + Send>(value: T) -> Self {
        let boxed: Box<dyn Any + Send> = Box::new(value);
        Self { inner: Arc::new(Mutex::new(boxed)) }
    }

    /// A payload carrying `()`, for events that only signal.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Returns `true` if the payload currently holds a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.inner.lock().is::<T>()
    }

    /// Locks the payload and returns a typed guard, or `None` if it does not hold a `T`.
    ///
    /// The guard must be dropped before the same payload is locked again on this thread.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<MappedMutexGuard<'_, T>> {
        MutexGuard::try_map(self.inner.lock(), |boxed| boxed.downcast_mut::<T>()).ok()
    }

    /// Runs `f` with shared access to the payload as `T`.
    pub fn with<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.get::<T>().map(|guard| f(&*guard))
    }

    /// Runs `f` with exclusive access to the payload as `T`.
    pub fn with_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.get::<T>().map(|mut guard| f(&mut *guard))
    }

    /// Replaces the payload with a value of any type, returning the previous value.
    pub fn replace<T: Any + Send>(&self, value: T) -> Box<dyn Any + Send> {
        let boxed: Box<dyn Any + Send> = Box::new(value);
        std::mem::replace(&mut *self.inner.lock(), boxed)
    }

    /// Returns `true` if both handles point at the same payload.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("handles", &Arc::strong_count(&self.inner)).finish()
    }
}

/// Ready-made [`Event`] implementation.
///
/// # Examples
/// ```rust
/// use reqhub_events::{Envelope, Event};
///
/// let (event, _done) = Envelope::new("config.validate", vec![1_u8, 2, 3]).with_done();
/// assert_eq!(event.id(), "config.validate");
/// assert_eq!(event.payload().with(|v: &Vec<u8>| v.len()), Some(3));
/// ```
#[derive(Debug)]
pub struct Envelope {
    id: Cow<'static, str>,
    payload: Payload,
    done: Option<DoneSender>,
}

impl Envelope {
    /// Creates a fire-and-forget event with a fresh payload.
    pub fn new<T: Any + Send>(id: impl Into<Cow<'static, str>>, value: T) -> Self {
        Self::with_payload(id, Payload::new(value))
    }

    /// Creates an event around an existing payload handle.
    pub fn with_payload(id: impl Into<Cow<'static, str>>, payload: Payload) -> Self {
        Self { id: id.into(), payload, done: None }
    }

    /// Attaches a completion channel and returns its receiving half.
    #[must_use = "Dropping the receiver discards the dispatch result."]
    pub fn with_done(mut self) -> (Self, DoneReceiver) {
        let (tx, rx) = done_channel();
        self.done = Some(tx);
        (self, rx)
    }
}

impl Event for Envelope {
    fn id(&self) -> &str {
        &self.id
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn take_done(&mut self) -> Option<DoneSender> {
        self.done.take()
    }
}

/// Per-dispatch control block handed to every subscriber of one publish call.
#[derive(Debug, Default)]
pub struct PublishArgs {
    /// Once `true`, no further subscriber of this dispatch is invoked.
    pub stop_propagation: bool,
    invoked: usize,
}

impl PublishArgs {
    /// Stops propagation after the current subscriber returns.
    pub const fn stop(&mut self) {
        self.stop_propagation = true;
    }

    /// Number of subscribers invoked so far in this dispatch, the current one included.
    #[must_use]
    pub const fn invoked(&self) -> usize {
        self.invoked
    }

    pub(crate) const fn mark_invoked(&mut self) {
        self.invoked += 1;
    }
}
