use crate::error::DispatchError;
use std::fmt;
use tokio::sync::oneshot;
use tracing::trace;

pub use tokio::sync::oneshot::error::TryRecvError;

/// Creates a one-shot completion channel for a single publish call.
///
/// The channel buffers its single value, so the dispatcher never waits for the publisher.
/// Dropping the [`DoneReceiver`] without reading it simply discards the report.
///
/// # Examples
/// ```rust
/// use reqhub_events::{Dispatcher, Envelope, done_channel};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let dispatcher = Dispatcher::new();
/// let (tx, mut rx) = done_channel();
/// dispatcher.publish(Envelope::new("ping", ()), Some(tx));
///
/// let report = rx.recv().await.expect("first read yields the report");
/// assert!(report.is_clean());
/// assert!(rx.recv().await.is_none(), "second read observes the closed channel");
/// # }
/// ```
#[must_use = "Dropping the receiver discards the dispatch result."]
pub fn done_channel() -> (DoneSender, DoneReceiver) {
    let (tx, rx) = oneshot::channel();
    (DoneSender { inner: tx }, DoneReceiver { inner: Some(rx) })
}

/// Sending half of a completion channel. Owned by the dispatcher for one publish call.
pub struct DoneSender {
    inner: oneshot::Sender<DispatchReport>,
}

impl DoneSender {
    /// Delivers the report and closes the channel.
    ///
    /// Consuming `self` makes a second send impossible. A receiver that is already gone is not
    /// an error; the report is dropped.
    pub fn send(self, report: DispatchReport) {
        if let Err(report) = self.inner.send(report) {
            trace!(event = report.event_id(), "Completion receiver dropped; report discarded");
        }
    }

    /// Returns `true` if the receiving half has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl fmt::Debug for DoneSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoneSender").field("closed", &self.inner.is_closed()).finish()
    }
}

/// Receiving half of a completion channel.
///
/// The first successful read yields the [`DispatchReport`]; every later read observes the
/// closed channel.
pub struct DoneReceiver {
    inner: Option<oneshot::Receiver<DispatchReport>>,
}

impl DoneReceiver {
    /// Waits for the dispatch to finish.
    ///
    /// Returns `None` once the report has been consumed, or if the dispatch was abandoned
    /// without producing one.
    pub async fn recv(&mut self) -> Option<DispatchReport> {
        let rx = self.inner.as_mut()?;
        let report = rx.await.ok();
        self.inner = None;
        report
    }

    /// Non-blocking read.
    ///
    /// # Errors
    /// [`TryRecvError::Empty`] while the dispatch is still running,
    /// [`TryRecvError::Closed`] after the report has been consumed.
    pub fn try_recv(&mut self) -> Result<DispatchReport, TryRecvError> {
        let rx = self.inner.as_mut().ok_or(TryRecvError::Closed)?;
        match rx.try_recv() {
            Ok(report) => {
                self.inner = None;
                Ok(report)
            },
            Err(TryRecvError::Closed) => {
                self.inner = None;
                Err(TryRecvError::Closed)
            },
            Err(TryRecvError::Empty) => Err(TryRecvError::Empty),
        }
    }

    /// Blocks the current thread until the dispatch finishes.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context; use
    /// [`DoneReceiver::recv`] there.
    pub fn blocking_recv(&mut self) -> Option<DispatchReport> {
        self.inner.take()?.blocking_recv().ok()
    }

    /// Returns `true` once the report has been consumed.
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl fmt::Debug for DoneReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoneReceiver").field("terminated", &self.inner.is_none()).finish()
    }
}

/// Outcome of one dispatch: the aggregated error list plus walk statistics.
#[derive(Debug)]
pub struct DispatchReport {
    event_id: String,
    errors: Vec<DispatchError>,
    invoked: usize,
    stopped: bool,
}

impl DispatchReport {
    pub(crate) const fn new(
        event_id: String,
        errors: Vec<DispatchError>,
        invoked: usize,
        stopped: bool,
    ) -> Self {
        Self { event_id, errors, invoked, stopped }
    }

    /// ID of the dispatched event.
    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Errors in dispatch order. Empty for a clean dispatch.
    #[must_use]
    pub fn errors(&self) -> &[DispatchError] {
        &self.errors
    }

    /// Consumes the report, returning the error list.
    #[must_use]
    pub fn into_errors(self) -> Vec<DispatchError> {
        self.errors
    }

    /// `Ok(())` for a clean dispatch, otherwise the error list.
    ///
    /// # Errors
    /// Returns every collected error if at least one subscriber failed.
    pub fn into_result(self) -> Result<(), Vec<DispatchError>> {
        if self.errors.is_empty() { Ok(()) } else { Err(self.errors) }
    }

    /// `true` if no subscriber failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of subscribers that were invoked.
    #[must_use]
    pub const fn invoked(&self) -> usize {
        self.invoked
    }

    /// `true` if a subscriber requested stop propagation.
    #[must_use]
    pub const fn stopped(&self) -> bool {
        self.stopped
    }
}
