use std::any::Any;
use std::borrow::Cow;

/// Boxed error returned by subscribers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors collected while dispatching an event.
///
/// None of these are returned from [`Dispatcher::publish`](crate::Dispatcher::publish);
/// they are aggregated per dispatch and delivered through the completion channel.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A subscriber returned an error.
    #[error("Subscriber failed{}: {source}", format_context(.context))]
    Subscriber { source: BoxError, context: Option<Cow<'static, str>> },

    /// A subscriber panicked. The panic was caught at the dispatch boundary.
    #[error("Subscriber panicked{}: {message}", format_context(.context))]
    Panicked { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The published event cannot be routed (e.g. its ID is empty).
    #[error("Invalid event{}: {message}", format_context(.context))]
    InvalidEvent { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The dispatch ended without delivering a report (e.g. the runtime shut down first).
    #[error("Dispatch abandoned{}: {message}", format_context(.context))]
    Abandoned { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl DispatchError {
    /// Returns `true` if this error was produced from a caught panic.
    #[must_use]
    pub const fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Returns `true` if this error was returned by a subscriber.
    #[must_use]
    pub const fn is_subscriber(&self) -> bool {
        matches!(self, Self::Subscriber { .. })
    }

    /// The context attached to this error, if any.
    #[must_use]
    pub fn context_str(&self) -> Option<&str> {
        match self {
            Self::Subscriber { context, .. }
            | Self::Panicked { context, .. }
            | Self::InvalidEvent { context, .. }
            | Self::Abandoned { context, .. } => context.as_deref(),
        }
    }

    pub(crate) fn panicked(payload: &(dyn Any + Send), context: Cow<'static, str>) -> Self {
        Self::Panicked { message: panic_message(payload), context: Some(context) }
    }
}

impl From<BoxError> for DispatchError {
    #[inline]
    fn from(source: BoxError) -> Self {
        Self::Subscriber { source, context: None }
    }
}

/// Adds `.context(...)` to dispatch results.
pub trait DispatchErrorExt<T> {
    /// Attaches (or replaces) the context of the error.
    ///
    /// # Errors
    /// Returns the original error, converted into [`DispatchError`], with the context set.
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, DispatchError>;
}

impl<T> DispatchErrorExt<T> for Result<T, DispatchError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                DispatchError::Subscriber { context: c, .. }
                | DispatchError::Panicked { context: c, .. }
                | DispatchError::InvalidEvent { context: c, .. }
                | DispatchError::Abandoned { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl<T> DispatchErrorExt<T> for Result<T, BoxError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, DispatchError> {
        self.map_err(|source| DispatchError::Subscriber { source, context: Some(context.into()) })
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Cow<'static, str> {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        Cow::Borrowed(*msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        Cow::Owned(msg.clone())
    } else if let Some(msg) = payload.downcast_ref::<Cow<'static, str>>() {
        msg.clone()
    } else {
        Cow::Borrowed("unknown panic payload")
    }
}
