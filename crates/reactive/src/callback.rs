//! Callbacks registered on collections.

use crate::change_set::ChangeSet;
use std::fmt;
use std::rc::Rc;
use vellum_core::Error;

/// Identifies one registered callback within its collection.
pub type CallbackToken = u64;

/// Callback invoked with the changes of one delivery.
pub type ChangeCallback = Rc<dyn Fn(&ChangeSet)>;

/// Callback invoked with either the changes or the error that ended them.
pub type OutcomeCallback = Rc<dyn Fn(Result<&ChangeSet, &Error>)>;

/// Callback invoked with the error that ended a notifier's run.
pub type ErrorCallback = Rc<dyn Fn(&Error)>;

/// The shapes of callback a collection accepts.
///
/// Callbacks are shared (`Rc`), not boxed, so that a delivery nested inside
/// one of them can invoke the same callback again. Every shape can receive
/// the error of a failed run; `on_error` attaches a handler to the shapes
/// that take changes only.
#[derive(Clone)]
pub enum CollectionCallback {
    /// Called after the collection advanced
    Changes {
        changes: ChangeCallback,
        error: Option<ErrorCallback>,
    },
    /// Receives either the changes or the error
    Outcome(OutcomeCallback),
    /// `before` runs while the collection still shows the old rows,
    /// `after` once it shows the new ones
    BeforeAfter {
        before: ChangeCallback,
        after: ChangeCallback,
        error: Option<ErrorCallback>,
    },
}

impl CollectionCallback {
    /// Wraps a change callback.
    pub fn changes<F>(f: F) -> Self
    where
        F: Fn(&ChangeSet) + 'static,
    {
        Self::Changes {
            changes: Rc::new(f),
            error: None,
        }
    }

    /// Wraps a callback that also receives errors.
    pub fn outcome<F>(f: F) -> Self
    where
        F: Fn(Result<&ChangeSet, &Error>) + 'static,
    {
        Self::Outcome(Rc::new(f))
    }

    /// Wraps a pair of callbacks around the collection advancing.
    pub fn before_after<B, A>(before: B, after: A) -> Self
    where
        B: Fn(&ChangeSet) + 'static,
        A: Fn(&ChangeSet) + 'static,
    {
        Self::BeforeAfter {
            before: Rc::new(before),
            after: Rc::new(after),
            error: None,
        }
    }

    /// Adds a handler for the error of a failed run.
    ///
    /// On an `Outcome` callback the handler runs after the callback itself.
    pub fn on_error<F>(self, f: F) -> Self
    where
        F: Fn(&Error) + 'static,
    {
        let handler: ErrorCallback = Rc::new(f);
        match self {
            Self::Changes { changes, .. } => Self::Changes {
                changes,
                error: Some(handler),
            },
            Self::BeforeAfter { before, after, .. } => Self::BeforeAfter {
                before,
                after,
                error: Some(handler),
            },
            Self::Outcome(outcome) => {
                Self::Outcome(Rc::new(move |result: Result<&ChangeSet, &Error>| {
                    outcome(result);
                    if let Err(e) = result {
                        handler(e);
                    }
                }))
            }
        }
    }

    /// Invoked before the collection advances.
    pub(crate) fn before(&self, changes: &ChangeSet) {
        if let Self::BeforeAfter { before, .. } = self {
            before(changes);
        }
    }

    /// Invoked after the collection advanced.
    pub(crate) fn after(&self, changes: &ChangeSet) {
        match self {
            Self::Changes { changes: f, .. } => f(changes),
            Self::Outcome(f) => f(Ok(changes)),
            Self::BeforeAfter { after, .. } => after(changes),
        }
    }

    /// Invoked once when the notifier fails, in place of a change set; the
    /// callback is then removed.
    pub(crate) fn error(&self, error: &Error) {
        match self {
            Self::Outcome(f) => f(Err(error)),
            Self::Changes { error: Some(f), .. } | Self::BeforeAfter { error: Some(f), .. } => {
                f(error)
            }
            _ => log::warn!("notification callback without error handler removed: {}", error),
        }
    }
}

impl fmt::Debug for CollectionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Changes { .. } => "Changes",
            Self::Outcome(_) => "Outcome",
            Self::BeforeAfter { .. } => "BeforeAfter",
        };
        f.debug_tuple("CollectionCallback").field(&kind).finish()
    }
}
