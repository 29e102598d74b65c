//! Caller-supplied fold hooks.
//!
//! The adaptor knows nothing about the application state it maintains;
//! the hosting entity supplies a [`ViewHost`] that defines the view, the
//! log entry payload, and how entries fold into the view. This replaces
//! the abstract-base-class-with-virtual-hooks shape of comparable
//! runtimes with a trait at the seam.

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Error returned by a rejecting apply hook.
///
/// Apply failures are isolated per entry: logged, counted, and never
/// allowed to abort the rest of a batch. A buggy fold for one entry must
/// not block convergence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ApplyError(String);

impl ApplyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Hooks a hosting entity implements to plug its state into the protocol.
pub trait ViewHost {
    /// The folded application state.
    type View: Clone + Debug + Serialize + DeserializeOwned;
    /// What the caller enqueues locally.
    type Update;
    /// What gets appended to the shared log.
    type Entry: Clone + Debug + Serialize + DeserializeOwned;

    /// The view before any log entry has been folded.
    fn initial_view(&self) -> Self::View;

    /// Folds one log entry into the view. May fail; failures are isolated
    /// per entry and do not roll back previously applied entries.
    fn apply(&self, view: &mut Self::View, entry: &Self::Entry) -> Result<(), ApplyError>;

    /// Converts a queued local update into the log entry to append.
    fn make_entry(&self, update: &Self::Update) -> Self::Entry;
}
