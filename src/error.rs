//! Unified error types for the disinfection controller.
//!
//! Construction-time failures (bad configuration, an inconsistent
//! transition table, a dead mailbox) funnel into [`Error`].  Failures raised
//! *inside* a running unit are [`TaskError`]s: either the controlled
//! "stop repeating" signal or a fatal cause that ends the unit.

use core::fmt;

use crate::app::ports::ConfigError;
use crate::fsm::{StateId, Trigger};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible setup or messaging operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// A message could not be delivered to a unit.
    Mailbox(MailboxError),
    /// The static transition table failed validation.
    Table(TableError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Mailbox(e) => write!(f, "mailbox: {e}"),
            Self::Table(e) => write!(f, "transition table: {e}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Mailbox errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    /// The bounded inbox is full; the message was dropped.
    Full,
    /// The unit has stopped and no longer accepts messages.
    Closed,
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "inbox full"),
            Self::Closed => write!(f, "unit stopped"),
        }
    }
}

impl From<MailboxError> for Error {
    fn from(e: MailboxError) -> Self {
        Self::Mailbox(e)
    }
}

// ---------------------------------------------------------------------------
// Transition table errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Two rows route the same trigger out of the same state.
    Ambiguous { trigger: Trigger, source: StateId },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambiguous { trigger, source } => {
                write!(f, "trigger {trigger} routed twice from {source}")
            }
        }
    }
}

impl From<TableError> for Error {
    fn from(e: TableError) -> Self {
        Self::Table(e)
    }
}

// ---------------------------------------------------------------------------
// Unit task errors
// ---------------------------------------------------------------------------

/// Outcome of a task body that did not complete normally.
#[derive(Debug)]
pub enum TaskError {
    /// Controlled stop: the task must not be re-armed.  Not a failure.
    StopRepeat,
    /// Any other failure.  Fatal to the owning unit.
    Fatal(anyhow::Error),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopRepeat => write!(f, "stop repeating"),
            Self::Fatal(e) => write!(f, "fatal: {e:#}"),
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(e: anyhow::Error) -> Self {
        Self::Fatal(e)
    }
}

impl From<MailboxError> for TaskError {
    fn from(e: MailboxError) -> Self {
        Self::Fatal(anyhow::Error::new(Error::Mailbox(e)))
    }
}

impl From<Error> for TaskError {
    fn from(e: Error) -> Self {
        Self::Fatal(anyhow::Error::new(e))
    }
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Result of a unit's task body.
pub type TaskResult = core::result::Result<(), TaskError>;
