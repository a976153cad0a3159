//! Enforcement and notification.
//!
//! Turns an [`crate::authz::EnforcementDecision`] into at most one role
//! mutation and at most one structured log message.

pub mod enforcer;
pub mod message;

pub use enforcer::{EnforcementOutcome, Enforcer, MutationFailed};
pub use message::{EnforcementAction, EventContext, LogMessage};
