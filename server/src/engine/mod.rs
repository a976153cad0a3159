//! Event intake and reconciliation.

pub mod dispatcher;
pub mod events;
pub mod reconciler;

pub use dispatcher::{event_queue, Dispatcher};
pub use events::{MemberUpdate, RoleChangeEvent};
pub use reconciler::{resolve_engine_user, Disposition, EventReport, Reconciler, RoleReport};
