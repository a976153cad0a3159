//! Audit trail attribution.

pub mod backoff;
pub mod resolver;

pub use backoff::{BackoffSchedule, Retried, DEFAULT_RETRY_DELAYS_MS};
pub use resolver::{
    select_entry, AuditQuery, AuditResolution, AuditResolver, DEFAULT_MAX_ENTRY_AGE_SECS,
};
