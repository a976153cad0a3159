//! Role-integrity reconciliation server
//!
//! Observes member role changes, attributes each change to its executor
//! through the platform audit trail, and reverts grants the authorization
//! policy does not permit.

pub mod api;
pub mod audit;
pub mod authz;
pub mod config;
pub mod enforce;
pub mod engine;
pub mod observability;
pub mod platform;
pub mod policy;
