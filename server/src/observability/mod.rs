//! Observability: structured logging setup.
//!
//! Call [`init`] once at the top of `main`, before anything logs.

pub mod subscriber;

pub use subscriber::init;
