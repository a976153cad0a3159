//! Role Warden Common Library
//!
//! Identifier types shared by the engine and its platform adapters.

pub mod ids;

pub use ids::*;
