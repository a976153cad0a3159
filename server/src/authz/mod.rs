//! Role change authorization.
//!
//! Given a classified role, the executor attribution and the policy snapshot,
//! decide whether the change is allowed, denied or suppressed.

pub mod decision;
pub mod evaluator;

pub use decision::{
    Attribution, EnforcementDecision, Executor, ReasonCode, RoleDelta, Verdict,
};
pub use evaluator::{evaluate_grant, evaluate_protected_removal};
