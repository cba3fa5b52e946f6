//! # policy-engine
//!
//! Per-user verdicts for outbound network flows. Rules are supplied once at
//! startup and compiled into an immutable store; evaluation is a pure
//! function of `(uid, hostname)` and is safe to call from any number of
//! threads at once.
//!
//! ## Quick start
//!
//! ```rust
//! use policy_engine::{PolicyEngine, UserRule, Verdict};
//!
//! let engine = PolicyEngine::new(vec![
//!     UserRule::default_deny(501, ["*.github.com"]),
//!     UserRule::default_allow(502, ["bad.com"]),
//! ]);
//!
//! assert_eq!(engine.evaluate(501, Some("api.github.com")), Verdict::Allow);
//! assert_eq!(engine.evaluate(501, Some("github.com")), Verdict::Deny);
//! assert_eq!(engine.evaluate(503, Some("anything.com")), Verdict::Allow);
//! ```

mod decision;
mod evaluator;
pub mod matcher;
mod schema;

// Re-export primary public API at crate root.
pub use decision::{DecisionReason, PolicyDecision, Verdict};
pub use evaluator::{PolicyEngine, PolicyStore};
pub use schema::{DefaultPolicy, UserRule, UNKNOWN_UID};
