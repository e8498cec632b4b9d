//! Post triage — keyword matching and policy gating.

pub mod matcher;
pub mod policy;
pub mod types;

pub use matcher::{Blacklist, BlacklistRule, KeywordRule, MatchEngine, MatchType, RuleScope};
pub use policy::PolicyGate;
pub use types::{Decision, MatchVerdict, Post, RejectReason};
