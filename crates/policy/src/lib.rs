//! Policy module for PromptSmith: content tiers and allow lists.
//!
//! Provides:
//! - **Allow lists**: template and adapter checks for one tier
//! - **Policy gate**: the pre-composition candidate filter and the
//!   post-assembly check on the finished recipe

pub mod allowlist;
pub mod gate;

pub use allowlist::{AllowList, ListCheck};
pub use gate::{PolicyGate, PreFilter};
