//! Safety evaluator.
//!
//! Decides, before any bulk query runs, whether a download may proceed
//! ([`Verdict::Allow`]), needs confirmation ([`Verdict::Warn`]) or must not
//! run at all ([`Verdict::Block`]). Rules:
//!
//! - no spatial filter: always Block
//! - WGS84 filter area against the warn/block square-degree limits
//! - server feature count against the warn/block limits, tightened for
//!   high-density layer categories
//! - feature count times an average size against the file size limit
//!
//! The combined verdict is the most restrictive one; decreasing the count or
//! the area never makes it stricter.

mod decision;
mod evaluator;
mod policy;

pub use decision::{group_thousands, square_miles, SafetyDecision, Verdict, MILES_PER_DEGREE};
pub use evaluator::{assess, FeatureCount, SafetyEvaluator, SafetyInputs, NO_FILTER_REASON};
pub use policy::SafetyPolicy;
