//! Pre-flight evaluation of a download request.

use tracing::{debug, info, warn};

use super::decision::{square_miles, SafetyDecision, Verdict};
use super::policy::SafetyPolicy;
use crate::coord::BoundingBox;
use crate::filter::SpatialFilter;
use crate::rest::{Layer, RestClient};
use crate::transport::AsyncHttpClient;

/// Reason attached when a request has no spatial filter.
pub const NO_FILTER_REASON: &str = "no spatial filter provided";

/// Server feature count as seen by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureCount {
    Known(u64),
    /// The count query failed or timed out
    Unavailable(String),
    NotQueried,
}

/// Everything a verdict depends on, gathered before the rules run.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyInputs {
    /// WGS84 bounds of the filter; `None` means no filter at all
    pub filter_bounds: Option<BoundingBox>,
    pub count: FeatureCount,
    pub high_density: bool,
}

/// Applies `policy` to `inputs`. Pure; no I/O.
///
/// Each rule yields its own verdict and reason. The combined verdict is the
/// most restrictive one and every triggered reason is kept.
pub fn assess(policy: &SafetyPolicy, inputs: &SafetyInputs) -> SafetyDecision {
    let mut verdict = Verdict::Allow;
    let mut reasons = Vec::new();
    let mut raise = |v: Verdict, reason: String, reasons: &mut Vec<String>| {
        verdict = verdict.max(v);
        reasons.push(reason);
    };

    let Some(bounds) = inputs.filter_bounds else {
        raise(Verdict::Block, NO_FILTER_REASON.to_string(), &mut reasons);
        return SafetyDecision {
            verdict,
            feature_count: known(&inputs.count),
            extent_sq_deg: None,
            bounds: None,
            estimated_bytes: known(&inputs.count).map(|c| c * policy.bytes_per_feature()),
            high_density: inputs.high_density,
            reasons,
        };
    };

    // Extent rule
    let area = bounds.area();
    let miles = square_miles(&bounds);
    if area > policy.block_extent_sq_deg() {
        raise(
            Verdict::Block,
            format!(
                "extent {:.4} sq deg (~{:.0} sq mi) exceeds hard limit {:.4} sq deg",
                area,
                miles,
                policy.block_extent_sq_deg()
            ),
            &mut reasons,
        );
    } else if area >= policy.warn_extent_sq_deg() {
        raise(
            Verdict::Warn,
            format!(
                "extent {:.4} sq deg (~{:.0} sq mi) exceeds warning threshold {:.4} sq deg",
                area,
                miles,
                policy.warn_extent_sq_deg()
            ),
            &mut reasons,
        );
    }

    // Count rule
    let (warn_limit, block_limit) = policy.feature_limits(inputs.high_density);
    let class = if inputs.high_density {
        " for high-density layer"
    } else {
        ""
    };
    let mut estimated_bytes = None;
    match &inputs.count {
        FeatureCount::Known(count) => {
            let count = *count;
            if count > block_limit {
                raise(
                    Verdict::Block,
                    format!("feature count {} exceeds hard limit {}{}", count, block_limit, class),
                    &mut reasons,
                );
            } else if count >= warn_limit {
                raise(
                    Verdict::Warn,
                    format!(
                        "feature count {} exceeds warning threshold {}{}",
                        count, warn_limit, class
                    ),
                    &mut reasons,
                );
            }

            // Size rule
            let bytes = count.saturating_mul(policy.bytes_per_feature());
            let mb = bytes as f64 / (1024.0 * 1024.0);
            if mb > policy.warn_file_size_mb() {
                raise(
                    Verdict::Warn,
                    format!(
                        "estimated output ~{:.1} MB exceeds {:.0} MB",
                        mb,
                        policy.warn_file_size_mb()
                    ),
                    &mut reasons,
                );
            }
            estimated_bytes = Some(bytes);
        }
        FeatureCount::Unavailable(error) => {
            raise(
                Verdict::Warn,
                format!("feature count unavailable ({}); dataset may be very large", error),
                &mut reasons,
            );
        }
        FeatureCount::NotQueried => {}
    }

    SafetyDecision {
        verdict,
        feature_count: known(&inputs.count),
        extent_sq_deg: Some(area),
        bounds: Some(bounds),
        estimated_bytes,
        high_density: inputs.high_density,
        reasons,
    }
}

fn known(count: &FeatureCount) -> Option<u64> {
    match count {
        FeatureCount::Known(c) => Some(*c),
        _ => None,
    }
}

/// Runs the pre-flight check against a live service.
pub struct SafetyEvaluator<'a, C> {
    client: &'a RestClient<C>,
    policy: &'a SafetyPolicy,
}

impl<'a, C: AsyncHttpClient> SafetyEvaluator<'a, C> {
    pub fn new(client: &'a RestClient<C>, policy: &'a SafetyPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &SafetyPolicy {
        self.policy
    }

    /// Evaluates a download of `layer` through `filter`.
    ///
    /// `category` is the semantic layer key (e.g. `parcels`) when known; the
    /// layer name is used to infer density otherwise. Without a filter no
    /// count query is issued and the decision is always [`Verdict::Block`].
    pub async fn evaluate(
        &self,
        layer: &Layer,
        category: Option<&str>,
        filter: Option<&SpatialFilter>,
    ) -> SafetyDecision {
        let high_density = category.is_some_and(|c| self.policy.is_high_density(c))
            || self.policy.is_high_density(&layer.name);

        let count = match filter {
            None => FeatureCount::NotQueried,
            Some(filter) => match self
                .client
                .query_count(layer, Some(filter), Some(self.policy.count_timeout()))
                .await
            {
                Ok(count) => FeatureCount::Known(count),
                Err(e) => {
                    warn!(layer = %layer.name, error = %e, "Count query failed");
                    FeatureCount::Unavailable(e.to_string())
                }
            },
        };

        let inputs = SafetyInputs {
            filter_bounds: filter.map(|f| f.wgs84_bounds()),
            count,
            high_density,
        };
        let decision = assess(self.policy, &inputs);
        match decision.verdict {
            Verdict::Allow => debug!(layer = %layer.name, summary = %decision.summary(), "Safety check passed"),
            _ => info!(
                layer = %layer.name,
                verdict = %decision.verdict,
                reasons = decision.reasons.len(),
                summary = %decision.summary(),
                "Safety check"
            ),
        }
        decision
    }
}
