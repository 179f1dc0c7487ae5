//! Safety verdicts and their human-readable forms.

use std::fmt;

use serde::Serialize;

use crate::coord::BoundingBox;

/// Miles per degree of latitude.
pub const MILES_PER_DEGREE: f64 = 69.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Outcome of one safety rule, or of all of them.
///
/// Ordered by restrictiveness, so the combined verdict is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Verdict {
    Allow,
    Warn,
    Block,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => write!(f, "ALLOW"),
            Verdict::Warn => write!(f, "WARN"),
            Verdict::Block => write!(f, "BLOCK"),
        }
    }
}

/// Result of a pre-flight check. Computed per request, never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyDecision {
    pub verdict: Verdict,
    /// Server count, `None` when unavailable or not queried
    pub feature_count: Option<u64>,
    /// Area of the WGS84 filter bounds in square degrees
    pub extent_sq_deg: Option<f64>,
    pub bounds: Option<BoundingBox>,
    pub estimated_bytes: Option<u64>,
    /// Whether the dense thresholds were applied
    pub high_density: bool,
    /// Every rule that fired, in evaluation order
    pub reasons: Vec<String>,
}

impl SafetyDecision {
    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    pub fn requires_confirmation(&self) -> bool {
        self.verdict == Verdict::Warn
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }

    pub fn estimated_mb(&self) -> Option<f64> {
        self.estimated_bytes.map(|b| b as f64 / BYTES_PER_MB)
    }

    /// Approximate area of the filter bounds in square miles.
    pub fn extent_sq_miles(&self) -> Option<f64> {
        self.bounds.map(|b| square_miles(&b))
    }

    /// Single line for logs, e.g.
    /// `WARN: 12,000 features | ~22.9 MB est. | extent 0.3000 sq deg`.
    pub fn summary(&self) -> String {
        let count = self
            .feature_count
            .map(group_thousands)
            .unwrap_or_else(|| "unknown".to_string());
        let mut parts = vec![format!("{}: {} features", self.verdict, count)];
        if let Some(mb) = self.estimated_mb().filter(|mb| *mb > 0.0) {
            parts.push(format!("~{:.1} MB est.", mb));
        }
        if let Some(area) = self.extent_sq_deg.filter(|a| *a > 0.0) {
            parts.push(format!("extent {:.4} sq deg", area));
        }
        parts.join(" | ")
    }

    /// Multi-line text shown before asking the user to confirm.
    pub fn confirmation_message(&self) -> String {
        let mut lines = Vec::new();
        if let Some(count) = self.feature_count.filter(|c| *c > 0) {
            lines.push(format!("Features to download: {}", group_thousands(count)));
        }
        if let Some(mb) = self.estimated_mb().filter(|mb| *mb > 1.0) {
            lines.push(format!("Estimated file size: ~{:.0} MB", mb));
        }
        if let Some(miles) = self.extent_sq_miles().filter(|m| *m > 10.0) {
            lines.push(format!(
                "Query area: ~{} square miles",
                group_thousands(miles.round() as u64)
            ));
        }
        lines.push(String::new());
        for reason in &self.reasons {
            lines.push(format!("  {}", reason));
        }
        match self.verdict {
            Verdict::Warn => {
                lines.push(String::new());
                lines.push("Do you want to proceed with this download?".to_string());
            }
            Verdict::Block => {
                lines.push(String::new());
                lines.push("Zoom in or use a clip geometry to narrow the request.".to_string());
            }
            Verdict::Allow => {}
        }
        lines.join("\n")
    }
}

/// Area of a WGS84 box in square miles, scaling longitude at its mid latitude.
pub fn square_miles(bounds: &BoundingBox) -> f64 {
    let mid_lat = (bounds.min_y + bounds.max_y) / 2.0;
    let width = bounds.width() * MILES_PER_DEGREE * mid_lat.to_radians().cos();
    let height = bounds.height() * MILES_PER_DEGREE;
    (width * height).abs()
}

/// `12000` → `12,000`
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
