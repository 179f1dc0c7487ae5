//! Confidence-scored region detection.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::registry::{Region, Registry};
use crate::coord::{BoundingBox, CoordinateTransform, Crs};

/// Minimum share of the context extent a region must cover to match.
pub const DEFAULT_MIN_OVERLAP: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectionMethod {
    /// View center inside a region's box
    PointContainment,
    /// Share of the visible extent covered by a region's box
    ExtentOverlap,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::PointContainment => write!(f, "point containment"),
            DetectionMethod::ExtentOverlap => write!(f, "extent overlap"),
        }
    }
}

/// The user's current spatial context. Point and extent share one CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionContext {
    pub crs: Crs,
    /// Representative point, e.g. the view center
    pub point: Option<(f64, f64)>,
    /// Combined bounds of what is visible
    pub extent: Option<BoundingBox>,
}

impl DetectionContext {
    pub fn at_point(crs: Crs, x: f64, y: f64) -> Self {
        Self {
            crs,
            point: Some((x, y)),
            extent: None,
        }
    }

    pub fn with_extent(mut self, extent: BoundingBox) -> Self {
        self.extent = Some(extent);
        self
    }
}

/// A region considered during detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub region: String,
    pub name: String,
    /// Region box area for containment, covered share for overlap
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub region: String,
    pub region_name: String,
    pub confidence: Confidence,
    pub method: DetectionMethod,
    /// Other matching regions, best first
    pub alternates: Vec<Candidate>,
}

/// Matches a spatial context against the registry's region boxes.
///
/// Deterministic: ties are broken by box area, then by region key.
pub struct RegionDetector<'a, T: CoordinateTransform> {
    registry: &'a Registry,
    transform: &'a T,
    min_overlap: f64,
}

impl<'a, T: CoordinateTransform> RegionDetector<'a, T> {
    pub fn new(registry: &'a Registry, transform: &'a T) -> Self {
        Self {
            registry,
            transform,
            min_overlap: DEFAULT_MIN_OVERLAP,
        }
    }

    pub fn with_min_overlap(mut self, min_overlap: f64) -> Self {
        self.min_overlap = min_overlap.clamp(0.0, 1.0);
        self
    }

    /// Detects the region; `None` leaves resolution to the user.
    pub fn detect(&self, context: &DetectionContext) -> Option<DetectionResult> {
        if let Some(result) = self.by_point(context) {
            return Some(result);
        }
        self.by_extent(context)
    }

    fn by_point(&self, context: &DetectionContext) -> Option<DetectionResult> {
        let (x, y) = context.point?;
        let (lon, lat) = match self
            .transform
            .transform_point(context.crs, Crs::WGS84, x, y)
        {
            Ok(p) => p,
            Err(e) => {
                debug!(crs = %context.crs, error = %e, "Context point not transformable");
                return None;
            }
        };

        let mut hits: Vec<&Region> = self
            .registry
            .regions()
            .filter(|r| r.bbox.contains_point(lon, lat))
            .collect();
        hits.sort_by(|a, b| by_area(a, b));
        let (best, rest) = hits.split_first()?;

        let confidence = if rest.is_empty() && best.is_native(context.crs) {
            Confidence::High
        } else {
            Confidence::Medium
        };
        debug!(
            region = %best.id,
            candidates = hits.len(),
            confidence = %confidence,
            "Region detected by point"
        );
        Some(DetectionResult {
            region: best.id.clone(),
            region_name: best.name.clone(),
            confidence,
            method: DetectionMethod::PointContainment,
            alternates: rest
                .iter()
                .map(|r| candidate(r, r.bbox.area()))
                .collect(),
        })
    }

    fn by_extent(&self, context: &DetectionContext) -> Option<DetectionResult> {
        let extent = context.extent?;
        let extent = match self.transform.transform_bbox(context.crs, Crs::WGS84, &extent) {
            Ok(e) if !e.is_degenerate() => e,
            Ok(_) => return None,
            Err(e) => {
                debug!(crs = %context.crs, error = %e, "Context extent not transformable");
                return None;
            }
        };

        let mut overlaps: Vec<(&Region, f64)> = self
            .registry
            .regions()
            .filter_map(|r| {
                let shared = r.bbox.intersection(&extent)?.area() / extent.area();
                (shared >= self.min_overlap && shared > 0.0).then_some((r, shared))
            })
            .collect();
        overlaps.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| by_area(a, b))
        });
        let ((best, _), rest) = overlaps.split_first()?;

        let family = self.registry.crs_family(&best.jurisdiction);
        let confidence = if best.is_native(context.crs) || family.contains(&context.crs) {
            Confidence::Medium
        } else {
            Confidence::Low
        };
        debug!(region = %best.id, confidence = %confidence, "Region detected by extent");
        Some(DetectionResult {
            region: best.id.clone(),
            region_name: best.name.clone(),
            confidence,
            method: DetectionMethod::ExtentOverlap,
            alternates: rest.iter().map(|(r, s)| candidate(r, *s)).collect(),
        })
    }
}

fn by_area(a: &Region, b: &Region) -> Ordering {
    a.bbox
        .area()
        .partial_cmp(&b.bbox.area())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

fn candidate(region: &Region, score: f64) -> Candidate {
    Candidate {
        region: region.id.clone(),
        name: region.name.clone(),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{lon_lat_to_mercator, BuiltinTransform};

    const REGISTRY: &str = r#"{
        "regions": {
            "berkeley_county": {
                "name": "Berkeley County", "jurisdiction": "SC",
                "bbox_wgs84": [-80.45, 32.85, -79.55, 33.45], "native_crs": [2273, 4326]
            },
            "charleston_county": {
                "name": "Charleston County", "jurisdiction": "SC",
                "bbox_wgs84": [-80.5, 32.5, -79.3, 33.2], "native_crs": [2273]
            },
            "south_carolina": {
                "name": "South Carolina", "jurisdiction": "SC",
                "bbox_wgs84": [-83.4, 32.0, -78.5, 35.25], "native_crs": [2273]
            },
            "wake_county": {
                "name": "Wake County", "jurisdiction": "NC",
                "bbox_wgs84": [-78.99, 35.52, -78.25, 36.08], "native_crs": [2264]
            }
        },
        "crs_families": {"SC": [2273, 3857], "NC": [2264]}
    }"#;

    fn registry() -> Registry {
        Registry::from_json(REGISTRY).unwrap()
    }

    #[test]
    fn test_unique_point_outside_native_crs_is_medium() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        let result = detector
            .detect(&DetectionContext::at_point(Crs::WGS84, -78.6, 35.8))
            .unwrap();
        // Wake is not native to 4326
        assert_eq!(result.region, "wake_county");
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn test_point_in_overlap_picks_smallest() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        // Inside Berkeley, Charleston and the state box
        let result = detector
            .detect(&DetectionContext::at_point(Crs::WGS84, -80.0, 33.0))
            .unwrap();
        assert_eq!(result.region, "berkeley_county");
        assert_eq!(result.method, DetectionMethod::PointContainment);
        assert_eq!(result.confidence, Confidence::Medium);
        let alternates: Vec<&str> = result.alternates.iter().map(|c| c.region.as_str()).collect();
        assert_eq!(alternates, vec!["charleston_county", "south_carolina"]);
    }

    #[test]
    fn test_single_containment_with_native_crs_is_high() {
        let json = r#"{"regions": {"berkeley_county": {"name": "Berkeley County",
            "bbox_wgs84": [-80.45, 32.85, -79.55, 33.45], "native_crs": [4326]}}}"#;
        let registry = Registry::from_json(json).unwrap();
        let result = RegionDetector::new(&registry, &BuiltinTransform)
            .detect(&DetectionContext::at_point(Crs::WGS84, -80.0, 33.0))
            .unwrap();
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.alternates.is_empty());
    }

    #[test]
    fn test_point_is_transformed() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        let (x, y) = lon_lat_to_mercator(-78.6, 35.8).unwrap();
        let result = detector
            .detect(&DetectionContext::at_point(Crs::WEB_MERCATOR, x, y))
            .unwrap();
        assert_eq!(result.region, "wake_county");
    }

    #[test]
    fn test_detection_is_deterministic() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        let context = DetectionContext::at_point(Crs::WGS84, -80.0, 33.0);
        let first = detector.detect(&context);
        for _ in 0..10 {
            assert_eq!(detector.detect(&context), first);
        }
    }

    #[test]
    fn test_extent_fallback_when_point_outside() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        // Point in the ocean, extent mostly over Wake County
        let context = DetectionContext::at_point(Crs::WGS84, -70.0, 30.0)
            .with_extent(BoundingBox::new(-79.0, 35.5, -78.0, 36.0));
        let result = detector.detect(&context).unwrap();
        assert_eq!(result.region, "wake_county");
        assert_eq!(result.method, DetectionMethod::ExtentOverlap);
        // 4326 is not in the NC family
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn test_extent_with_family_crs_is_medium() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        let sw = lon_lat_to_mercator(-80.4, 32.9).unwrap();
        let ne = lon_lat_to_mercator(-79.6, 33.4).unwrap();
        let context = DetectionContext {
            crs: Crs::WEB_MERCATOR,
            point: None,
            extent: Some(BoundingBox::new(sw.0, sw.1, ne.0, ne.1)),
        };
        let result = detector.detect(&context).unwrap();
        // Berkeley and the state box both cover it fully; Berkeley is smaller
        assert_eq!(result.region, "berkeley_county");
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn test_overlap_below_threshold_is_no_match() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        // Only a sliver touches the Wake box
        let context = DetectionContext {
            crs: Crs::WGS84,
            point: None,
            extent: Some(BoundingBox::new(-78.3, 36.0, -77.0, 37.0)),
        };
        assert!(detector.detect(&context).is_none());
        assert!(detector
            .with_min_overlap(0.0)
            .detect(&context)
            .is_some());
    }

    #[test]
    fn test_no_context_is_no_match() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        let context = DetectionContext {
            crs: Crs::WGS84,
            point: None,
            extent: None,
        };
        assert!(detector.detect(&context).is_none());
    }

    #[test]
    fn test_unsupported_crs_falls_through() {
        let registry = registry();
        let detector = RegionDetector::new(&registry, &BuiltinTransform);
        // State Plane has no builtin transform
        let context = DetectionContext::at_point(Crs::new(2273), 2_300_000.0, 380_000.0);
        assert!(detector.detect(&context).is_none());
    }
}
