//! Tests for coordinate frames and transformation

use super::*;

#[test]
fn test_crs_normalizes_web_mercator_aliases() {
    assert_eq!(Crs::new(102100), Crs::WEB_MERCATOR);
    assert_eq!(Crs::new(900913), Crs::WEB_MERCATOR);
    assert_eq!(Crs::new(2273).wkid(), 2273);
}

#[test]
fn test_crs_parse_forms() {
    assert_eq!(Crs::parse("EPSG:2273").unwrap().wkid(), 2273);
    assert_eq!(Crs::parse("esri:102100").unwrap(), Crs::WEB_MERCATOR);
    assert_eq!(Crs::parse("4326").unwrap(), Crs::WGS84);
    assert!(matches!(
        Crs::parse("EPSG:abc"),
        Err(CoordError::InvalidCrs(_))
    ));
}

#[test]
fn test_crs_display() {
    assert_eq!(format!("{}", Crs::new(3361)), "EPSG:3361");
}

#[test]
fn test_bbox_new_normalizes_corners() {
    let b = BoundingBox::new(10.0, 5.0, 0.0, -5.0);
    assert_eq!(b.min_x, 0.0);
    assert_eq!(b.min_y, -5.0);
    assert_eq!(b.max_x, 10.0);
    assert_eq!(b.max_y, 5.0);
    assert_eq!(b.area(), 100.0);
}

#[test]
fn test_bbox_parse() {
    let b = BoundingBox::parse("-80.1, 32.9, -79.8, 33.2").unwrap();
    assert!((b.width() - 0.3).abs() < 1e-9);
    assert!(BoundingBox::parse("1,2,3").is_err());
    assert!(BoundingBox::parse("a,b,c,d").is_err());
}

#[test]
fn test_bbox_degenerate() {
    assert!(BoundingBox::new(1.0, 1.0, 1.0, 1.0).is_degenerate());
    assert!(BoundingBox::new(0.0, 0.0, 5.0, 0.0).is_degenerate());
    assert!(BoundingBox::new(0.0, 0.0, f64::NAN, 1.0).is_degenerate());
    assert!(!BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_degenerate());
}

#[test]
fn test_bbox_intersection_and_union() {
    let a = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
    let b = BoundingBox::new(2.0, 2.0, 6.0, 6.0);
    let i = a.intersection(&b).unwrap();
    assert_eq!(i, BoundingBox::new(2.0, 2.0, 4.0, 4.0));
    assert_eq!(a.union(&b), BoundingBox::new(0.0, 0.0, 6.0, 6.0));

    let far = BoundingBox::new(10.0, 10.0, 11.0, 11.0);
    assert!(a.intersection(&far).is_none());
}

#[test]
fn test_bbox_contains_point_is_boundary_inclusive() {
    let b = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
    assert!(b.contains_point(0.0, 0.5));
    assert!(b.contains_point(1.0, 1.0));
    assert!(!b.contains_point(1.0001, 0.5));
}

#[test]
fn test_bbox_serde_as_array() {
    let b: BoundingBox = serde_json::from_str("[-80.0, 32.0, -79.0, 33.0]").unwrap();
    assert_eq!(b.min_x, -80.0);
    assert_eq!(serde_json::to_string(&b).unwrap(), "[-80.0,32.0,-79.0,33.0]");
}

#[test]
fn test_mercator_origin() {
    let (x, y) = lon_lat_to_mercator(0.0, 0.0).unwrap();
    assert!(x.abs() < 1e-6);
    assert!(y.abs() < 1e-6);
}

#[test]
fn test_mercator_known_value() {
    // Charleston, SC
    let (x, y) = lon_lat_to_mercator(-79.9311, 32.7765).unwrap();
    assert!((x - (-8_897_883.0)).abs() < 50.0, "x = {}", x);
    assert!(y > 3_860_000.0 && y < 3_870_000.0, "y = {}", y);
}

#[test]
fn test_mercator_roundtrip() {
    for (lon, lat) in [(-79.93, 32.77), (151.2, -33.87), (0.0, 60.0)] {
        let (x, y) = lon_lat_to_mercator(lon, lat).unwrap();
        let (lon2, lat2) = mercator_to_lon_lat(x, y);
        assert!((lon - lon2).abs() < 1e-9);
        assert!((lat - lat2).abs() < 1e-9);
    }
}

#[test]
fn test_mercator_rejects_polar_latitude() {
    assert!(matches!(
        lon_lat_to_mercator(0.0, 89.0),
        Err(CoordError::InvalidLatitude(_))
    ));
}

#[test]
fn test_builtin_identity_for_same_frame() {
    let t = BuiltinTransform;
    let p = t
        .transform_point(Crs::new(2273), Crs::new(2273), 1.0, 2.0)
        .unwrap();
    assert_eq!(p, (1.0, 2.0));
}

#[test]
fn test_builtin_rejects_unknown_frame() {
    let t = BuiltinTransform;
    let err = t
        .transform_point(Crs::new(2273), Crs::WGS84, 1.0, 2.0)
        .unwrap_err();
    assert!(matches!(err, CoordError::UnsupportedTransform { .. }));
}

#[test]
fn test_transform_bbox_covers_corners() {
    let t = BuiltinTransform;
    let bbox = BoundingBox::new(-80.0, 32.0, -79.0, 33.0);
    let merc = t
        .transform_bbox(Crs::WGS84, Crs::WEB_MERCATOR, &bbox)
        .unwrap();
    let back = t
        .transform_bbox(Crs::WEB_MERCATOR, Crs::WGS84, &merc)
        .unwrap();
    assert!((back.min_x - bbox.min_x).abs() < 1e-9);
    assert!((back.max_y - bbox.max_y).abs() < 1e-9);
}
