//! Facial asymmetry features from face-mesh landmarks.
//!
//! Indices follow the 468-point face mesh topology. The output is 59 features:
//! three per symmetric landmark pair (x/y asymmetry index and pair angle)
//! followed by eleven mouth/eye shape measurements.

use crate::error::Result;
use crate::features::{ratio, round_to, FeatureVector};
use crate::types::{KeypointSet, Point};

/// Symmetric (left, right) landmark pairs, in feature order.
pub const LANDMARK_PAIRS: [(usize, usize); 16] = [
    (61, 291),
    (48, 278),
    (123, 352),
    (132, 361),
    (55, 285),
    (33, 263),
    (133, 362),
    (65, 295),
    (81, 311),
    (91, 321),
    (145, 374),
    (159, 385),
    (57, 287),
    (50, 280),
    (234, 454),
    (93, 323),
];

/// Nose tip; reference point for per-pair distances.
pub const NOSE_TIP: usize = 1;
pub const CHIN: usize = 152;
pub const LIP_LEFT: usize = 61;
pub const LIP_RIGHT: usize = 291;
pub const EYE_LEFT: usize = 33;
pub const EYE_RIGHT: usize = 263;
pub const LIP_UPPER: usize = 13;
pub const LIP_LOWER: usize = 14;

const SCALAR_FEATURES: [&str; 11] = [
    "lip_slope",
    "lip_down_angle_left",
    "lip_down_angle_right",
    "ratio_mouth_face",
    "ratio_lip_nose_eye_nose",
    "ratio_eye_lip_face_height",
    "angle_diff_lip_eye",
    "ratio_lip_corner_height",
    "angle_diff_eye_lip",
    "ratio_lip_center_symmetry",
    "ratio_mouth_opening",
];

pub const NUM_FEATURES: usize = LANDMARK_PAIRS.len() * 3 + SCALAR_FEATURES.len();

/// Asymmetry index `|dR - dL| / (dR + dL)`, defined as 0 when both are 0.
pub fn asymmetry_index(d_right: f64, d_left: f64) -> f64 {
    let denom = d_right + d_left;
    if denom == 0.0 {
        0.0
    } else {
        (d_right - d_left).abs() / denom
    }
}

/// Angle of the vector `from -> to` in degrees, rounded to 2 decimals.
/// A vertical vector (zero horizontal delta) is exactly 90.
pub fn angle_deg(from: Point, to: Point) -> f64 {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx == 0.0 {
        return 90.0;
    }
    round_to(dy.atan2(dx).to_degrees(), 2)
}

/// Feature names in declared order.
pub fn feature_names() -> Vec<String> {
    let mut names = Vec::with_capacity(NUM_FEATURES);
    for (l, r) in LANDMARK_PAIRS {
        names.push(format!("AI_x_{l}_{r}"));
        names.push(format!("AI_y_{l}_{r}"));
        names.push(format!("angle_{l}_{r}"));
    }
    names.extend(SCALAR_FEATURES.iter().map(|s| s.to_string()));
    names
}

/// Compute all 59 face features.
///
/// Fails with `MissingLandmark` if the keypoint set does not cover an index
/// the features need (e.g. a 68-point model fed to the mesh features).
pub fn build(keypoints: &KeypointSet) -> Result<FeatureVector> {
    let mut features = FeatureVector::with_capacity(NUM_FEATURES);
    let center = keypoints.require(NOSE_TIP)?;

    for (l_idx, r_idx) in LANDMARK_PAIRS {
        let left = keypoints.require(l_idx)?;
        let right = keypoints.require(r_idx)?;

        let (dr_x, dl_x) = ((right.x - center.x).abs(), (left.x - center.x).abs());
        let (dr_y, dl_y) = ((right.y - center.y).abs(), (left.y - center.y).abs());

        features.insert(
            format!("AI_x_{l_idx}_{r_idx}"),
            round_to(asymmetry_index(dr_x, dl_x), 3),
        );
        features.insert(
            format!("AI_y_{l_idx}_{r_idx}"),
            round_to(asymmetry_index(dr_y, dl_y), 3),
        );
        features.insert(format!("angle_{l_idx}_{r_idx}"), angle_deg(left, right));
    }

    let lip_l = keypoints.require(LIP_LEFT)?;
    let lip_r = keypoints.require(LIP_RIGHT)?;
    let eye_l = keypoints.require(EYE_LEFT)?;
    let eye_r = keypoints.require(EYE_RIGHT)?;
    let nose = center;
    let chin = keypoints.require(CHIN)?;
    let lip_u = keypoints.require(LIP_UPPER)?;
    let lip_d = keypoints.require(LIP_LOWER)?;

    let eye_center = eye_l.midpoint(&eye_r);
    let lip_center = lip_l.midpoint(&lip_r);

    let mouth_width = lip_l.distance(&lip_r);
    let face_width = eye_l.distance(&eye_r);
    let eye_nose = eye_center.distance(&nose);
    let lip_nose = lip_center.distance(&nose);
    let eye_lip = eye_center.distance(&lip_center);
    let face_height = nose.distance(&chin);

    let lip_slope = angle_deg(lip_l, lip_r);
    let eye_slope = angle_deg(eye_l, eye_r);
    let dist_l = lip_center.distance(&lip_l);
    let dist_r = lip_center.distance(&lip_r);

    let scalars = [
        lip_slope,
        angle_deg(lip_l, chin),
        angle_deg(lip_r, chin),
        ratio(mouth_width, face_width),
        ratio(lip_nose, eye_nose),
        ratio(eye_lip, face_height),
        (lip_slope - eye_slope).abs(),
        ratio((lip_l.y - lip_r.y).abs(), face_height),
        (angle_deg(eye_l, lip_l) - angle_deg(eye_r, lip_r)).abs(),
        ratio((dist_l - dist_r).abs(), mouth_width),
        ratio((lip_u.y - lip_d.y).abs(), face_height),
    ];
    for (name, value) in SCALAR_FEATURES.iter().zip(scalars) {
        features.insert(*name, value);
    }

    Ok(features)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;

    pub(crate) const MESH_POINTS: usize = 468;

    /// A face mirrored about x = 200 with the nose tip at (200, 200).
    pub(crate) fn symmetric_face() -> KeypointSet {
        let mut face = KeypointSet::zeros(MESH_POINTS);
        face.points[NOSE_TIP] = Point::new(200.0, 200.0);
        for (i, (l, r)) in LANDMARK_PAIRS.iter().enumerate() {
            let spread = 20.0 + i as f64 * 5.0;
            let height = 150.0 + i as f64 * 7.0;
            face.points[*l] = Point::new(200.0 - spread, height);
            face.points[*r] = Point::new(200.0 + spread, height);
        }
        face.points[CHIN] = Point::new(200.0, 320.0);
        face.points[LIP_UPPER] = Point::new(200.0, 250.0);
        face.points[LIP_LOWER] = Point::new(200.0, 262.0);
        face
    }

    #[test]
    fn asymmetry_index_properties() {
        assert_eq!(asymmetry_index(0.0, 0.0), 0.0);
        assert_eq!(asymmetry_index(3.0, 3.0), 0.0);
        assert_eq!(asymmetry_index(3.0, 1.0), 0.5);
        for (a, b) in [(0.0, 2.0), (1.5, 7.25), (10.0, 0.1)] {
            assert_eq!(asymmetry_index(a, b), asymmetry_index(b, a));
            assert!((0.0..=1.0).contains(&asymmetry_index(a, b)));
        }
    }

    #[test]
    fn angle_conventions() {
        assert_eq!(angle_deg(Point::new(0.0, 0.0), Point::new(0.0, -5.0)), 90.0);
        assert_eq!(angle_deg(Point::new(0.0, 0.0), Point::new(0.0, 0.0)), 90.0);
        assert_eq!(angle_deg(Point::new(0.0, 0.0), Point::new(1.0, 1.0)), 45.0);
        assert_eq!(angle_deg(Point::new(0.0, 0.0), Point::new(-1.0, 0.0)), 180.0);
        assert_eq!(angle_deg(Point::new(0.0, 0.0), Point::new(3.0, 1.0)), 18.43);
    }

    #[test]
    fn names_match_build_order() {
        let features = build(&symmetric_face()).unwrap();
        let names = feature_names();
        assert_eq!(names.len(), 59);
        assert_eq!(features.len(), 59);
        assert!(features.names().eq(names.iter().map(String::as_str)));
        assert_eq!(names[0], "AI_x_61_291");
        assert_eq!(names[47], "angle_93_323");
        assert_eq!(names[58], "ratio_mouth_opening");
    }

    #[test]
    fn symmetric_face_has_zero_asymmetry() {
        let features = build(&symmetric_face()).unwrap();
        for (l, r) in LANDMARK_PAIRS {
            assert_eq!(features.get(&format!("AI_x_{l}_{r}")), Some(0.0));
            assert_eq!(features.get(&format!("AI_y_{l}_{r}")), Some(0.0));
            assert_eq!(features.get(&format!("angle_{l}_{r}")), Some(0.0));
        }
        assert_eq!(features.get("lip_slope"), Some(0.0));
        assert_eq!(features.get("ratio_lip_corner_height"), Some(0.0));
        assert_eq!(features.get("ratio_lip_center_symmetry"), Some(0.0));
    }

    #[test]
    fn collapsed_points_give_zero_features() {
        let face = KeypointSet::new(vec![Point::new(10.0, 10.0); MESH_POINTS]);
        let features = build(&face).unwrap();
        for (name, value) in features.iter() {
            if name.starts_with("AI_") || name.starts_with("ratio_") {
                assert_eq!(value, 0.0, "{name}");
            }
        }
        // Every vector is degenerate, so every angle takes the vertical convention.
        assert_eq!(features.get("lip_slope"), Some(90.0));
    }

    #[test]
    fn drooping_mouth_corner_shows_up() {
        let mut face = symmetric_face();
        face.points[LIP_RIGHT].y += 30.0;
        let features = build(&face).unwrap();

        assert!(features.get("AI_y_61_291").unwrap() > 0.0);
        assert!(features.get("lip_slope").unwrap() > 0.0);
        assert!(features.get("ratio_lip_corner_height").unwrap() > 0.0);
    }

    #[test]
    fn small_models_report_missing_landmarks() {
        let err = build(&KeypointSet::zeros(68)).unwrap_err();
        assert!(matches!(err, Error::MissingLandmark(_)));
    }
}
