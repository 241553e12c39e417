//! Korean explanation text for screening outcomes.

use crate::detector::HandPair;
use crate::error::Result;
use crate::features::FeatureVector;
use crate::types::{Modality, Side};

/// Face-mesh landmark pair (smaller index first) to the region it outlines.
pub const PAIR_REGION_MAP: [((usize, usize), &str); 16] = [
    ((33, 263), "눈꼬리(가쪽, 우–좌)"),
    ((133, 362), "눈머리(안쪽, 우–좌)"),
    ((145, 374), "윗눈꺼풀(우–좌)"),
    ((159, 385), "아랫눈꺼풀(우–좌)"),
    ((61, 291), "입꼬리(우–좌)"),
    ((48, 278), "입술 외곽(우–좌)"),
    ((55, 285), "입술 윤곽(우–좌)"),
    ((65, 295), "윗입술 경계(우–좌)"),
    ((50, 280), "아랫입술 경계(우–좌)"),
    ((57, 287), "아랫입술 중앙 근처(우–좌)"),
    ((93, 323), "콧방울(우–좌)"),
    ((81, 311), "코–입 사이(우–좌)"),
    ((91, 321), "인중/상순(우–좌)"),
    ((123, 352), "눈 안쪽 주변(우–좌)"),
    ((132, 361), "눈 안쪽 주변(우–좌)"),
    ((234, 454), "광대/관자 부위(우–좌)"),
];

/// Name used when the caller has no display name for the subject.
pub const DEFAULT_DISPLAY_NAME: &str = "사용자";

const PAIR_FEATURE_PREFIXES: [&str; 3] = ["AI_x_", "AI_y_", "angle_"];

/// Region name for a landmark pair, in either order.
pub fn region_for_pair(a: usize, b: usize) -> String {
    let key = (a.min(b), a.max(b));
    PAIR_REGION_MAP
        .iter()
        .find(|(pair, _)| *pair == key)
        .map(|(_, region)| region.to_string())
        .unwrap_or_else(|| format!("({a}–{b}) 부위"))
}

/// Split a trailing `_<a>_<b>` off a feature name.
fn pair_suffix(name: &str) -> Option<(usize, usize)> {
    let (rest, b) = name.rsplit_once('_')?;
    let (_, a) = rest.rsplit_once('_')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|c| c.is_ascii_digit());
    if !digits(a) || !digits(b) {
        return None;
    }
    Some((a.parse().ok()?, b.parse().ok()?))
}

/// The pair feature with the largest absolute value. Ties keep the first.
pub fn dominant_pair_feature(features: &FeatureVector) -> Option<(&str, f64, (usize, usize))> {
    let mut winner: Option<(&str, f64, (usize, usize))> = None;
    for (name, value) in features.iter() {
        if value.is_nan() || !PAIR_FEATURE_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        let Some(pair) = pair_suffix(name) else {
            continue;
        };
        if winner.map_or(true, |(_, best, _)| value.abs() > best.abs()) {
            winner = Some((name, value, pair));
        }
    }
    winner
}

fn display_name(name: &str) -> &str {
    if name.trim().is_empty() {
        DEFAULT_DISPLAY_NAME
    } else {
        name
    }
}

/// Face palsy explanation.
pub fn face_text(name: &str, abnormal: bool, features: &FeatureVector) -> String {
    let name = display_name(name);
    if !abnormal {
        return format!("{name}님의 안면마비 측정 결과는 정상입니다.");
    }
    match dominant_pair_feature(features) {
        Some((_, _, (a, b))) => format!(
            "{name}님의 안면마비 측정 결과는 비정상입니다. 그 이유는 {} 부분이 비대칭 수치가 높게 측정되었습니다.",
            region_for_pair(a, b)
        ),
        None => format!(
            "{name}님의 안면마비 측정 결과는 비정상입니다. 그 이유는 특정 부위에서 비대칭 수치가 높게 측정되었습니다."
        ),
    }
}

/// Which hands were seen in both arm images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectedSides {
    pub left: bool,
    pub right: bool,
}

impl DetectedSides {
    pub fn from_pairs(start: &HandPair, end: &HandPair) -> Self {
        Self {
            left: start.left.is_some() && end.left.is_some(),
            right: start.right.is_some() && end.right.is_some(),
        }
    }

    pub fn all() -> Self {
        Self {
            left: true,
            right: true,
        }
    }
}

/// Side whose slope changed more between the two poses.
///
/// A side that was never detected is not a candidate. With both or neither
/// side detected the left hand wins ties.
pub fn dominant_side(features: &FeatureVector, detected: DetectedSides) -> Side {
    match (detected.left, detected.right) {
        (true, false) => Side::Left,
        (false, true) => Side::Right,
        _ => {
            let left = features.get("left_slope_diff").unwrap_or(0.0).abs();
            let right = features.get("right_slope_diff").unwrap_or(0.0).abs();
            if left >= right {
                Side::Left
            } else {
                Side::Right
            }
        }
    }
}

/// Arm drift explanation.
pub fn arm_text(probability: f64, abnormal: bool, features: &FeatureVector, detected: DetectedSides) -> String {
    let verdict = if abnormal { "비정상" } else { "정상" };
    let hand = match dominant_side(features, detected) {
        Side::Left => "왼손",
        Side::Right => "오른손",
    };
    format!(
        "{verdict} 가능성 {:.1}%. {hand} 변화가 상대적으로 큽니다.",
        probability * 100.0
    )
}

/// Minimal text used when a [`Composer`] fails.
pub fn fallback_text(modality: Modality, abnormal: bool) -> String {
    let verdict = if abnormal { "비정상" } else { "정상" };
    match modality {
        Modality::Face => format!("안면마비 측정 결과: {verdict}"),
        Modality::Arm => format!("팔 측정 결과: {verdict}"),
        Modality::Speech => format!("발화 측정 결과: {verdict}"),
    }
}

/// Turns a labelled outcome into explanation text.
pub trait Composer: Send + Sync {
    fn face(&self, name: &str, abnormal: bool, features: &FeatureVector) -> Result<String>;

    fn arm(
        &self,
        probability: f64,
        abnormal: bool,
        features: &FeatureVector,
        detected: DetectedSides,
    ) -> Result<String>;
}

/// The stock Korean composer.
#[derive(Debug, Clone, Copy, Default)]
pub struct KoreanComposer;

impl Composer for KoreanComposer {
    fn face(&self, name: &str, abnormal: bool, features: &FeatureVector) -> Result<String> {
        Ok(face_text(name, abnormal, features))
    }

    fn arm(
        &self,
        probability: f64,
        abnormal: bool,
        features: &FeatureVector,
        detected: DetectedSides,
    ) -> Result<String> {
        Ok(arm_text(probability, abnormal, features, detected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> FeatureVector {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn normal_face_text() {
        let text = face_text("홍길동", false, &FeatureVector::new());
        assert_eq!(text, "홍길동님의 안면마비 측정 결과는 정상입니다.");
        assert_eq!(
            face_text("", false, &FeatureVector::new()),
            "사용자님의 안면마비 측정 결과는 정상입니다."
        );
    }

    #[test]
    fn abnormal_face_names_the_dominant_region() {
        let f = features(&[
            ("AI_x_33_263", 0.05),
            ("AI_x_61_291", -0.4),
            ("angle_93_323", 0.3),
            ("lip_slope", 9.0),
        ]);
        assert_eq!(
            face_text("홍길동", true, &f),
            "홍길동님의 안면마비 측정 결과는 비정상입니다. 그 이유는 입꼬리(우–좌) 부분이 비대칭 수치가 높게 측정되었습니다."
        );
    }

    #[test]
    fn abnormal_face_without_pair_features_is_generic() {
        let f = features(&[("lip_slope", 1.0), ("angle_diff_lip_eye", 4.0)]);
        assert_eq!(
            face_text("홍길동", true, &f),
            "홍길동님의 안면마비 측정 결과는 비정상입니다. 그 이유는 특정 부위에서 비대칭 수치가 높게 측정되었습니다."
        );
    }

    #[test]
    fn ties_keep_the_first_feature() {
        let f = features(&[("AI_y_145_374", 0.2), ("AI_x_61_291", -0.2)]);
        let (name, _, pair) = dominant_pair_feature(&f).unwrap();
        assert_eq!(name, "AI_y_145_374");
        assert_eq!(pair, (145, 374));
    }

    #[test]
    fn pair_lookup_is_order_insensitive_with_fallback() {
        assert_eq!(region_for_pair(291, 61), "입꼬리(우–좌)");
        assert_eq!(region_for_pair(7, 3), "(7–3) 부위");
    }

    #[test]
    fn pair_suffix_parsing() {
        assert_eq!(pair_suffix("AI_x_61_291"), Some((61, 291)));
        assert_eq!(pair_suffix("angle_diff_lip_eye"), None);
        assert_eq!(pair_suffix("AI_x_61_"), None);
        assert_eq!(pair_suffix("61"), None);
    }

    #[test]
    fn arm_text_formats_percentage_and_side() {
        let f = features(&[("left_slope_diff", 0.1), ("right_slope_diff", 0.7)]);
        assert_eq!(
            arm_text(0.8234, true, &f, DetectedSides::all()),
            "비정상 가능성 82.3%. 오른손 변화가 상대적으로 큽니다."
        );
        assert_eq!(
            arm_text(0.25, false, &features(&[]), DetectedSides::all()),
            "정상 가능성 25.0%. 왼손 변화가 상대적으로 큽니다."
        );
    }

    #[test]
    fn undetected_side_is_never_named() {
        let f = features(&[("left_slope_diff", 0.0), ("right_slope_diff", 0.0)]);
        let right_only = DetectedSides {
            left: false,
            right: true,
        };
        assert_eq!(dominant_side(&f, right_only), Side::Right);

        let inf = features(&[("left_slope_diff", f64::INFINITY), ("right_slope_diff", 1.0)]);
        assert_eq!(dominant_side(&inf, right_only), Side::Right);
        assert_eq!(dominant_side(&inf, DetectedSides::all()), Side::Left);
    }

    #[test]
    fn sides_count_only_when_seen_in_both_poses() {
        use crate::types::KeypointSet;

        let seen = HandPair {
            left: Some(KeypointSet::new(Vec::new())),
            right: Some(KeypointSet::new(Vec::new())),
        };
        let left_only = HandPair {
            left: Some(KeypointSet::new(Vec::new())),
            right: None,
        };
        assert_eq!(DetectedSides::from_pairs(&seen, &seen), DetectedSides::all());
        assert_eq!(
            DetectedSides::from_pairs(&seen, &left_only),
            DetectedSides {
                left: true,
                right: false,
            }
        );
        assert_eq!(
            DetectedSides::from_pairs(&HandPair::default(), &seen),
            DetectedSides::default()
        );
    }

    #[test]
    fn fallback_text_mentions_verdict() {
        assert!(fallback_text(Modality::Face, true).contains("비정상"));
        assert!(fallback_text(Modality::Arm, false).ends_with("정상"));
    }
}
