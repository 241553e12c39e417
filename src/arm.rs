//! Arm drift features from hand landmarks in a start and an end pose.
//!
//! Hand indices follow the 21-point hand skeleton (4 = thumb tip,
//! 20 = pinky tip). Sides are computed independently and a side missing from
//! either image contributes zeros instead of failing the extraction.

use crate::detector::HandPair;
use crate::features::FeatureVector;
use crate::types::{KeypointSet, Point, Side};

pub const THUMB_TIP: usize = 4;
pub const PINKY_TIP: usize = 20;

/// Thumb, index, middle, ring and pinky tips.
pub const FINGERTIPS: [usize; 5] = [4, 8, 12, 16, 20];

pub const NUM_FEATURES: usize = 16;

const SIDES: [Side; 2] = [Side::Left, Side::Right];

/// Slope `dy/dx` of `from -> to`. A vertical line is signed infinity by the
/// sign of `dy`, with `dy == 0` counted as positive.
pub fn slope(from: Point, to: Point) -> f64 {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx == 0.0 {
        return if dy >= 0.0 {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
    }
    dy / dx
}

/// `|end - start|`, with two equal infinite slopes counting as no change.
pub fn slope_change(start: f64, end: f64) -> f64 {
    if start == end {
        0.0
    } else {
        (end - start).abs()
    }
}

fn hand_slope(hand: &KeypointSet) -> f64 {
    match (hand.get(THUMB_TIP), hand.get(PINKY_TIP)) {
        (Some(thumb), Some(pinky)) => slope(thumb, pinky),
        _ => 0.0,
    }
}

/// Start slope, end slope and their change. A side absent from either pose
/// gets zeros for all three.
fn slope_features(start: Option<&KeypointSet>, end: Option<&KeypointSet>) -> [f64; 3] {
    match (start, end) {
        (Some(s), Some(e)) => {
            let (s, e) = (hand_slope(s), hand_slope(e));
            [s, e, slope_change(s, e)]
        }
        _ => [0.0; 3],
    }
}

fn tip_displacements(start: Option<&KeypointSet>, end: Option<&KeypointSet>) -> [f64; 5] {
    let mut out = [0.0; 5];
    if let (Some(s), Some(e)) = (start, end) {
        for (slot, idx) in out.iter_mut().zip(FINGERTIPS) {
            if let (Some(ps), Some(pe)) = (s.get(idx), e.get(idx)) {
                // Image y grows downward, so a dropping finger is positive.
                *slot = pe.y - ps.y;
            }
        }
    }
    out
}

/// Feature names in declared order.
pub fn feature_names() -> Vec<String> {
    let mut names = Vec::with_capacity(NUM_FEATURES);
    for side in SIDES {
        let p = side.prefix();
        names.push(format!("{p}_start_slope"));
        names.push(format!("{p}_end_slope"));
        names.push(format!("{p}_slope_diff"));
    }
    for side in SIDES {
        for i in 0..FINGERTIPS.len() {
            names.push(format!("{}_y{i}", side.prefix()));
        }
    }
    names
}

/// Compute all 16 arm features from the two poses.
pub fn build(start: &HandPair, end: &HandPair) -> FeatureVector {
    let mut features = FeatureVector::with_capacity(NUM_FEATURES);

    for side in SIDES {
        let [s, e, diff] = slope_features(start.side(side), end.side(side));
        let p = side.prefix();
        features.insert(format!("{p}_start_slope"), s);
        features.insert(format!("{p}_end_slope"), e);
        features.insert(format!("{p}_slope_diff"), diff);
    }

    for side in SIDES {
        let deltas = tip_displacements(start.side(side), end.side(side));
        for (i, delta) in deltas.into_iter().enumerate() {
            features.insert(format!("{}_y{i}", side.prefix()), delta);
        }
    }

    features
}
