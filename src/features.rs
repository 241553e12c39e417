//! Named, ordered feature vectors and the per-modality builders.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::arm;
use crate::detector::HandPair;
use crate::error::{Error, Result};
use crate::face;
use crate::types::{KeypointSet, Modality};

/// Feature name to value, in a fixed order.
///
/// Serializes as a JSON object whose key order matches the vector order.
/// Non-finite values (vertical slopes) are written as the strings `"inf"`,
/// `"-inf"` and `"NaN"` so they survive a round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Set `name` to `value`, keeping its position if already present.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Project onto `manifest`: exactly its names, in its order, with `0.0`
    /// for any name this vector lacks.
    pub fn aligned<S: AsRef<str>>(&self, manifest: &[S]) -> FeatureVector {
        manifest
            .iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), self.get(name).unwrap_or(0.0))
            })
            .collect()
    }

    /// Numeric row in manifest order, as fed to scalers and classifiers.
    pub fn to_row<S: AsRef<str>>(&self, manifest: &[S]) -> Vec<f32> {
        manifest
            .iter()
            .map(|name| self.get(name.as_ref()).unwrap_or(0.0) as f32)
            .collect()
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        let mut vector = FeatureVector::new();
        for (name, value) in iter {
            vector.insert(name, value);
        }
        vector
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Number(f64),
    Special(String),
}

impl WireValue {
    fn encode(value: f64) -> Self {
        if value.is_nan() {
            WireValue::Special("NaN".into())
        } else if value == f64::INFINITY {
            WireValue::Special("inf".into())
        } else if value == f64::NEG_INFINITY {
            WireValue::Special("-inf".into())
        } else {
            WireValue::Number(value)
        }
    }

    fn decode(self) -> std::result::Result<f64, String> {
        match self {
            WireValue::Number(v) => Ok(v),
            WireValue::Special(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(format!("invalid feature value {other:?}")),
            },
        }
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, &WireValue::encode(*value))?;
        }
        map.end()
    }
}

struct FeatureVectorVisitor;

impl<'de> Visitor<'de> for FeatureVectorVisitor {
    type Value = FeatureVector;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of feature names to numbers")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut vector = FeatureVector::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, value)) = access.next_entry::<String, WireValue>()? {
            vector.insert(name, value.decode().map_err(de::Error::custom)?);
        }
        Ok(vector)
    }
}

impl<'de> Deserialize<'de> for FeatureVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(FeatureVectorVisitor)
    }
}

/// Landmark input for one feature-building call.
#[derive(Debug, Clone, Copy)]
pub enum Landmarks<'a> {
    /// One face keypoint set.
    Face(&'a KeypointSet),
    /// Hands in the start and end pose.
    Arm { start: &'a HandPair, end: &'a HandPair },
}

/// Build the modality's feature vector from its landmarks.
pub fn build(modality: Modality, landmarks: Landmarks<'_>) -> Result<FeatureVector> {
    match (modality, landmarks) {
        (Modality::Face, Landmarks::Face(keypoints)) => face::build(keypoints),
        (Modality::Arm, Landmarks::Arm { start, end }) => Ok(arm::build(start, end)),
        (Modality::Speech, _) => Err(Error::UnsupportedModality(Modality::Speech)),
        (modality, _) => Err(Error::InvalidPayload(format!(
            "landmarks do not match the {modality} modality"
        ))),
    }
}

/// Declared feature order for a modality.
pub fn feature_names(modality: Modality) -> Result<Vec<String>> {
    match modality {
        Modality::Face => Ok(face::feature_names()),
        Modality::Arm => Ok(arm::feature_names()),
        Modality::Speech => Err(Error::UnsupportedModality(Modality::Speech)),
    }
}

/// Round half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `numerator / denominator`, or `0.0` when the denominator is zero.
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureVector {
        vec![
            ("b".to_string(), 0.125),
            ("a".to_string(), -3.5),
            ("slope".to_string(), f64::NEG_INFINITY),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn insert_keeps_position() {
        let mut v = sample();
        v.insert("b", 9.0);
        let names: Vec<_> = v.names().collect();
        assert_eq!(names, ["b", "a", "slope"]);
        assert_eq!(v.get("b"), Some(9.0));
    }

    #[test]
    fn aligned_fills_missing_with_zero() {
        let v = sample();
        let aligned = v.aligned(&["a", "missing", "b"]);
        let pairs: Vec<_> = aligned.iter().collect();
        assert_eq!(pairs, [("a", -3.5), ("missing", 0.0), ("b", 0.125)]);
        assert_eq!(v.to_row(&["missing", "a"]), vec![0.0f32, -3.5]);
    }

    #[test]
    fn json_round_trip_is_exact_and_ordered() {
        let mut v = sample();
        v.insert("third", 0.1 + 0.2);
        let text = serde_json::to_string(&v).unwrap();
        assert!(text.starts_with(r#"{"b":0.125,"a":-3.5,"slope":"-inf""#));

        let back: FeatureVector = serde_json::from_str(&text).unwrap();
        assert_eq!(back.names().collect::<Vec<_>>(), v.names().collect::<Vec<_>>());
        for ((_, x), (_, y)) in back.iter().zip(v.iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn rejects_unknown_special_values() {
        let err = serde_json::from_str::<FeatureVector>(r#"{"a": "big"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn rounding_and_ratios() {
        assert_eq!(round_to(0.12345, 3), 0.123);
        assert_eq!(round_to(-12.3456, 2), -12.35);
        assert_eq!(ratio(1.0, 0.0), 0.0);
        assert_eq!(ratio(1.0, 4.0), 0.25);
    }

    #[test]
    fn speech_has_no_builder() {
        let face = KeypointSet::zeros(1);
        let err = build(Modality::Speech, Landmarks::Face(&face)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedModality(Modality::Speech)));

        let err = build(Modality::Arm, Landmarks::Face(&face)).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
    }
}
