//! Landmark extraction: image bytes to keypoint sets.
//!
//! The keypoint detector itself is a black box behind [`LandmarkDetector`].
//! [`ErtDetector`] is the bundled implementation (rustface region proposals
//! plus a regression-tree landmark model); anything that returns positional
//! keypoints in the expected index scheme can replace it.

use std::path::Path;

use parking_lot::Mutex;
use rustface::ImageData;

use crate::error::{Error, Result};
use crate::raster::{decode_raster, PixelSource, Raster};
use crate::shape_model::LandmarkModel;
use crate::types::{BoundingBox, KeypointSet, Side, Subject};

/// A keypoint detector.
///
/// Returns every subject found, most prominent first. An empty vector means
/// nothing was detected, which is not an error at this level.
pub trait LandmarkDetector {
    fn detect(&self, image: &Raster) -> Result<Vec<Subject>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&self, image: &Raster) -> Result<Vec<Subject>> {
        (**self).detect(image)
    }
}

/// Hand keypoints from one image, by side. Either side may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandPair {
    pub left: Option<KeypointSet>,
    pub right: Option<KeypointSet>,
}

impl HandPair {
    pub fn side(&self, side: Side) -> Option<&KeypointSet> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Sort detected subjects into sides. Unlabeled subjects are ignored and
    /// the first subject per side wins.
    pub fn from_subjects(subjects: Vec<Subject>) -> Self {
        let mut pair = Self::default();
        for subject in subjects {
            let slot = match subject.side {
                Some(Side::Left) => &mut pair.left,
                Some(Side::Right) => &mut pair.right,
                None => continue,
            };
            if slot.is_none() {
                *slot = Some(subject.keypoints);
            }
        }
        pair
    }
}

/// Decode `bytes` and return the keypoints of the single required face.
///
/// When several faces are found, the first (most prominent) one is used.
pub fn extract_face<D: LandmarkDetector + ?Sized>(detector: &D, bytes: &[u8]) -> Result<KeypointSet> {
    let image = decode_raster(bytes)?;
    let subjects = detector.detect(&image)?;
    log::debug!("Face detector returned {} subject(s)", subjects.len());

    subjects
        .into_iter()
        .next()
        .map(|s| s.keypoints)
        .ok_or(Error::NoSubjectFound("face"))
}

/// Decode `bytes` and return whichever hands were found.
pub fn extract_hands<D: LandmarkDetector + ?Sized>(detector: &D, bytes: &[u8]) -> Result<HandPair> {
    let image = decode_raster(bytes)?;
    let pair = HandPair::from_subjects(detector.detect(&image)?);
    log::debug!(
        "Hand detector: left={} right={}",
        pair.left.is_some(),
        pair.right.is_some()
    );
    Ok(pair)
}

/// Tuning knobs for the rustface region proposer.
#[derive(Debug, Clone)]
pub struct ProposalParams {
    pub min_face_size: u32,
    pub score_threshold: f64,
    pub pyramid_scale_factor: f32,
    pub window_step: u32,
}

impl Default for ProposalParams {
    fn default() -> Self {
        Self {
            min_face_size: 20,
            score_threshold: 2.0,
            pyramid_scale_factor: 0.8,
            window_step: 4,
        }
    }
}

/// Face landmark detector: rustface boxes refined by a [`LandmarkModel`].
pub struct ErtDetector {
    proposer: Mutex<Box<dyn rustface::Detector>>,
    model: LandmarkModel,
}

impl ErtDetector {
    /// Load the SeetaFace region model and the landmark model from disk.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        proposer_path: P,
        landmark_path: Q,
        params: &ProposalParams,
    ) -> Result<Self> {
        let proposer_path = proposer_path.as_ref();
        let path_str = proposer_path
            .to_str()
            .ok_or_else(|| Error::Detector(format!("Invalid detector path {proposer_path:?}")))?;

        log::info!("Loading face region model from {}", proposer_path.display());
        let mut proposer = rustface::create_detector(path_str)
            .map_err(|e| Error::Detector(format!("Failed to load face detector: {e}")))?;
        proposer.set_min_face_size(params.min_face_size);
        proposer.set_score_thresh(params.score_threshold);
        proposer.set_pyramid_scale_factor(params.pyramid_scale_factor);
        proposer.set_slide_window_step(params.window_step, params.window_step);

        log::info!("Loading landmark model from {}", landmark_path.as_ref().display());
        let model = LandmarkModel::load(landmark_path)?;

        Ok(Self {
            proposer: Mutex::new(proposer),
            model,
        })
    }

    pub fn num_landmarks(&self) -> usize {
        self.model.num_landmarks()
    }
}

impl LandmarkDetector for ErtDetector {
    fn detect(&self, image: &Raster) -> Result<Vec<Subject>> {
        let data = ImageData::new(image.as_raw(), image.width(), image.height());
        let faces = self.proposer.lock().detect(&data);

        let mut boxes: Vec<BoundingBox> = faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                BoundingBox::new(
                    bbox.x() as f64,
                    bbox.y() as f64,
                    bbox.width() as f64,
                    bbox.height() as f64,
                )
            })
            .collect();
        boxes.sort_by(|a, b| b.area().total_cmp(&a.area()));

        boxes
            .iter()
            .map(|bbox| {
                Ok(Subject {
                    side: None,
                    keypoints: self.model.predict(image, bbox)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat};

    use super::*;
    use crate::types::Point;

    struct Fixed(Vec<Subject>);

    impl LandmarkDetector for Fixed {
        fn detect(&self, _image: &Raster) -> Result<Vec<Subject>> {
            Ok(self.0.clone())
        }
    }

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(image::GrayImage::new(8, 8))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn hand(side: Side, x: f64) -> Subject {
        Subject {
            side: Some(side),
            keypoints: KeypointSet::new(vec![Point::new(x, 0.0)]),
        }
    }

    #[test]
    fn no_face_is_a_hard_failure() {
        let err = extract_face(&Fixed(vec![]), &png()).unwrap_err();
        assert!(matches!(err, Error::NoSubjectFound("face")));
    }

    #[test]
    fn decode_failure_is_distinct_from_no_face() {
        let err = extract_face(&Fixed(vec![]), b"not an image").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn first_face_wins() {
        let detector = Fixed(vec![
            Subject {
                side: None,
                keypoints: KeypointSet::new(vec![Point::new(1.0, 1.0)]),
            },
            Subject {
                side: None,
                keypoints: KeypointSet::new(vec![Point::new(2.0, 2.0)]),
            },
        ]);
        let face = extract_face(&detector, &png()).unwrap();
        assert_eq!(face[0], Point::new(1.0, 1.0));
    }

    #[test]
    fn missing_hands_are_not_errors() {
        let pair = extract_hands(&Fixed(vec![]), &png()).unwrap();
        assert!(pair.is_empty());

        let pair = extract_hands(&Fixed(vec![hand(Side::Right, 3.0)]), &png()).unwrap();
        assert!(pair.left.is_none());
        assert_eq!(pair.side(Side::Right).unwrap()[0].x, 3.0);
    }

    #[test]
    fn first_subject_per_side_wins() {
        let pair = HandPair::from_subjects(vec![
            hand(Side::Left, 1.0),
            hand(Side::Left, 2.0),
            Subject {
                side: None,
                keypoints: KeypointSet::zeros(1),
            },
        ]);
        assert_eq!(pair.left.unwrap()[0].x, 1.0);
        assert!(pair.right.is_none());
    }
}
