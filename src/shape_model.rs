//! Cascaded regression-tree landmark model.
//!
//! Implements the prediction side of "One Millisecond Face Alignment with an
//! Ensemble of Regression Trees" (Kazemi & Sullivan, 2014). The landmark
//! count is whatever the model was trained with, so the same code serves
//! dense face meshes as well as small hand skeletons.
//!
//! 1. Start with the mean shape scaled into the subject's bounding box
//! 2. For each cascade stage, every tree probes pixel intensity differences
//!    around the current estimate and votes a shape delta
//! 3. The summed delta refines the estimate for the next stage

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::read_artifact;
use crate::error::{Error, Result};
use crate::raster::{sample_bilinear, PixelSource};
use crate::tree::{RegressionTree, TreeNode};
use crate::types::{BoundingBox, KeypointSet, Point};

/// Intensity-difference probe anchored on two landmarks of the current shape.
///
/// Offsets are in box-normalized units and scaled by the subject box size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PixelProbe {
    pub anchor_a: u16,
    pub offset_a: Point,
    pub anchor_b: u16,
    pub offset_b: Point,
}

impl PixelProbe {
    fn locate(&self, shape: &KeypointSet, bbox: &BoundingBox) -> Option<(Point, Point)> {
        let a = shape.get(self.anchor_a as usize)?;
        let b = shape.get(self.anchor_b as usize)?;
        let pa = a + Point::new(self.offset_a.x * bbox.width, self.offset_a.y * bbox.height);
        let pb = b + Point::new(self.offset_b.x * bbox.width, self.offset_b.y * bbox.height);
        Some((pa, pb))
    }

    /// Raw intensity difference between the two probe positions.
    pub fn measure<I: PixelSource>(&self, shape: &KeypointSet, bbox: &BoundingBox, image: &I) -> f64 {
        match self.locate(shape, bbox) {
            Some((pa, pb)) => sample_bilinear(image, pa.x, pa.y) - sample_bilinear(image, pb.x, pb.y),
            None => 0.0,
        }
    }
}

/// Tree whose leaves hold normalized shape deltas.
pub type ShapeTree = RegressionTree<PixelProbe, KeypointSet>;

/// Trained landmark model: mean shape plus a cascade of tree forests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkModel {
    /// Mean shape in normalized [0,1] box coordinates.
    mean_shape: KeypointSet,

    /// Each stage's trees are summed, then applied before the next stage.
    cascade: Vec<Vec<ShapeTree>>,
}

impl LandmarkModel {
    /// Build a model, rejecting leaves and probes that don't fit the mean shape.
    pub fn new(mean_shape: KeypointSet, cascade: Vec<Vec<ShapeTree>>) -> Result<Self> {
        if mean_shape.is_empty() {
            return Err(Error::InvalidModel("Mean shape has no landmarks".into()));
        }
        if cascade.is_empty() {
            return Err(Error::InvalidModel(
                "Cascade must have at least one stage".into(),
            ));
        }

        let n = mean_shape.len();
        for (stage_idx, stage) in cascade.iter().enumerate() {
            for tree in stage {
                for node in &tree.nodes {
                    match node {
                        TreeNode::Leaf(delta) if delta.len() != n => {
                            return Err(Error::InvalidModel(format!(
                                "Stage {stage_idx}: leaf delta has {} points, expected {n}",
                                delta.len()
                            )));
                        }
                        TreeNode::Split { test, .. }
                            if test.anchor_a as usize >= n || test.anchor_b as usize >= n =>
                        {
                            return Err(Error::InvalidModel(format!(
                                "Stage {stage_idx}: probe anchor out of range for {n} landmarks"
                            )));
                        }
                        _ => {}
                    }
                }
            }
        }

        Ok(Self {
            mean_shape,
            cascade,
        })
    }

    /// Load a model from bincode, bzip2-compressed when the path ends in `.bz2`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = read_artifact(path.as_ref())?;
        let raw: Self = bincode::deserialize(&bytes)?;
        Self::new(raw.mean_shape, raw.cascade)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let bytes = bincode::serialize(self)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    pub fn num_landmarks(&self) -> usize {
        self.mean_shape.len()
    }

    pub fn num_stages(&self) -> usize {
        self.cascade.len()
    }

    /// Predict landmarks for the subject inside `bbox`, in image coordinates.
    pub fn predict<I: PixelSource>(&self, image: &I, bbox: &BoundingBox) -> Result<KeypointSet> {
        let mut shape = KeypointSet::with_capacity(self.num_landmarks());
        for p in &self.mean_shape.points {
            shape.points.push(bbox.denormalize_point(*p));
        }

        for (stage_idx, stage) in self.cascade.iter().enumerate() {
            let mut delta = KeypointSet::zeros(self.num_landmarks());
            for tree in stage {
                let leaf = tree
                    .predict(|probe| probe.measure(&shape, bbox, image))
                    .ok_or_else(|| {
                        Error::InvalidModel(format!("Stage {stage_idx}: malformed tree"))
                    })?;
                delta.add_delta(leaf);
            }

            for (point, d) in shape.points.iter_mut().zip(delta.points.iter()) {
                point.x += d.x * bbox.width;
                point.y += d.y * bbox.height;
            }
        }

        Ok(shape)
    }
}
