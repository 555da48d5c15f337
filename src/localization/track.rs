use log::debug;
use nalgebra::{Vector2, Vector3};

use crate::camera::Intrinsics;
use crate::error::{RansacError, Result};
use crate::models::AbsolutePose;
use crate::settings::{EstimatorKind, LocalizerSettings};
use crate::types::ImageSize;

use super::{localize_from_matches, DescriptorMatcher, Localizer, MatchData};

/// A reconstructed 3D point and the descriptor of one of its observations.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub position: Vector3<f64>,
    pub descriptor: Vec<f32>,
}

/// Features extracted from a query image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRegions {
    /// Pixel positions, as observed (distorted).
    pub keypoints: Vec<Vector2<f64>>,
    pub descriptors: Vec<Vec<f32>>,
}

impl QueryRegions {
    pub fn new(keypoints: Vec<Vector2<f64>>, descriptors: Vec<Vec<f32>>) -> Result<Self> {
        if keypoints.len() != descriptors.len() {
            return Err(RansacError::InvalidArgument(format!(
                "{} keypoints for {} descriptors",
                keypoints.len(),
                descriptors.len()
            )));
        }
        Ok(Self {
            keypoints,
            descriptors,
        })
    }
}

/// Localizer matching query descriptors against the descriptors of scene
/// landmarks, one descriptor per landmark.
pub struct TrackObservationLocalizer<M> {
    matcher: M,
    estimator: EstimatorKind,
    settings: LocalizerSettings,
    positions: Vec<Vector3<f64>>,
    descriptors: Vec<Vec<f32>>,
}

impl<M: DescriptorMatcher> TrackObservationLocalizer<M> {
    pub fn new(matcher: M, estimator: EstimatorKind, settings: LocalizerSettings) -> Self {
        Self {
            matcher,
            estimator,
            settings,
            positions: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    pub fn num_landmarks(&self) -> usize {
        self.positions.len()
    }
}

impl<M: DescriptorMatcher> Localizer for TrackObservationLocalizer<M> {
    fn init(&mut self, landmarks: Vec<Landmark>) -> Result<()> {
        let Some(first) = landmarks.first() else {
            return Err(RansacError::InvalidArgument(
                "cannot build a localization database without landmarks".to_string(),
            ));
        };
        let dim = first.descriptor.len();
        if landmarks.iter().any(|l| l.descriptor.len() != dim) {
            return Err(RansacError::InvalidArgument(
                "landmark descriptors must share one length".to_string(),
            ));
        }
        let (positions, descriptors): (Vec<_>, Vec<_>) = landmarks
            .into_iter()
            .map(|l| (l.position, l.descriptor))
            .unzip();
        self.positions = positions;
        self.descriptors = descriptors;
        debug!("localization database holds {} landmarks", self.positions.len());
        Ok(())
    }

    fn localize(
        &self,
        image_size: ImageSize,
        intrinsics: Option<&dyn Intrinsics>,
        query: &QueryRegions,
    ) -> Result<(AbsolutePose, MatchData)> {
        if self.positions.is_empty() {
            return Err(RansacError::InvalidArgument(
                "localizer used before init".to_string(),
            ));
        }
        if query.keypoints.len() != query.descriptors.len() {
            return Err(RansacError::InvalidArgument(format!(
                "{} keypoints for {} descriptors",
                query.keypoints.len(),
                query.descriptors.len()
            )));
        }

        let matches = self
            .matcher
            .match_descriptors(&query.descriptors, &self.descriptors)?;
        debug!("{} putative 2D-3D matches", matches.len());
        if let Some(m) = matches
            .iter()
            .find(|m| m.query >= query.keypoints.len() || m.reference >= self.positions.len())
        {
            return Err(RansacError::InvalidArgument(format!(
                "matcher returned pair ({}, {}) outside {} keypoints and {} landmarks",
                m.query,
                m.reference,
                query.keypoints.len(),
                self.positions.len()
            )));
        }

        let pt2d: Vec<_> = matches.iter().map(|m| query.keypoints[m.query]).collect();
        let pt3d: Vec<_> = matches.iter().map(|m| self.positions[m.reference]).collect();
        let mut data = MatchData::from_correspondences(&pt2d, &pt3d);
        let pose = localize_from_matches(image_size, intrinsics, &mut data, self.estimator, &self.settings)?;
        Ok((pose, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Pinhole;
    use crate::localization::{BruteForceMatcher, DescriptorMatch};
    use crate::settings::RansacSettings;

    #[test]
    fn init_validates_landmarks() {
        let mut loc = TrackObservationLocalizer::new(
            BruteForceMatcher::default(),
            EstimatorKind::Ransac,
            LocalizerSettings::default(),
        );
        assert!(loc.init(Vec::new()).is_err());
        let bad = vec![
            Landmark {
                position: Vector3::zeros(),
                descriptor: vec![0.0; 4],
            },
            Landmark {
                position: Vector3::x(),
                descriptor: vec![0.0; 3],
            },
        ];
        assert!(loc.init(bad).is_err());
        assert_eq!(loc.num_landmarks(), 0);
    }

    #[test]
    fn localize_before_init_fails() {
        let loc = TrackObservationLocalizer::new(
            BruteForceMatcher::default(),
            EstimatorKind::Ransac,
            LocalizerSettings::default(),
        );
        let camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let res = loc.localize((640, 480), Some(&camera), &QueryRegions::default());
        assert!(matches!(res, Err(RansacError::InvalidArgument(_))));
    }

    #[test]
    fn too_few_matches_is_reported() {
        let mut loc = TrackObservationLocalizer::new(
            BruteForceMatcher::default(),
            EstimatorKind::LoRansac,
            LocalizerSettings {
                ransac: RansacSettings::default().with_seed(3),
                ..LocalizerSettings::default()
            },
        );
        let landmarks = (0..3)
            .map(|i| Landmark {
                position: Vector3::new(i as f64, 0.0, 5.0),
                descriptor: vec![i as f32 * 10.0],
            })
            .collect();
        loc.init(landmarks).unwrap();
        let query = QueryRegions::new(
            vec![Vector2::new(10.0, 10.0), Vector2::new(20.0, 20.0)],
            vec![vec![0.0], vec![10.0]],
        )
        .unwrap();
        let camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let res = loc.localize((640, 480), Some(&camera), &query);
        assert!(matches!(res, Err(RansacError::InsufficientSamples { .. })));
    }

    struct OutOfRangeMatcher;

    impl DescriptorMatcher for OutOfRangeMatcher {
        fn match_descriptors(&self, _query: &[Vec<f32>], _reference: &[Vec<f32>]) -> Result<Vec<DescriptorMatch>> {
            Ok(vec![DescriptorMatch {
                query: 99,
                reference: 0,
                distance: 0.0,
            }])
        }
    }

    #[test]
    fn out_of_range_matches_are_rejected() {
        let mut loc = TrackObservationLocalizer::new(
            OutOfRangeMatcher,
            EstimatorKind::Ransac,
            LocalizerSettings::default(),
        );
        loc.init(vec![Landmark {
            position: Vector3::new(0.0, 0.0, 5.0),
            descriptor: vec![0.0],
        }])
        .unwrap();
        let query = QueryRegions::new(vec![Vector2::new(10.0, 10.0)], vec![vec![0.0]]).unwrap();
        let camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let res = loc.localize((640, 480), Some(&camera), &query);
        assert!(matches!(res, Err(RansacError::InvalidArgument(_))));
    }
}
