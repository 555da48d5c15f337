//! # loransac - LO-RANSAC kernels and camera localization
//!
//! `loransac` estimates geometric models from correspondences contaminated by
//! outliers. A [`Kernel`](core::Kernel) binds a data set to a minimal solver,
//! a least-squares solver and an error metric; the [`LoRansac`](core::LoRansac)
//! loop samples, scores and locally optimizes hypotheses over it. On top sits
//! a localizer that turns 2D-3D matches into a camera pose and refines it.
//!
//! ## Quick Start
//!
//! ```rust
//! use loransac::{estimate_homography, RansacSettings};
//! use nalgebra::DMatrix;
//!
//! let points1 = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
//! let points2 = DMatrix::from_row_slice(4, 2, &[1.0, 1.0, 2.0, 1.0, 2.0, 2.0, 1.0, 2.0]);
//!
//! let settings = RansacSettings::default().with_seed(7);
//! let result = estimate_homography(&points1, &points2, None, 1.0, Some(settings)).unwrap();
//! assert_eq!(result.inliers.len(), 4);
//! ```
//!
//! ## Extending the Library
//!
//! The loop is generic over its components. Implement these traits to plug
//! in your own:
//!
//! - **[`Solver`](core::Solver)**, **[`ErrorMetric`](core::ErrorMetric)**,
//!   **[`Unnormalizer`](core::Unnormalizer)**: the strategies a kernel is built from
//! - **[`Kernel`](core::Kernel)**: a new data binding altogether
//! - **[`Sampler`](core::Sampler)**: custom sampling strategies
//! - **[`Scoring<K>`](core::Scoring)**: custom inlier scoring
//! - **[`LocalOptimizer<K>`](core::LocalOptimizer)**: custom refinement of new best models
//! - **[`TerminationCriterion`](core::TerminationCriterion)**: custom stopping rules
//! - **[`Intrinsics`](camera::Intrinsics)**: camera models used by the localizer
//! - **[`DescriptorMatcher`](localization::DescriptorMatcher)**: 2D-3D matching front ends
//!
//! ### Example: Custom Sampler
//!
//! ```rust
//! use loransac::core::Sampler;
//!
//! /// Walks the data in consecutive windows.
//! struct SlidingWindow {
//!     start: usize,
//! }
//!
//! impl Sampler for SlidingWindow {
//!     fn sample(&mut self, num_samples: usize, out_indices: &mut [usize]) -> bool {
//!         if out_indices.len() > num_samples {
//!             return false;
//!         }
//!         for (k, slot) in out_indices.iter_mut().enumerate() {
//!             *slot = (self.start + k) % num_samples;
//!         }
//!         self.start += 1;
//!         true
//!     }
//! }
//!
//! let mut sampler = SlidingWindow { start: 0 };
//! let mut sample = [0usize; 3];
//! assert!(sampler.sample(4, &mut sample));
//! assert_eq!(sample, [0, 1, 2]);
//! ```
//!
//! ## Modules
//!
//! - **[`api`](api)**: one-call estimation of homographies, fundamental matrices and resections
//! - **[`core`](core)**: core traits and the `LoRansac` loop
//! - **[`kernel`](kernel)**: normalizing kernel adaptors
//! - **[`estimators`](estimators)**: built-in solvers and error metrics
//! - **[`samplers`](samplers)**, **[`scoring`](scoring)**, **[`optimisers`](optimisers)**: loop components
//! - **[`localization`](localization)**: pose from 2D-3D matches and its refinement
//! - **[`bundle_adjustment`](bundle_adjustment)**: Levenberg-Marquardt reprojection refinement
//! - **[`settings`](settings)**: configuration types

pub mod api;
pub mod bundle_adjustment;
pub mod camera;
pub mod choices;
pub mod conditioning;
pub mod core;
pub mod error;
pub mod estimators;
pub mod kernel;
pub mod localization;
pub mod models;
pub mod optimisers;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod types;
pub mod utils;

// Re-export high-level API
pub use api::{estimate, estimate_fundamental_matrix, estimate_homography, estimate_resection, estimate_with_cancel};

// Re-export core traits for easy access
pub use crate::core::{EstimationResult, Kernel, LoRansac, LocalOptimizer, Sampler, Scoring, TerminationCriterion};

pub use camera::{Intrinsics, Pinhole, PinholeRadialK1};
pub use error::{CameraError, RansacError};
pub use localization::{localize_from_matches, refine_pose, Localizer, MatchData, TrackObservationLocalizer};
pub use models::{AbsolutePose, FundamentalMatrix, Homography, ProjectionMatrix};

// Re-export settings for convenience
pub use settings::{EstimatorKind, LocalOptimizationType, LocalizerSettings, RansacSettings, RefineOptions};
