//! Camera intrinsics seen as a black box by the localizer.
//!
//! The localizer only needs to undistort observations, build a calibration
//! matrix, project points through a pose, and read or write a flat parameter
//! vector for refinement. Distortion models beyond a single radial term are
//! out of scope.

use std::fmt::Debug;

use nalgebra::{Matrix3, Vector2, Vector3};

use crate::error::CameraError;
use crate::models::AbsolutePose;

/// Intrinsic camera model.
pub trait Intrinsics: Debug + Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Calibration matrix `K`.
    fn k_matrix(&self) -> Matrix3<f64>;

    /// Flat parameter vector, the layout is model specific.
    fn params(&self) -> Vec<f64>;

    fn set_params(&mut self, params: &[f64]) -> Result<(), CameraError>;

    /// Normalized camera plane to pixels, without distortion.
    fn cam_to_ima(&self, p: &Vector2<f64>) -> Vector2<f64> {
        let k = self.k_matrix();
        let h = k * Vector3::new(p.x, p.y, 1.0);
        Vector2::new(h.x / h.z, h.y / h.z)
    }

    /// Pixels to the normalized camera plane, without distortion.
    fn ima_to_cam(&self, p: &Vector2<f64>) -> Vector2<f64> {
        let k = self.k_matrix();
        let fx = k[(0, 0)];
        let fy = k[(1, 1)];
        let y = (p.y - k[(1, 2)]) / fy;
        let x = (p.x - k[(0, 2)] - k[(0, 1)] * y) / fx;
        Vector2::new(x, y)
    }

    fn has_distortion(&self) -> bool {
        false
    }

    /// Apply distortion on the normalized camera plane.
    fn add_distortion(&self, p: &Vector2<f64>) -> Vector2<f64> {
        *p
    }

    /// Invert [`Intrinsics::add_distortion`].
    fn remove_distortion(&self, p: &Vector2<f64>) -> Vector2<f64> {
        *p
    }

    /// Project a world point through `pose` to (distorted) pixels.
    fn project(&self, pose: &AbsolutePose, x: &Vector3<f64>) -> Vector2<f64> {
        let c = pose.transform_point(x);
        let n = Vector2::new(c.x / c.z, c.y / c.z);
        self.cam_to_ima(&self.add_distortion(&n))
    }

    /// `observed - project(pose, x)`.
    fn residual(&self, pose: &AbsolutePose, x: &Vector3<f64>, observed: &Vector2<f64>) -> Vector2<f64> {
        observed - self.project(pose, x)
    }

    /// Pixel position the observation would have without lens distortion.
    fn get_undistorted_pixel(&self, p: &Vector2<f64>) -> Vector2<f64> {
        if !self.has_distortion() {
            return *p;
        }
        self.cam_to_ima(&self.remove_distortion(&self.ima_to_cam(p)))
    }

    fn boxed_clone(&self) -> Box<dyn Intrinsics>;
}

impl Clone for Box<dyn Intrinsics> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Pinhole camera with a single focal length and a principal point.
///
/// Parameters: `[focal, ppx, ppy]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pinhole {
    pub width: u32,
    pub height: u32,
    pub focal: f64,
    pub ppx: f64,
    pub ppy: f64,
}

impl Pinhole {
    pub fn new(width: u32, height: u32, focal: f64, ppx: f64, ppy: f64) -> Self {
        Self {
            width,
            height,
            focal,
            ppx,
            ppy,
        }
    }
}

fn check_focal(focal: f64) -> Result<(), CameraError> {
    if focal > 0.0 && focal.is_finite() {
        Ok(())
    } else {
        Err(CameraError::NonPositiveFocal(focal))
    }
}

impl Intrinsics for Pinhole {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal, 0.0, self.ppx, //
            0.0, self.focal, self.ppy, //
            0.0, 0.0, 1.0,
        )
    }

    fn params(&self) -> Vec<f64> {
        vec![self.focal, self.ppx, self.ppy]
    }

    fn set_params(&mut self, params: &[f64]) -> Result<(), CameraError> {
        let [focal, ppx, ppy] = params else {
            return Err(CameraError::ParameterCount {
                expected: 3,
                actual: params.len(),
            });
        };
        check_focal(*focal)?;
        self.focal = *focal;
        self.ppx = *ppx;
        self.ppy = *ppy;
        Ok(())
    }

    fn cam_to_ima(&self, p: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(self.focal * p.x + self.ppx, self.focal * p.y + self.ppy)
    }

    fn ima_to_cam(&self, p: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new((p.x - self.ppx) / self.focal, (p.y - self.ppy) / self.focal)
    }

    fn boxed_clone(&self) -> Box<dyn Intrinsics> {
        Box::new(self.clone())
    }
}

/// Pinhole camera with one radial distortion coefficient,
/// `p_d = p * (1 + k1 * |p|^2)`.
///
/// Parameters: `[focal, ppx, ppy, k1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeRadialK1 {
    pub pinhole: Pinhole,
    pub k1: f64,
}

impl PinholeRadialK1 {
    pub fn new(width: u32, height: u32, focal: f64, ppx: f64, ppy: f64, k1: f64) -> Self {
        Self {
            pinhole: Pinhole::new(width, height, focal, ppx, ppy),
            k1,
        }
    }
}

impl Intrinsics for PinholeRadialK1 {
    fn width(&self) -> u32 {
        self.pinhole.width
    }

    fn height(&self) -> u32 {
        self.pinhole.height
    }

    fn k_matrix(&self) -> Matrix3<f64> {
        self.pinhole.k_matrix()
    }

    fn params(&self) -> Vec<f64> {
        let mut p = self.pinhole.params();
        p.push(self.k1);
        p
    }

    fn set_params(&mut self, params: &[f64]) -> Result<(), CameraError> {
        let [focal, ppx, ppy, k1] = params else {
            return Err(CameraError::ParameterCount {
                expected: 4,
                actual: params.len(),
            });
        };
        self.pinhole.set_params(&[*focal, *ppx, *ppy])?;
        self.k1 = *k1;
        Ok(())
    }

    fn cam_to_ima(&self, p: &Vector2<f64>) -> Vector2<f64> {
        self.pinhole.cam_to_ima(p)
    }

    fn ima_to_cam(&self, p: &Vector2<f64>) -> Vector2<f64> {
        self.pinhole.ima_to_cam(p)
    }

    fn has_distortion(&self) -> bool {
        self.k1 != 0.0
    }

    fn add_distortion(&self, p: &Vector2<f64>) -> Vector2<f64> {
        p * (1.0 + self.k1 * p.norm_squared())
    }

    fn remove_distortion(&self, p: &Vector2<f64>) -> Vector2<f64> {
        // Fixed-point iteration on the radial scale.
        let mut u = *p;
        for _ in 0..20 {
            let scale = 1.0 + self.k1 * u.norm_squared();
            if scale.abs() < f64::EPSILON {
                break;
            }
            let next = p / scale;
            if (next - u).norm_squared() < 1e-24 {
                u = next;
                break;
            }
            u = next;
        }
        u
    }

    fn boxed_clone(&self) -> Box<dyn Intrinsics> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pinhole_round_trip() {
        let cam = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        let p = Vector2::new(0.1, -0.2);
        let px = cam.cam_to_ima(&p);
        assert_relative_eq!(px, Vector2::new(370.0, 140.0));
        assert_relative_eq!(cam.ima_to_cam(&px), p, epsilon = 1e-15);
        assert_relative_eq!(cam.get_undistorted_pixel(&px), px);
    }

    #[test]
    fn set_params_validates_input() {
        let mut cam = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
        assert_eq!(
            cam.set_params(&[1.0, 2.0]),
            Err(CameraError::ParameterCount {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(
            cam.set_params(&[-1.0, 2.0, 3.0]),
            Err(CameraError::NonPositiveFocal(-1.0))
        );
        assert!(cam.set_params(&[600.0, 300.0, 200.0]).is_ok());
        assert_eq!(cam.params(), vec![600.0, 300.0, 200.0]);
    }

    #[test]
    fn radial_distortion_is_inverted() {
        let cam = PinholeRadialK1::new(640, 480, 500.0, 320.0, 240.0, -0.15);
        let p = Vector2::new(0.3, 0.2);
        let d = cam.add_distortion(&p);
        assert_relative_eq!(cam.remove_distortion(&d), p, epsilon = 1e-10);

        let distorted_px = cam.cam_to_ima(&d);
        let undistorted_px = cam.get_undistorted_pixel(&distorted_px);
        assert_relative_eq!(undistorted_px, cam.cam_to_ima(&p), epsilon = 1e-7);
    }

    #[test]
    fn project_applies_pose_and_distortion() {
        let cam = PinholeRadialK1::new(640, 480, 500.0, 320.0, 240.0, 0.1);
        let pose = AbsolutePose::from_rt(Matrix3::identity(), Vector3::new(0.0, 0.0, 2.0));
        let x = Vector3::new(0.4, 0.0, 0.0);
        // normalized 0.2 -> distorted 0.2 * (1 + 0.1 * 0.04)
        let px = cam.project(&pose, &x);
        assert_relative_eq!(px.x, 320.0 + 500.0 * 0.2 * 1.004, epsilon = 1e-9);
        assert_relative_eq!(cam.residual(&pose, &x, &px), Vector2::zeros());
    }
}
