//! Geometric models produced by the kernels.
//!
//! Every model a kernel returns is tagged with the coordinate frame it is
//! expressed in. Kernels fit in a normalized frame; `Kernel::unnormalize`
//! moves the model back to the caller's frame exactly once.

use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::types::Mat34;

/// Frame a model is currently expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFrame {
    /// Conditioned coordinates used internally by a kernel.
    Normalized,
    /// The caller's coordinates.
    Original,
}

/// Common behaviour of kernel models.
pub trait Model: Clone + std::fmt::Debug {
    fn frame(&self) -> CoordinateFrame;

    fn set_frame(&mut self, frame: CoordinateFrame);

    /// All parameters are finite numbers.
    fn is_finite(&self) -> bool;
}

macro_rules! impl_model {
    ($ty:ty, $field:ident) => {
        impl Model for $ty {
            fn frame(&self) -> CoordinateFrame {
                self.frame
            }

            fn set_frame(&mut self, frame: CoordinateFrame) {
                self.frame = frame;
            }

            fn is_finite(&self) -> bool {
                self.$field.iter().all(|v| v.is_finite())
            }
        }
    };
}

/// Planar projective transformation `x2 ~ H x1`.
#[derive(Clone, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
    pub frame: CoordinateFrame,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self {
            h,
            frame: CoordinateFrame::Original,
        }
    }

    pub(crate) fn normalized(h: Matrix3<f64>) -> Self {
        Self {
            h,
            frame: CoordinateFrame::Normalized,
        }
    }

    /// Copy scaled so that `h[(2, 2)] == 1` (when possible).
    pub fn scaled(&self) -> Matrix3<f64> {
        let s = self.h[(2, 2)];
        if s.abs() > f64::EPSILON {
            self.h / s
        } else {
            self.h
        }
    }
}

impl_model!(Homography, h);

/// Fundamental matrix relating two pinhole views, `x2ᵀ F x1 = 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct FundamentalMatrix {
    pub f: Matrix3<f64>,
    pub frame: CoordinateFrame,
}

impl FundamentalMatrix {
    pub fn new(f: Matrix3<f64>) -> Self {
        Self {
            f,
            frame: CoordinateFrame::Original,
        }
    }

    pub(crate) fn normalized(f: Matrix3<f64>) -> Self {
        Self {
            f,
            frame: CoordinateFrame::Normalized,
        }
    }
}

impl_model!(FundamentalMatrix, f);

/// Camera projection matrix `x ~ P X`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionMatrix {
    pub p: Mat34,
    pub frame: CoordinateFrame,
}

impl ProjectionMatrix {
    pub fn new(p: Mat34) -> Self {
        Self {
            p,
            frame: CoordinateFrame::Original,
        }
    }

    pub(crate) fn normalized(p: Mat34) -> Self {
        Self {
            p,
            frame: CoordinateFrame::Normalized,
        }
    }

    /// Compose `P = K [R | t]`.
    pub fn from_krt(k: &Matrix3<f64>, r: &Matrix3<f64>, t: &Vector3<f64>) -> Self {
        let mut rt = Mat34::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).copy_from(r);
        rt.fixed_view_mut::<3, 1>(0, 3).copy_from(t);
        Self::new(k * rt)
    }

    /// Left 3×3 block of `P`.
    pub fn m(&self) -> Matrix3<f64> {
        self.p.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// Depth of a world point in front of (positive) or behind the camera.
    pub fn depth(&self, x: &Vector3<f64>) -> f64 {
        let h = self.p * x.push(1.0);
        let m = self.m();
        let det = m.determinant();
        let scale = m.row(2).norm();
        if scale <= 0.0 {
            return 0.0;
        }
        det.signum() * h.z / scale
    }

    /// Decompose `P` into `K` (upper triangular, positive diagonal, `K[2,2]=1`),
    /// a proper rotation `R` and a translation `t`.
    ///
    /// Returns `None` when the left 3×3 block is singular.
    pub fn decompose(&self) -> Option<(Matrix3<f64>, Matrix3<f64>, Vector3<f64>)> {
        let mut p = self.p;
        if p.fixed_view::<3, 3>(0, 0).determinant() < 0.0 {
            p = -p;
        }
        let m: Matrix3<f64> = p.fixed_view::<3, 3>(0, 0).into_owned();
        if m.determinant().abs() < 1e-12 * m.norm().powi(3).max(f64::MIN_POSITIVE) {
            return None;
        }

        // RQ decomposition through a QR of the row-reversed transpose.
        let flip = Matrix3::new(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);
        let qr = (flip * m).transpose().qr();
        let mut k = flip * qr.r().transpose() * flip;
        let mut r = flip * qr.q().transpose();

        for i in 0..3 {
            if k[(i, i)] < 0.0 {
                k.column_mut(i).neg_mut();
                r.row_mut(i).neg_mut();
            }
        }
        if r.determinant() < 0.0 {
            return None;
        }

        let t = k.try_inverse()? * p.column(3);
        let scale = k[(2, 2)];
        if scale.abs() < f64::EPSILON {
            return None;
        }
        k /= scale;
        Some((k, r, t))
    }
}

impl_model!(ProjectionMatrix, p);

/// Absolute camera pose: rotation and translation from world to camera,
/// `x_cam = R * X + t`.
#[derive(Clone, Debug, PartialEq)]
pub struct AbsolutePose {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Translation3<f64>,
}

impl Default for AbsolutePose {
    fn default() -> Self {
        Self::new(UnitQuaternion::identity(), Translation3::identity())
    }
}

impl AbsolutePose {
    pub fn new(rotation: UnitQuaternion<f64>, translation: Translation3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_rt(r: Matrix3<f64>, t: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix(&r);
        let quat = UnitQuaternion::from_rotation_matrix(&rot);
        Self::new(quat, Translation3::from(t))
    }

    /// Build a pose from an axis-angle vector and a translation.
    pub fn from_scaled_axis(axis_angle: Vector3<f64>, t: Vector3<f64>) -> Self {
        Self::new(
            UnitQuaternion::from_scaled_axis(axis_angle),
            Translation3::from(t),
        )
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        *self.rotation.to_rotation_matrix().matrix()
    }

    /// Camera center in world coordinates, `-Rᵀ t`.
    pub fn center(&self) -> Vector3<f64> {
        -(self.rotation.inverse() * self.translation.vector)
    }

    /// Map a world point into the camera frame.
    pub fn transform_point(&self, x: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * x + self.translation.vector
    }

    /// Geodesic distance between the two rotations, in radians.
    pub fn rotation_error(&self, other: &AbsolutePose) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }

    pub fn translation_error(&self, other: &AbsolutePose) -> f64 {
        (self.translation.vector - other.translation.vector).norm()
    }
}
