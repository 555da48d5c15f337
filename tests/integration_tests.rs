//! Integration tests for the public API.
//!
//! These tests run the estimators and the localizer end to end on synthetic
//! scenes with known ground truth.

use loransac::core::Kernel;
use loransac::kernel::HomographyKernel;
use loransac::localization::{BruteForceMatcher, Landmark, QueryRegions};
use loransac::*;
use nalgebra::{DMatrix, Matrix3, Vector2, Vector3};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn homography_truth() -> Matrix3<f64> {
    Matrix3::new(0.98, -0.12, 35.0, 0.09, 1.03, -12.0, 1.5e-4, -8e-5, 1.0)
}

fn transfer(h: &Matrix3<f64>, u: f64, v: f64) -> (f64, f64) {
    let p = h * Vector3::new(u, v, 1.0);
    (p.x / p.z, p.y / p.z)
}

/// Mean transfer distance to the noiseless positions over the first `n` rows.
fn transfer_error(h: &Matrix3<f64>, points1: &DMatrix<f64>, n: usize) -> f64 {
    let truth = homography_truth();
    (0..n)
        .map(|i| {
            let (u, v) = (points1[(i, 0)], points1[(i, 1)]);
            let (a, b) = transfer(h, u, v);
            let (c, d) = transfer(&truth, u, v);
            ((a - c).powi(2) + (b - d).powi(2)).sqrt()
        })
        .sum::<f64>()
        / n as f64
}

/// `inliers` noisy correspondences followed by `outliers` gross mismatches.
fn homography_data(inliers: usize, outliers: usize, noise: f64) -> (DMatrix<f64>, DMatrix<f64>) {
    let h = homography_truth();
    let n = inliers + outliers;
    let mut points1 = DMatrix::<f64>::zeros(n, 2);
    let mut points2 = DMatrix::<f64>::zeros(n, 2);
    for i in 0..n {
        let fi = i as f64;
        let (u, v) = (320.0 + 280.0 * (fi * 0.37).sin(), 240.0 + 200.0 * (fi * 0.91).cos());
        let (x, y) = transfer(&h, u, v);
        points1[(i, 0)] = u;
        points1[(i, 1)] = v;
        if i < inliers {
            points2[(i, 0)] = x + noise * (fi * 12.9898).sin();
            points2[(i, 1)] = y + noise * (fi * 78.233).cos();
        } else {
            points2[(i, 0)] = x + 40.0 + 90.0 * (fi * 1.7).sin().abs();
            points2[(i, 1)] = y - 50.0 - 70.0 * (fi * 2.3).cos().abs();
        }
    }
    (points1, points2)
}

#[test]
fn test_estimate_homography_noiseless() {
    init_logger();
    let (points1, points2) = homography_data(30, 0, 0.0);
    let settings = RansacSettings::default().with_seed(1);
    let result = estimate_homography(
        &points1,
        &points2,
        Some(((640, 480), (640, 480))),
        1.0,
        Some(settings),
    )
    .unwrap();

    assert_eq!(result.inliers.len(), 30);
    assert!(transfer_error(&result.model.h, &points1, 30) < 1e-6);
}

#[test]
fn test_local_optimization_beats_plain_ransac() {
    init_logger();
    let (points1, points2) = homography_data(70, 30, 0.5);
    let sizes = Some(((640, 480), (640, 480)));

    let plain = RansacSettings::default()
        .with_seed(42)
        .with_local_optimization(LocalOptimizationType::None);
    let lo = RansacSettings::default().with_seed(42);

    let plain = estimate_homography(&points1, &points2, sizes, 2.0, Some(plain)).unwrap();
    let lo = estimate_homography(&points1, &points2, sizes, 2.0, Some(lo)).unwrap();

    assert!(lo.inliers.iter().all(|&i| i < 70));
    assert!(lo.inliers.len() >= plain.inliers.len());
    assert!(transfer_error(&lo.model.h, &points1, 70) < transfer_error(&plain.model.h, &points1, 70));
}

#[test]
fn test_estimate_fundamental_matrix_two_views() {
    init_logger();
    let k = Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0);
    let first = AbsolutePose::default();
    let second = AbsolutePose::from_scaled_axis(Vector3::new(0.02, 0.15, -0.03), Vector3::new(-1.0, 0.1, 0.05));
    let camera = Pinhole::new(640, 480, 600.0, 320.0, 240.0);

    let n = 40;
    let mut points1 = DMatrix::<f64>::zeros(n, 2);
    let mut points2 = DMatrix::<f64>::zeros(n, 2);
    for i in 0..n {
        let fi = i as f64;
        let x = Vector3::new(2.0 * (fi * 0.77).sin(), 1.5 * (fi * 1.31).cos(), 6.0 + 2.0 * (fi * 0.53).sin());
        let a = camera.project(&first, &x);
        let b = camera.project(&second, &x);
        points1[(i, 0)] = a.x;
        points1[(i, 1)] = a.y;
        points2[(i, 0)] = b.x;
        points2[(i, 1)] = b.y;
    }

    let settings = RansacSettings::default().with_seed(9);
    let result = estimate_fundamental_matrix(&points1, &points2, None, 1.0, Some(settings)).unwrap();
    assert_eq!(result.inliers.len(), n);

    let f = result.model.f;
    assert!(f.determinant().abs() < 1e-8 * f.norm().powi(3));
    let k_inv = k.try_inverse().unwrap();
    for i in 0..n {
        let a = Vector3::new(points1[(i, 0)], points1[(i, 1)], 1.0);
        let b = Vector3::new(points2[(i, 0)], points2[(i, 1)], 1.0);
        // Algebraic error measured on normalized rays stays scale-free.
        let ra = (k_inv * a).normalize();
        let rb = (k_inv * b).normalize();
        let e = k.transpose() * f * k;
        assert!((rb.transpose() * e * ra)[0].abs() / e.norm() < 1e-6);
    }
}

#[test]
fn test_unnormalize_twice_is_rejected() {
    let (points1, points2) = homography_data(12, 0, 0.0);
    let kernel = HomographyKernel::from_points(&points1, &points2).unwrap();
    let mut model = kernel.fit(&[0, 3, 6, 9]).unwrap().remove(0);
    assert!(kernel.unnormalize(&mut model).is_ok());
    let snapshot = model.clone();
    assert_eq!(kernel.unnormalize(&mut model), Err(RansacError::AlreadyUnnormalized));
    assert_eq!(model, snapshot);
}

fn six_point_scene() -> (Vec<Vector2<f64>>, Vec<Vector3<f64>>, AbsolutePose) {
    let pose = AbsolutePose::from_scaled_axis(Vector3::new(0.1, 0.2, -0.05), Vector3::new(0.3, -0.2, 5.0));
    let points3d = vec![
        Vector3::new(-1.0, -1.0, 0.5),
        Vector3::new(1.2, -0.8, -0.3),
        Vector3::new(0.9, 1.1, 0.8),
        Vector3::new(-1.1, 0.7, -0.6),
        Vector3::new(0.2, -0.1, 1.3),
        Vector3::new(-0.3, 0.4, -1.2),
    ];
    let points2d = points3d
        .iter()
        .map(|x| {
            let c = pose.transform_point(x);
            Vector2::new(c.x / c.z, c.y / c.z)
        })
        .collect();
    (points2d, points3d, pose)
}

#[test]
fn test_localize_six_points_identity_calibration() {
    init_logger();
    let (points2d, points3d, truth) = six_point_scene();
    let camera = Pinhole::new(2, 2, 1.0, 0.0, 0.0);
    let mut data = MatchData::from_correspondences(&points2d, &points3d);
    let settings = LocalizerSettings {
        ransac: RansacSettings::default().with_seed(5),
        ..LocalizerSettings::default()
    };

    let pose = localize_from_matches((2, 2), Some(&camera), &mut data, EstimatorKind::LoRansac, &settings).unwrap();

    assert_eq!(data.inliers, vec![0, 1, 2, 3, 4, 5]);
    assert!(pose.rotation_error(&truth) < 1e-6);
    assert!(pose.translation_error(&truth) < 1e-6);
}

#[test]
fn test_lo_ransac_without_intrinsics_is_invalid() {
    let (points2d, points3d, _) = six_point_scene();
    let mut data = MatchData::from_correspondences(&points2d, &points3d);
    let res = localize_from_matches(
        (2, 2),
        None,
        &mut data,
        EstimatorKind::LoRansac,
        &LocalizerSettings::default(),
    );
    assert!(matches!(res, Err(RansacError::InvalidArgument(_))));
    assert!(data.inliers.is_empty());
}

fn pixel_scene(camera: &Pinhole, pose: &AbsolutePose, n: usize) -> MatchData {
    let points3d: Vec<_> = (0..n)
        .map(|i| {
            let fi = i as f64;
            Vector3::new(1.8 * (fi * 1.1).sin(), 1.4 * (fi * 0.6).cos(), 0.9 * (fi * 2.7).sin())
        })
        .collect();
    let points2d: Vec<_> = points3d.iter().map(|x| camera.project(pose, x)).collect();
    let mut data = MatchData::from_correspondences(&points2d, &points3d);
    data.inliers = (0..n).collect();
    data
}

#[test]
fn test_refine_pose_on_noiseless_data_keeps_inputs() {
    let mut camera = Pinhole::new(640, 480, 550.0, 320.0, 240.0);
    let mut pose = AbsolutePose::from_scaled_axis(Vector3::new(-0.1, 0.05, 0.1), Vector3::new(0.2, 0.1, 6.0));
    let data = pixel_scene(&camera, &pose, 20);
    let (camera_before, pose_before) = (camera.clone(), pose.clone());

    let improved = refine_pose(&mut camera, &mut pose, &data, true, true, &RefineOptions::default()).unwrap();

    assert!(!improved);
    assert_eq!(camera, camera_before);
    assert_eq!(pose, pose_before);
}

#[test]
fn test_refine_pose_recovers_perturbed_pose() {
    let mut camera = Pinhole::new(640, 480, 550.0, 320.0, 240.0);
    let truth = AbsolutePose::from_scaled_axis(Vector3::new(-0.1, 0.05, 0.1), Vector3::new(0.2, 0.1, 6.0));
    let data = pixel_scene(&camera, &truth, 20);
    let mut pose = AbsolutePose::from_scaled_axis(
        truth.rotation.scaled_axis() + Vector3::new(0.02, -0.01, 0.0),
        truth.translation.vector + Vector3::new(0.1, 0.0, -0.3),
    );

    let improved = refine_pose(&mut camera, &mut pose, &data, true, false, &RefineOptions::default()).unwrap();

    assert!(improved);
    assert!(pose.rotation_error(&truth) < 1e-7);
    assert!(pose.translation_error(&truth) < 1e-6);
    assert_eq!(camera.focal, 550.0);
}

#[test]
fn test_track_observation_localizer_end_to_end() {
    init_logger();
    let camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
    let truth = AbsolutePose::from_scaled_axis(Vector3::new(0.05, -0.2, 0.03), Vector3::new(0.4, -0.1, 7.0));

    let landmarks: Vec<Landmark> = (0..40)
        .map(|i| {
            let fi = i as f64;
            Landmark {
                position: Vector3::new(2.0 * (fi * 0.9).sin(), 1.5 * (fi * 1.4).cos(), (fi * 0.35).sin()),
                descriptor: vec![10.0 * i as f32, (i % 3) as f32],
            }
        })
        .collect();

    // Observe every other landmark, and corrupt a few of the observations.
    let mut keypoints = Vec::new();
    let mut descriptors = Vec::new();
    for (k, landmark) in landmarks.iter().enumerate().step_by(2) {
        let mut px = camera.project(&truth, &landmark.position);
        if k % 10 == 0 {
            px += Vector2::new(45.0, -30.0);
        }
        keypoints.push(px);
        descriptors.push(landmark.descriptor.clone());
    }
    let query = QueryRegions::new(keypoints, descriptors).unwrap();

    let mut localizer = TrackObservationLocalizer::new(
        BruteForceMatcher::default(),
        EstimatorKind::LoRansac,
        LocalizerSettings {
            ransac: RansacSettings::default().with_seed(21),
            ..LocalizerSettings::default()
        },
    );
    localizer.init(landmarks).unwrap();

    let (pose, data) = localizer.localize((640, 480), Some(&camera), &query).unwrap();
    assert_eq!(data.len(), 20);
    assert_eq!(data.inliers.len(), 16);
    assert!(pose.rotation_error(&truth) < 1e-6);
    assert!(pose.translation_error(&truth) < 1e-5);
}
