use approx::assert_relative_eq;

use cloudalign_3d::linalg::{mat33_mul_vec3, transform_points3d};
use cloudalign_3d::ops::squared_euclidean_distance;
use cloudalign_3d::pointcloud::PointCloud;
use cloudalign_3d::transforms::axis_angle_to_rotation_matrix;
use cloudalign_icp::{icp, ICPMethod, ICPResult, ICPSettings};

fn make_points() -> Vec<[f64; 3]> {
    vec![
        [0.0, 0.0, 0.0],
        [3.0, 0.0, 0.0],
        [0.0, 2.0, 0.0],
        [0.0, 0.0, 4.0],
        [1.0, 1.0, 0.0],
        [2.0, 0.5, 1.0],
        [0.5, 1.5, 2.0],
        [1.5, 2.5, 3.0],
    ]
}

fn make_hemisphere(radius: f64, n: usize) -> Vec<[f64; 3]> {
    let mut points = Vec::new();
    for i in 0..=n {
        let phi = std::f64::consts::FRAC_PI_2 * i as f64 / n as f64;
        let n_theta = ((n as f64 * phi.sin()) as usize).max(1);
        for j in 0..n_theta {
            let theta = 2.0 * std::f64::consts::PI * j as f64 / n_theta as f64;
            points.push([
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            ]);
        }
    }
    points
}

fn transpose(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = m[j][i];
        }
    }
    out
}

// Move every target point into the source frame: p_src = R^T * (p_tgt - t),
// so that the ground truth of the registration is exactly (R, t).
fn displace_into_source_frame(
    target: &[[f64; 3]],
    rotation: &[[f64; 3]; 3],
    translation: &[f64; 3],
) -> Vec<[f64; 3]> {
    let r_t = transpose(rotation);
    target
        .iter()
        .map(|p| {
            let shifted = [
                p[0] - translation[0],
                p[1] - translation[1],
                p[2] - translation[2],
            ];
            let mut out = [0.0; 3];
            mat33_mul_vec3(&r_t, &shifted, &mut out);
            out
        })
        .collect()
}

fn assert_rotation_eq(actual: &[[f64; 3]; 3], expected: &[[f64; 3]; 3], epsilon: f64) {
    for (row_a, row_e) in actual.iter().zip(expected.iter()) {
        for (a, e) in row_a.iter().zip(row_e.iter()) {
            assert_relative_eq!(a, e, epsilon = epsilon);
        }
    }
}

// Invariants every valid result must satisfy: R^T R = I and det R = +1.
fn assert_proper_rotation(result: &ICPResult) {
    let r = &result.rotation;
    for i in 0..3 {
        for j in 0..3 {
            let dot = (0..3).map(|k| r[k][i] * r[k][j]).sum::<f64>();
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_relative_eq!(dot, expected, epsilon = 1e-6);
        }
    }
    assert!(cloudalign_3d::linalg::det_mat33(r) > 0.0);
}

// Angle in radians between two rotations.
fn rotation_angle_between(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> f64 {
    let a_t = transpose(a);
    let mut rel = [[0.0; 3]; 3];
    cloudalign_3d::linalg::mat33_mul_mat33(&a_t, b, &mut rel);
    let trace = rel[0][0] + rel[1][1] + rel[2][2];
    ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
}

#[test]
fn identity() -> Result<(), Box<dyn std::error::Error>> {
    let cloud = PointCloud::from_points(make_points());
    let result = icp(&cloud, &cloud, &ICPSettings::default())?;

    let eye = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    assert_rotation_eq(&result.rotation, &eye, 1e-6);
    for t in result.translation {
        assert_relative_eq!(t, 0.0, epsilon = 1e-6);
    }
    assert!(result.error <= 1e-10);
    assert_proper_rotation(&result);
    Ok(())
}

#[test]
fn pure_translation() -> Result<(), Box<dyn std::error::Error>> {
    let target = make_points();
    let t = [2.0, -1.0, 0.5];
    let source = target
        .iter()
        .map(|p| [p[0] - t[0], p[1] - t[1], p[2] - t[2]])
        .collect::<Vec<_>>();

    let result = icp(
        &PointCloud::from_points(source),
        &PointCloud::from_points(target),
        &ICPSettings::default(),
    )?;

    for (got, expected) in result.translation.iter().zip(t.iter()) {
        assert_relative_eq!(got, expected, epsilon = 1e-4);
    }
    let eye = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    assert_rotation_eq(&result.rotation, &eye, 1e-4);
    assert_proper_rotation(&result);
    Ok(())
}

#[test]
fn pure_rotation() -> Result<(), Box<dyn std::error::Error>> {
    let target = make_points();
    let rotation = axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], std::f64::consts::PI / 6.0)?;
    let source = displace_into_source_frame(&target, &rotation, &[0.0; 3]);

    let result = icp(
        &PointCloud::from_points(source),
        &PointCloud::from_points(target),
        &ICPSettings::default(),
    )?;

    assert_rotation_eq(&result.rotation, &rotation, 1e-4);
    assert_proper_rotation(&result);
    Ok(())
}

#[test]
fn rotation_and_translation() -> Result<(), Box<dyn std::error::Error>> {
    let target = make_points();
    let rotation = axis_angle_to_rotation_matrix(&[0.0, 1.0, 0.0], std::f64::consts::PI / 8.0)?;
    let translation = [0.3, 0.2, 0.1];
    let source = displace_into_source_frame(&target, &rotation, &translation);

    let result = icp(
        &PointCloud::from_points(source),
        &PointCloud::from_points(target),
        &ICPSettings::default(),
    )?;

    assert_rotation_eq(&result.rotation, &rotation, 1e-4);
    for (got, expected) in result.translation.iter().zip(translation.iter()) {
        assert_relative_eq!(got, expected, epsilon = 1e-4);
    }
    assert_proper_rotation(&result);
    Ok(())
}

#[test]
fn similarity_with_scaling() -> Result<(), Box<dyn std::error::Error>> {
    let target = make_points();
    let scale = 1.2;
    let source = target
        .iter()
        .map(|p| [p[0] / scale, p[1] / scale, p[2] / scale])
        .collect::<Vec<_>>();

    let settings = ICPSettings {
        scaling: true,
        ..Default::default()
    };
    let result = icp(
        &PointCloud::from_points(source),
        &PointCloud::from_points(target),
        &settings,
    )?;

    assert_relative_eq!(result.scale, scale, epsilon = 1e-4);
    assert!(result.error <= 1e-6);
    assert_proper_rotation(&result);
    Ok(())
}

#[test]
fn scale_is_exactly_one_when_scaling_disabled() -> Result<(), Box<dyn std::error::Error>> {
    let target = make_points();
    let source = target
        .iter()
        .map(|p| [p[0] / 1.1, p[1] / 1.1, p[2] / 1.1])
        .collect::<Vec<_>>();

    let result = icp(
        &PointCloud::from_points(source),
        &PointCloud::from_points(target),
        &ICPSettings::default(),
    )?;

    assert_eq!(result.scale, 1.0);
    Ok(())
}

#[test]
fn returned_error_matches_transformed_source() -> Result<(), Box<dyn std::error::Error>> {
    let target = make_points();
    let rotation = axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], 0.2)?;
    let translation = [0.4, -0.1, 0.25];
    let source = displace_into_source_frame(&target, &rotation, &translation);

    let result = icp(
        &PointCloud::from_points(source.clone()),
        &PointCloud::from_points(target.clone()),
        &ICPSettings::default(),
    )?;

    // applying the returned transform to the source must reproduce the
    // reported per-correspondence mean squared error
    let mut aligned = vec![[0.0; 3]; source.len()];
    transform_points3d(
        &source,
        &result.rotation,
        &result.translation,
        result.scale,
        &mut aligned,
    );

    let mse = aligned
        .iter()
        .map(|p| {
            target
                .iter()
                .map(|q| squared_euclidean_distance(p, q))
                .fold(f64::MAX, f64::min)
        })
        .sum::<f64>()
        / aligned.len() as f64;

    assert_relative_eq!(mse, result.error, epsilon = 1e-9);
    Ok(())
}

#[test]
fn hemisphere_all_methods() -> Result<(), Box<dyn std::error::Error>> {
    let target = make_hemisphere(2.0, 10);
    let rotation = axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], std::f64::consts::PI / 12.0)?;
    let translation = [0.3, 0.2, 0.1];
    let source = displace_into_source_frame(&target, &rotation, &translation);

    let source = PointCloud::from_points(source);
    let target = PointCloud::from_points(target);

    for method in [
        ICPMethod::PointToPoint,
        ICPMethod::PointToPlane,
        ICPMethod::PlaneToPlane,
    ] {
        let settings = ICPSettings {
            method,
            max_iterations: 100,
            ..Default::default()
        };
        let result = icp(&source, &target, &settings)?;

        let one_degree = std::f64::consts::PI / 180.0;
        let angle = rotation_angle_between(&result.rotation, &rotation);
        assert!(
            angle < one_degree,
            "{method:?}: rotation off by {:.3} deg",
            angle / one_degree
        );
        for (got, expected) in result.translation.iter().zip(translation.iter()) {
            assert!(
                (got - expected).abs() < 0.01,
                "{method:?}: translation {:?} vs {:?}",
                result.translation,
                translation
            );
        }
        assert_proper_rotation(&result);
    }
    Ok(())
}
