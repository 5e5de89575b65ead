use cloudalign_3d::linalg;
use cloudalign_3d::pointcloud::PointCloud;

use crate::kdtree::KdTree;
use crate::normals::{estimate_normals, DEFAULT_NORMAL_NEIGHBORS};
use crate::ops;

/// Registration variant used to estimate the per-iteration transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ICPMethod {
    /// SVD-based point-to-point alignment (Besl & McKay).
    #[default]
    PointToPoint,
    /// Linearized point-to-plane alignment against target normals.
    PointToPlane,
    /// Symmetric plane-to-plane alignment using normals from both clouds.
    PlaneToPlane,
}

/// Strategy used to assign each source point its closest target point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NNMethod {
    /// Exhaustive scan over the target cloud.
    BruteForce,
    /// Query a k-d tree built once over the target cloud.
    #[default]
    KdTree,
}

/// Structure to define the ICP parameters.
#[derive(Debug, Clone)]
pub struct ICPSettings {
    /// Registration variant.
    pub method: ICPMethod,
    /// Correspondence search strategy.
    pub nn_method: NNMethod,
    /// Estimate the rotation component. Only honored by point-to-point.
    pub rotation: bool,
    /// Estimate the translation component. Only honored by point-to-point.
    pub translation: bool,
    /// Estimate a uniform similarity scale. Only honored by point-to-point.
    pub scaling: bool,
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance as the difference in mean squared error between
    /// two consecutive iterations.
    pub tolerance: f64,
}

impl Default for ICPSettings {
    fn default() -> Self {
        Self {
            method: ICPMethod::default(),
            nn_method: NNMethod::default(),
            rotation: true,
            translation: true,
            scaling: false,
            max_iterations: 50,
            tolerance: 1e-6,
        }
    }
}

/// Result of the ICP algorithm.
///
/// The transformation maps the source onto the target frame as
/// `p' = scale * rotation * p + translation`.
#[derive(Debug, Clone)]
pub struct ICPResult {
    /// Estimated rotation matrix. Always a proper rotation.
    pub rotation: [[f64; 3]; 3],
    /// Estimated translation vector.
    pub translation: [f64; 3],
    /// Estimated uniform scale. `1.0` unless scaling was enabled.
    pub scale: f64,
    /// The number of accumulation steps performed. Equal to
    /// `max_iterations` when the iteration cap was hit before convergence.
    pub iterations: usize,
    /// Last computed mean squared correspondence error.
    pub error: f64,
}

/// Per-iteration observation passed to the registration observer.
///
/// The borrowed views are only valid during the observer call; an observer
/// that retains them across iterations must copy them first.
#[derive(Debug)]
pub struct IterationSnapshot<'a> {
    /// Zero-based index of the completed iteration.
    pub iteration: usize,
    /// Mean squared correspondence error computed at the start of the
    /// iteration.
    pub error: f64,
    /// The working source after the iteration's transform was applied.
    pub points: &'a [[f64; 3]],
    /// For each working-source point, the index of its closest target point.
    pub correspondences: &'a [usize],
}

/// Error types for the registration module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ICPError {
    /// Registration requires non-empty source and target clouds
    #[error("cannot register empty point clouds")]
    EmptyPointCloud,

    /// Supplied target normals do not match the target cloud length
    #[error("normals length ({normals_len}) does not match cloud length ({cloud_len})")]
    NormalsLengthMismatch {
        /// Number of supplied normals.
        normals_len: usize,
        /// Number of points in the cloud the normals were supplied for.
        cloud_len: usize,
    },
}

/// Iterative Closest Point registration of `source` onto `target`.
///
/// Each iteration assigns every working-source point its nearest target
/// point, estimates an incremental transform with the configured method,
/// composes it into the accumulated result and applies it to the working
/// copy. The loop stops when the change in mean squared error drops below
/// `settings.tolerance` or after `settings.max_iterations` steps.
///
/// For the plane-based methods, target normals are taken from
/// `target.normals()` when present and estimated once from the target
/// otherwise. Source normals are always re-estimated from the moving working
/// copy, so normals attached to `source` are ignored.
///
/// Numerical degeneracies (coincident points, rank-deficient normal
/// equations) never fail the call; the affected iteration contributes a
/// best-effort (possibly identity) step instead.
///
/// # Arguments
///
/// * `source` - Source point cloud.
/// * `target` - Target point cloud. Must outlive the call; it backs the
///   correspondence search structure.
/// * `settings` - Registration parameters.
///
/// # Returns
///
/// * `result` - Accumulated rotation, translation and scale with the final
///   iteration count and error.
///
/// # Errors
///
/// Returns an error when either cloud is empty, or when target normals are
/// supplied with a length different from the target cloud.
pub fn icp(
    source: &PointCloud,
    target: &PointCloud,
    settings: &ICPSettings,
) -> Result<ICPResult, ICPError> {
    run_icp(source, target, settings, None)
}

/// Iterative Closest Point registration with a per-iteration observer.
///
/// Behaves exactly like [`icp`], additionally invoking `observer` after each
/// completed accumulation step with a consistent snapshot of the working
/// source and the iteration's correspondences. The observer runs inline on
/// the caller's thread.
pub fn icp_with_observer(
    source: &PointCloud,
    target: &PointCloud,
    settings: &ICPSettings,
    observer: &mut dyn FnMut(&IterationSnapshot<'_>),
) -> Result<ICPResult, ICPError> {
    run_icp(source, target, settings, Some(observer))
}

fn run_icp(
    source: &PointCloud,
    target: &PointCloud,
    settings: &ICPSettings,
    mut observer: Option<&mut dyn FnMut(&IterationSnapshot<'_>)>,
) -> Result<ICPResult, ICPError> {
    if source.is_empty() || target.is_empty() {
        return Err(ICPError::EmptyPointCloud);
    }

    let needs_normals = matches!(
        settings.method,
        ICPMethod::PointToPlane | ICPMethod::PlaneToPlane
    );

    // target normals are fixed for the whole call; estimate them once when
    // the caller did not supply any
    let target_normals = if needs_normals {
        match target.normals() {
            Some(normals) => {
                if normals.len() != target.len() {
                    return Err(ICPError::NormalsLengthMismatch {
                        normals_len: normals.len(),
                        cloud_len: target.len(),
                    });
                }
                normals.to_vec()
            }
            None => estimate_normals(target.points(), DEFAULT_NORMAL_NEIGHBORS),
        }
    } else {
        Vec::new()
    };

    let mut result = ICPResult {
        rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.0; 3],
        scale: 1.0,
        iterations: 0,
        error: 0.0,
    };

    // built once per call; borrows the target until the call returns
    let tree = match settings.nn_method {
        NNMethod::KdTree => Some(KdTree::new(target.points())),
        NNMethod::BruteForce => None,
    };

    let mut current = source.points().to_vec();
    let mut prev_error = f64::INFINITY;

    for iter in 0..settings.max_iterations {
        let correspondences = match &tree {
            Some(tree) => ops::find_correspondences_kdtree(&current, tree),
            None => ops::find_correspondences_brute(&current, target.points()),
        };

        let error = ops::mean_squared_error(&current, target.points(), &correspondences);

        if (prev_error - error).abs() < settings.tolerance {
            // no transform is composed this cycle, so the count keeps the
            // number of completed accumulation steps
            result.error = error;
            result.iterations = iter;
            log::debug!("converged after {} iterations with error {:.3e}", iter, error);
            return Ok(result);
        }
        prev_error = error;

        let mut r_delta = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let mut t_delta = [0.0; 3];
        let mut s_delta = 1.0;

        match settings.method {
            ICPMethod::PointToPoint => ops::fit_transformation(
                &current,
                target.points(),
                &correspondences,
                settings,
                &mut r_delta,
                &mut t_delta,
                &mut s_delta,
            ),
            ICPMethod::PointToPlane => ops::fit_transformation_point_to_plane(
                &current,
                target.points(),
                &correspondences,
                &target_normals,
                &mut r_delta,
                &mut t_delta,
            ),
            ICPMethod::PlaneToPlane => {
                // the working source moves every iteration, so its normals
                // are re-estimated from the current positions
                let src_normals = estimate_normals(&current, DEFAULT_NORMAL_NEIGHBORS);
                ops::fit_transformation_plane_to_plane(
                    &current,
                    target.points(),
                    &correspondences,
                    &src_normals,
                    &target_normals,
                    &mut r_delta,
                    &mut t_delta,
                );
            }
        }

        // compose the increment into the accumulated transform:
        // R <- dR * R, t <- ds * dR * t + dt, s <- s * ds
        let mut rotation = [[0.0; 3]; 3];
        linalg::mat33_mul_mat33(&r_delta, &result.rotation, &mut rotation);
        result.rotation = rotation;

        let mut rotated_t = [0.0; 3];
        linalg::mat33_mul_vec3(&r_delta, &result.translation, &mut rotated_t);
        for i in 0..3 {
            result.translation[i] = s_delta * rotated_t[i] + t_delta[i];
        }
        result.scale *= s_delta;

        // advance the working copy
        let mut transformed = vec![[0.0; 3]; current.len()];
        linalg::transform_points3d(&current, &r_delta, &t_delta, s_delta, &mut transformed);
        current = transformed;

        result.iterations = iter + 1;
        result.error = error;

        log::debug!("iteration {}: error {:.3e}", iter, error);

        if let Some(ref mut observer) = observer {
            observer(&IterationSnapshot {
                iteration: iter,
                error,
                points: &current,
                correspondences: &correspondences,
            });
        }
    }

    Ok(result)
}
