use nalgebra::Matrix3;

use crate::kdtree::KdTree;

/// Default neighborhood size for normal estimation.
pub const DEFAULT_NORMAL_NEIGHBORS: usize = 10;

/// Estimate per-point surface normals from local covariance.
///
/// For every point, its `k` nearest neighbors (the point itself included) are
/// gathered through a temporary k-d tree, and the normal is taken as the
/// eigenvector associated with the smallest eigenvalue of the neighborhood
/// covariance matrix.
///
/// The sign of the returned normals is arbitrary: PCA determines the surface
/// direction only up to reflection. Consumers must be sign-insensitive.
///
/// # Arguments
///
/// * `points` - The point cloud to estimate normals for.
/// * `k` - Neighborhood size. When fewer than `k` points exist, all of them
///   are used.
///
/// # Returns
///
/// One unit normal per input point, sharing indices with `points`.
pub fn estimate_normals(points: &[[f64; 3]], k: usize) -> Vec<[f64; 3]> {
    let tree = KdTree::new(points);

    points
        .iter()
        .map(|point| {
            let neighbors = tree.k_nearest(point, k);

            let mut centroid = [0.0; 3];
            for &idx in &neighbors {
                for a in 0..3 {
                    centroid[a] += points[idx][a];
                }
            }
            let inv_len = 1.0 / neighbors.len() as f64;
            for c in centroid.iter_mut() {
                *c *= inv_len;
            }

            let mut cov = [[0.0; 3]; 3];
            for &idx in &neighbors {
                let d = [
                    points[idx][0] - centroid[0],
                    points[idx][1] - centroid[1],
                    points[idx][2] - centroid[2],
                ];
                for r in 0..3 {
                    for c in 0..3 {
                        cov[r][c] += d[r] * d[c];
                    }
                }
            }

            let cov = Matrix3::new(
                cov[0][0], cov[0][1], cov[0][2], //
                cov[1][0], cov[1][1], cov[1][2], //
                cov[2][0], cov[2][1], cov[2][2],
            );
            let eig = cov.symmetric_eigen();

            // the eigenvector of the smallest eigenvalue spans the direction
            // of least variance, i.e. the surface normal
            let mut smallest = 0;
            for i in 1..3 {
                if eig.eigenvalues[i] < eig.eigenvalues[smallest] {
                    smallest = i;
                }
            }
            let normal = eig.eigenvectors.column(smallest).normalize();
            [normal[0], normal[1], normal[2]]
        })
        .collect()
}
