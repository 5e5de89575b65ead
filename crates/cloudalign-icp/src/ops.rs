use nalgebra::{Matrix6, Vector6};

use cloudalign_3d::linalg;
use cloudalign_3d::ops::squared_euclidean_distance;
use cloudalign_3d::utils;

use crate::icp::ICPSettings;
use crate::kdtree::KdTree;

/// Compute the point-to-point transformation between two point clouds with
/// known correspondences (Besl-McKay / orthogonal Procrustes).
///
/// `correspondences[i]` names the point in `points_in_dst` paired with
/// `points_in_src[i]`. The estimated rotation, translation and scale are
/// gated by the `rotation`/`translation`/`scaling` settings; disabled
/// components are left at identity.
pub(crate) fn fit_transformation(
    points_in_src: &[[f64; 3]],
    points_in_dst: &[[f64; 3]],
    correspondences: &[usize],
    settings: &ICPSettings,
    dst_r_src: &mut [[f64; 3]; 3],
    dst_t_src: &mut [f64; 3],
    scale: &mut f64,
) {
    assert_eq!(points_in_src.len(), correspondences.len());

    *dst_r_src = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    *dst_t_src = [0.0; 3];
    *scale = 1.0;

    let (src_centroid, dst_centroid) =
        compute_centroids(points_in_src, points_in_dst, correspondences);

    if settings.rotation {
        // cross-covariance H = sum_i (s_i - mu_s) * (t_c(i) - mu_t)^T
        let mut hh = [[0.0; 3]; 3];
        for (p_in_src, &corr) in points_in_src.iter().zip(correspondences.iter()) {
            let p_in_dst = &points_in_dst[corr];
            for r in 0..3 {
                for c in 0..3 {
                    hh[r][c] += (p_in_src[r] - src_centroid[r]) * (p_in_dst[c] - dst_centroid[c]);
                }
            }
        }

        let hh_mat = utils::array33_to_faer_mat33(&hh).to_owned();
        let svd = hh_mat.svd();
        let (u_t, v) = (svd.u().transpose(), svd.v());

        // compute rotation matrix R = V * U^T
        {
            let mut rr = utils::array33_to_faer_mat33_mut(dst_r_src);
            faer::linalg::matmul::matmul(&mut rr, v, u_t, None, 1.0, faer::Parallelism::None);
        }

        // fix the determinant of R in case it is negative as it's a reflection matrix
        if linalg::det_mat33(dst_r_src) < 0.0 {
            log::warn!("det(R) < 0, flipping the last column of V");
            let v_neg = {
                let mut v_neg = v.to_owned();
                v_neg.col_mut(2).copy_from(-v.col(2));
                v_neg
            };
            let mut rr = utils::array33_to_faer_mat33_mut(dst_r_src);
            faer::linalg::matmul::matmul(&mut rr, &v_neg, u_t, None, 1.0, faer::Parallelism::None);
        }

        if settings.scaling {
            let (mut num, mut den) = (0.0, 0.0);
            for (p_in_src, &corr) in points_in_src.iter().zip(correspondences.iter()) {
                let p_in_dst = &points_in_dst[corr];
                let d_src = [
                    p_in_src[0] - src_centroid[0],
                    p_in_src[1] - src_centroid[1],
                    p_in_src[2] - src_centroid[2],
                ];
                let d_dst = [
                    p_in_dst[0] - dst_centroid[0],
                    p_in_dst[1] - dst_centroid[1],
                    p_in_dst[2] - dst_centroid[2],
                ];
                let mut rd_src = [0.0; 3];
                linalg::mat33_mul_vec3(dst_r_src, &d_src, &mut rd_src);
                num += linalg::dot_product3(&d_dst, &rd_src);
                den += linalg::dot_product3(&d_src, &d_src);
            }
            if den > 0.0 {
                *scale = num / den;
            }
        }
    }

    if settings.translation {
        // t = mu_t - s * R * mu_s
        let mut r_src_centroid = [0.0; 3];
        linalg::mat33_mul_vec3(dst_r_src, &src_centroid, &mut r_src_centroid);
        for i in 0..3 {
            dst_t_src[i] = dst_centroid[i] - *scale * r_src_centroid[i];
        }
    }
}

/// Compute the point-to-plane transformation between two point clouds.
///
/// Minimizes `sum_i ((R * s_i + t - t_c(i)) . n_c(i))^2` under the
/// small-angle approximation, where `n` are the target normals.
pub(crate) fn fit_transformation_point_to_plane(
    points_in_src: &[[f64; 3]],
    points_in_dst: &[[f64; 3]],
    correspondences: &[usize],
    dst_normals: &[[f64; 3]],
    dst_r_src: &mut [[f64; 3]; 3],
    dst_t_src: &mut [f64; 3],
) {
    assert_eq!(points_in_src.len(), correspondences.len());

    let mut ata = Matrix6::<f64>::zeros();
    let mut atb = Vector6::<f64>::zeros();

    for (p_in_src, &corr) in points_in_src.iter().zip(correspondences.iter()) {
        accumulate_plane_residual(
            p_in_src,
            &points_in_dst[corr],
            &dst_normals[corr],
            &mut ata,
            &mut atb,
        );
    }

    solve_small_angle_step(ata, atb, dst_r_src, dst_t_src);
}

/// Compute the symmetric plane-to-plane transformation between two point
/// clouds.
///
/// Same machinery as point-to-plane, but each residual is measured along the
/// blended normal `normalize(n_src + n_dst)`. Since PCA normals carry an
/// arbitrary sign, a near-opposite pair would cancel; in that case the source
/// normal is flipped before blending and the correspondence is kept.
pub(crate) fn fit_transformation_plane_to_plane(
    points_in_src: &[[f64; 3]],
    points_in_dst: &[[f64; 3]],
    correspondences: &[usize],
    src_normals: &[[f64; 3]],
    dst_normals: &[[f64; 3]],
    dst_r_src: &mut [[f64; 3]; 3],
    dst_t_src: &mut [f64; 3],
) {
    assert_eq!(points_in_src.len(), correspondences.len());
    assert_eq!(points_in_src.len(), src_normals.len());

    let mut ata = Matrix6::<f64>::zeros();
    let mut atb = Vector6::<f64>::zeros();

    for (i, (p_in_src, &corr)) in points_in_src.iter().zip(correspondences.iter()).enumerate() {
        let n_src = &src_normals[i];
        let n_dst = &dst_normals[corr];

        let mut blended = [
            n_src[0] + n_dst[0],
            n_src[1] + n_dst[1],
            n_src[2] + n_dst[2],
        ];
        if linalg::dot_product3(&blended, &blended) < 1e-20 {
            blended = [
                n_dst[0] - n_src[0],
                n_dst[1] - n_src[1],
                n_dst[2] - n_src[2],
            ];
        }
        let inv_norm = 1.0 / linalg::dot_product3(&blended, &blended).sqrt();
        for b in blended.iter_mut() {
            *b *= inv_norm;
        }

        accumulate_plane_residual(p_in_src, &points_in_dst[corr], &blended, &mut ata, &mut atb);
    }

    solve_small_angle_step(ata, atb, dst_r_src, dst_t_src);
}

// One row of the linearized plane system: a = [s x n, n], b = (t - s) . n
fn accumulate_plane_residual(
    s: &[f64; 3],
    t: &[f64; 3],
    n: &[f64; 3],
    ata: &mut Matrix6<f64>,
    atb: &mut Vector6<f64>,
) {
    let mut s_cross_n = [0.0; 3];
    linalg::cross_vec3(s, n, &mut s_cross_n);

    let a = Vector6::new(s_cross_n[0], s_cross_n[1], s_cross_n[2], n[0], n[1], n[2]);
    let b = (t[0] - s[0]) * n[0] + (t[1] - s[1]) * n[1] + (t[2] - s[2]) * n[2];

    *ata += a * a.transpose();
    *atb += a * b;
}

// Solve the 6x6 normal equations for x = [rx, ry, rz, tx, ty, tz] and build
// the orthonormalized small-angle rotation. A degenerate system yields the
// identity step so the registration loop can continue.
fn solve_small_angle_step(
    mut ata: Matrix6<f64>,
    atb: Vector6<f64>,
    dst_r_src: &mut [[f64; 3]; 3],
    dst_t_src: &mut [f64; 3],
) {
    *dst_r_src = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    *dst_t_src = [0.0; 3];

    // the normal equations are symmetric positive semi-definite, but flat
    // regions leave tangent directions unconstrained; damp the diagonal so
    // the factorization also succeeds on rank-deficient systems
    let diag_max = (0..6).map(|i| ata[(i, i)].abs()).fold(0.0_f64, f64::max);
    let lambda = 1e-6 * diag_max.max(1e-12);
    for i in 0..6 {
        ata[(i, i)] += lambda;
    }

    let x = match ata.cholesky() {
        Some(chol) => chol.solve(&atb),
        None => match ata.lu().solve(&atb) {
            Some(x) => x,
            None => return,
        },
    };

    let (rx, ry, rz) = (x[0], x[1], x[2]);
    *dst_t_src = [x[3], x[4], x[5]];
    *dst_r_src = [[1.0, -rz, ry], [rz, 1.0, -rx], [-ry, rx, 1.0]];

    orthonormalize_rotation(dst_r_src);
}

/// Project a near-rotation matrix onto SO(3) through its SVD: R = U * V^T,
/// flipping the last column of U when the product would be a reflection.
pub(crate) fn orthonormalize_rotation(rotation: &mut [[f64; 3]; 3]) {
    let r_mat = utils::array33_to_faer_mat33(rotation).to_owned();
    let svd = r_mat.svd();
    let (u, v_t) = (svd.u(), svd.v().transpose());

    {
        let mut rr = utils::array33_to_faer_mat33_mut(rotation);
        faer::linalg::matmul::matmul(&mut rr, u, v_t, None, 1.0, faer::Parallelism::None);
    }

    if linalg::det_mat33(rotation) < 0.0 {
        let u_neg = {
            let mut u_neg = u.to_owned();
            u_neg.col_mut(2).copy_from(-u.col(2));
            u_neg
        };
        let mut rr = utils::array33_to_faer_mat33_mut(rotation);
        faer::linalg::matmul::matmul(&mut rr, &u_neg, v_t, None, 1.0, faer::Parallelism::None);
    }
}

/// Assign each source point the index of its nearest target point, through
/// the prebuilt k-d tree.
pub(crate) fn find_correspondences_kdtree(source: &[[f64; 3]], tree: &KdTree<'_>) -> Vec<usize> {
    source.iter().map(|p| tree.nearest(p)).collect()
}

/// Assign each source point the index of its nearest target point by
/// exhaustive scan.
pub(crate) fn find_correspondences_brute(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
) -> Vec<usize> {
    source
        .iter()
        .map(|p| {
            let mut best_index = 0;
            let mut best_sq_dist = f64::MAX;
            for (j, q) in target.iter().enumerate() {
                let sq_dist = squared_euclidean_distance(p, q);
                if sq_dist < best_sq_dist {
                    best_sq_dist = sq_dist;
                    best_index = j;
                }
            }
            best_index
        })
        .collect()
}

/// Mean squared distance between the source points and their assigned target
/// points.
pub(crate) fn mean_squared_error(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    correspondences: &[usize],
) -> f64 {
    let sum = source
        .iter()
        .zip(correspondences.iter())
        .map(|(p, &c)| squared_euclidean_distance(p, &target[c]))
        .sum::<f64>();
    sum / source.len() as f64
}

// Centroid of the source points and of the correspondence-picked target
// points.
fn compute_centroids(
    points_in_src: &[[f64; 3]],
    points_in_dst: &[[f64; 3]],
    correspondences: &[usize],
) -> ([f64; 3], [f64; 3]) {
    let mut src_centroid = [0.0; 3];
    let mut dst_centroid = [0.0; 3];

    for (p_in_src, &corr) in points_in_src.iter().zip(correspondences.iter()) {
        let p_in_dst = &points_in_dst[corr];
        for a in 0..3 {
            src_centroid[a] += p_in_src[a];
            dst_centroid[a] += p_in_dst[a];
        }
    }

    let inv_len = 1.0 / points_in_src.len() as f64;
    for a in 0..3 {
        src_centroid[a] *= inv_len;
        dst_centroid[a] *= inv_len;
    }

    (src_centroid, dst_centroid)
}
