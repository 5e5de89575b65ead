#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Iterative Closest Point (ICP) Registration
//!
//! Point cloud registration by alternating minimization: assign
//! correspondences, estimate a transform, apply it, repeat.
//!
//! # Algorithm
//!
//! 1. Find nearest neighbors between the working source and the target
//! 2. Estimate an incremental transform with the selected method
//!    (point-to-point, point-to-plane or symmetric plane-to-plane)
//! 3. Compose the increment into the accumulated result and apply it to the
//!    working source
//! 4. Repeat until the error change drops below tolerance or the iteration
//!    cap is reached
//!
//! # Examples
//!
//! ```
//! use cloudalign_3d::pointcloud::PointCloud;
//! use cloudalign_icp::{icp, ICPSettings};
//!
//! let target = PointCloud::from_points(vec![
//!     [0.0, 0.0, 0.0],
//!     [1.0, 0.0, 0.0],
//!     [0.0, 1.0, 0.0],
//!     [0.0, 0.0, 1.0],
//! ]);
//! let source = PointCloud::from_points(
//!     target.points().iter().map(|p| [p[0] - 0.1, p[1], p[2]]).collect(),
//! );
//!
//! let result = icp(&source, &target, &ICPSettings::default())?;
//! assert!(result.error < 1e-6);
//! # Ok::<(), cloudalign_icp::ICPError>(())
//! ```

mod icp;
pub use icp::*;

/// Nearest-neighbor search structure for correspondence queries.
pub mod kdtree;

/// Surface normal estimation from local covariance.
pub mod normals;

/// Internal operations for ICP computation.
mod ops;
