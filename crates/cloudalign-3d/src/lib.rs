#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Cloudalign 3D
//!
//! Shared building blocks for point cloud registration: the point cloud
//! container, similarity transform application and composition, axis-angle
//! rotations, and the plain-text `x y z` interchange format.
//!
//! ## Example: Loading a Point Cloud
//!
//! ```rust,no_run
//! use cloudalign_3d::io::xyz::read_xyz;
//!
//! let points = read_xyz("path/to/cloud.xyz")?;
//! println!("Loaded {} points", points.len());
//! # Ok::<(), cloudalign_3d::io::xyz::XyzError>(())
//! ```

/// I/O utilities for reading and writing point cloud files.
pub mod io;

/// Linear algebra utilities specialized for 3D geometry.
pub mod linalg;

/// Distance computations on 3D points.
pub mod ops;

/// Point cloud container.
pub mod pointcloud;

/// Rotation construction helpers.
pub mod transforms;

/// Conversions between plain arrays and faer matrix views.
pub mod utils;
