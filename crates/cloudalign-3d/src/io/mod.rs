/// Plain-text `x y z` point cloud format.
pub mod xyz;
