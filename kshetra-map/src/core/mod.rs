//! Fundamental types: poses and point clouds.

pub mod cloud;
pub mod pose;

pub use cloud::PointCloud;
pub use pose::Pose;
