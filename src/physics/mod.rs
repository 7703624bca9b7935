//! CPU heightfields for collision near the camera

pub mod shape;
pub mod streaming;

pub use shape::{read_shape, write_shape, HeightfieldShape, SharedHeightfield};
pub use streaming::{PhysicsStats, PhysicsStreamer};
