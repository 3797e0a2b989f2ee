// src/world/mod.rs

pub mod generator;
pub mod gradient;
pub mod surface;

pub use generator::HeightFieldGenerator;
pub use gradient::GradientNoise;
pub use surface::{CubeFace, Surface};
