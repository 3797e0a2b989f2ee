// src/world/surface.rs
//
// Maps local 2D node coordinates onto the terrain surface: either the XZ
// plane, or one face of a cube projected onto a sphere.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::world::HeightFieldGenerator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// (normal, u axis, v axis); u x v points along the normal.
    #[inline]
    pub fn basis(self) -> (Vec3, Vec3, Vec3) {
        match self {
            CubeFace::PosX => (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            CubeFace::NegX => (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            CubeFace::PosY => (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            CubeFace::NegY => (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            CubeFace::PosZ => (Vec3::Z, Vec3::X, Vec3::Y),
            CubeFace::NegZ => (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        }
    }

    /// Unit-sphere direction for face coordinates in `[-1, 1]^2`.
    #[inline]
    pub fn direction(self, st: Vec2) -> Vec3 {
        let (n, u, v) = self.basis();
        (n + u * st.x + v * st.y).normalize()
    }
}

/// Where a heightmap or node lives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Surface {
    /// Local (x, y) is world (x, z); height goes along +Y.
    Plane,
    /// Local coordinates in `[0, face_size]^2` cover the whole face.
    CubeFace { face: CubeFace, radius: f32, face_size: f32 },
}

impl Surface {
    #[inline]
    pub fn sample(&self, gen: &HeightFieldGenerator, local: Vec2) -> f32 {
        match *self {
            Surface::Plane => gen.sample(local.x, local.y),
            Surface::CubeFace { face, radius, face_size } => {
                let d = face.direction(local / face_size * 2.0 - Vec2::ONE);
                let p = d * radius;
                gen.sample3(p.x, p.y, p.z)
            }
        }
    }

    /// World-space point at `local` lifted by `height`.
    #[inline]
    pub fn world_point(&self, local: Vec2, height: f32) -> Vec3 {
        match *self {
            Surface::Plane => Vec3::new(local.x, height, local.y),
            Surface::CubeFace { face, radius, face_size } => {
                face.direction(local / face_size * 2.0 - Vec2::ONE) * (radius + height)
            }
        }
    }

    /// Rough world-space length of one local unit, used for normal estimation.
    #[inline]
    pub fn unit_length(&self) -> f32 {
        match *self {
            Surface::Plane => 1.0,
            // Face spans a quarter great circle.
            Surface::CubeFace { radius, face_size, .. } => {
                radius * std::f32::consts::FRAC_PI_2 / face_size
            }
        }
    }
}
