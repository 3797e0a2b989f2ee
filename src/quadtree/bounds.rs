// src/quadtree/bounds.rs
use glam::{Vec2, Vec3};

use crate::world::Surface;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for p in points {
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    /// Squared distance from `p` to the nearest point of the box (0 inside).
    #[inline]
    pub fn distance_sq(&self, p: Vec3) -> f32 {
        let d = (self.min - p).max(p - self.max).max(Vec3::ZERO);
        d.length_squared()
    }
}

/// World-space box around a square patch of `surface` whose heights lie in
/// `[min_h, max_h]`.
///
/// On a cube face the box encloses a grid of projected probes at both height
/// extremes, padded by the sagitta of the widest grid cell so the curved
/// surface between probes stays inside.
pub fn patch_bounds(surface: &Surface, origin: Vec2, size: f32, min_h: f32, max_h: f32) -> Aabb {
    match *surface {
        Surface::Plane => Aabb {
            min: Vec3::new(origin.x, min_h, origin.y),
            max: Vec3::new(origin.x + size, max_h, origin.y + size),
        },
        Surface::CubeFace { face, radius, face_size } => {
            let n = FACE_PROBES + 1;
            let step = size / FACE_PROBES as f32;
            let dir = |i: u32, j: u32| {
                let local = origin + Vec2::new(i as f32, j as f32) * step;
                face.direction(local / face_size * 2.0 - Vec2::ONE)
            };

            let mut dirs = Vec::with_capacity((n * n) as usize);
            for j in 0..n {
                for i in 0..n {
                    dirs.push(dir(i, j));
                }
            }

            // Widest angle across any cell, both diagonals.
            let mut min_cos = 1.0f32;
            for j in 0..FACE_PROBES {
                for i in 0..FACE_PROBES {
                    let at = |x: u32, y: u32| dirs[(y * n + x) as usize];
                    min_cos = min_cos
                        .min(at(i, j).dot(at(i + 1, j + 1)))
                        .min(at(i + 1, j).dot(at(i, j + 1)));
                }
            }
            let half_angle = min_cos.clamp(-1.0, 1.0).acos() * 0.5;
            let outer = (radius + min_h).abs().max((radius + max_h).abs());
            let pad = outer * (1.0 - half_angle.cos());

            let b = Aabb::from_points(dirs.iter().flat_map(|&d| {
                [d * (radius + min_h), d * (radius + max_h)]
            }));
            Aabb {
                min: b.min - Vec3::splat(pad),
                max: b.max + Vec3::splat(pad),
            }
        }
    }
}

// Probe intervals per side of a cube-face patch.
const FACE_PROBES: u32 = 4;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::CubeFace;

    #[test]
    fn distance_is_zero_inside_and_axis_aligned_outside() {
        let b = Aabb { min: Vec3::ZERO, max: Vec3::splat(10.0) };
        assert_eq!(b.distance_sq(Vec3::splat(5.0)), 0.0);
        assert_eq!(b.distance_sq(Vec3::new(13.0, 5.0, 5.0)), 9.0);
        assert_eq!(b.distance_sq(Vec3::new(-3.0, 14.0, 5.0)), 25.0);
    }

    #[test]
    fn planar_box_spans_heights() {
        let b = patch_bounds(&Surface::Plane, Vec2::new(8.0, -8.0), 4.0, -1.0, 2.0);
        assert_eq!(b.min, Vec3::new(8.0, -1.0, -8.0));
        assert_eq!(b.max, Vec3::new(12.0, 2.0, -4.0));
    }

    #[test]
    fn face_box_contains_the_centre_point() {
        let s = Surface::CubeFace { face: CubeFace::PosY, radius: 100.0, face_size: 64.0 };
        let b = patch_bounds(&s, Vec2::ZERO, 64.0, 0.0, 5.0);
        assert_eq!(b.distance_sq(Vec3::new(0.0, 102.0, 0.0)), 0.0);
        assert!(b.max.y >= 105.0 - 1e-3);
    }

    #[test]
    fn face_box_reaches_the_bulging_edges() {
        let s = Surface::CubeFace { face: CubeFace::PosY, radius: 500.0, face_size: 64.0 };
        let b = patch_bounds(&s, Vec2::ZERO, 64.0, -1.0, 1.0);
        // Shared PosY/PosX edge midpoint, on the surface.
        let edge = Vec3::new(1.0, 1.0, 0.0).normalize() * 500.0;
        assert_eq!(b.distance_sq(edge), 0.0);
        assert!(b.max.x >= 500.0 * std::f32::consts::FRAC_1_SQRT_2);
    }

    #[test]
    fn face_box_encloses_every_surface_point() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(17);
        for face in CubeFace::ALL {
            let s = Surface::CubeFace { face, radius: 500.0, face_size: 64.0 };
            for &(origin, size) in &[(Vec2::ZERO, 64.0f32), (Vec2::new(32.0, 16.0), 16.0), (Vec2::new(56.0, 0.0), 8.0)] {
                let b = patch_bounds(&s, origin, size, -3.0, 4.0);
                for _ in 0..500 {
                    let local = origin + Vec2::new(rng.gen_range(0.0..=size), rng.gen_range(0.0..=size));
                    let p = s.world_point(local, rng.gen_range(-3.0f32..=4.0));
                    assert!(b.distance_sq(p) < 1e-6, "{face:?} {origin} {size}: {p} outside {b:?}");
                }
            }
        }
    }
}
