// src/heightmap/mips.rs
use glam::UVec2;

use super::sampling::SampledHeightMap;

/// Per-depth (min, max) over the quadtree cells a heightmap serves.
///
/// Depth `d` has `2^d` cells per side, each covering `resolution >> d`
/// heightmap cells (texel ranges inclusive on both ends, so neighbours share
/// their edge texels).
pub struct ExtentPyramid {
    pub depths: u32,
    pub min_levels: Vec<Vec<f32>>,
    pub max_levels: Vec<Vec<f32>>,
}

impl ExtentPyramid {
    /// Scan the finest depth from the raw buffer, then fold upward.
    pub fn build(map: &SampledHeightMap, span: u32) -> Self {
        let resolution = map.texels() - 1;
        debug_assert!(resolution % (1 << span) == 0);

        let side = 1u32 << span;
        let cell = resolution >> span;

        let mut mn = Vec::with_capacity((side * side) as usize);
        let mut mx = Vec::with_capacity((side * side) as usize);
        for y in 0..side {
            for x in 0..side {
                let (lo, hi) = map.area_extents(UVec2::new(x, y) * cell, cell);
                mn.push(lo);
                mx.push(hi);
            }
        }

        // Index 0 ends up being depth 0 after the reverse below.
        let mut min_levels = vec![mn];
        let mut max_levels = vec![mx];

        let mut cur_side = side;
        while cur_side > 1 {
            let next_side = cur_side / 2;
            let mut mn = vec![0.0f32; (next_side * next_side) as usize];
            let mut mx = vec![0.0f32; (next_side * next_side) as usize];

            let cur_min = &min_levels[min_levels.len() - 1];
            let cur_max = &max_levels[max_levels.len() - 1];

            for z in 0..next_side {
                for x in 0..next_side {
                    let i00 = ((2 * z) * cur_side + (2 * x)) as usize;
                    let i10 = i00 + 1;
                    let i01 = i00 + cur_side as usize;
                    let i11 = i01 + 1;

                    let o = (z * next_side + x) as usize;
                    mn[o] = cur_min[i00].min(cur_min[i10]).min(cur_min[i01]).min(cur_min[i11]);
                    mx[o] = cur_max[i00].max(cur_max[i10]).max(cur_max[i01]).max(cur_max[i11]);
                }
            }

            min_levels.push(mn);
            max_levels.push(mx);
            cur_side = next_side;
        }

        min_levels.reverse();
        max_levels.reverse();

        Self {
            depths: span + 1,
            min_levels,
            max_levels,
        }
    }

    /// `cell` is in units of depth-`depth` cells.
    #[inline]
    pub fn query(&self, depth: u32, cell: UVec2) -> (f32, f32) {
        debug_assert!(depth < self.depths);
        let side = 1u32 << depth;
        debug_assert!(cell.x < side && cell.y < side);

        let idx = (cell.y * side + cell.x) as usize;
        (
            self.min_levels[depth as usize][idx],
            self.max_levels[depth as usize][idx],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::heightmap::HeightMapDesc;
    use crate::world::{HeightFieldGenerator, Surface};
    use glam::Vec2;

    #[test]
    fn every_depth_matches_a_direct_scan() {
        let gen = HeightFieldGenerator::new(&GeneratorConfig {
            seed: Some(9),
            octaves: 6,
            ..Default::default()
        })
        .unwrap();
        let map = SampledHeightMap::generate(
            &gen,
            HeightMapDesc {
                origin: Vec2::new(100.0, -50.0),
                size: 256.0,
                resolution: 32,
                surface: Surface::Plane,
            },
        )
        .unwrap();

        let pyr = ExtentPyramid::build(&map, 3);
        assert_eq!(pyr.depths, 4);
        for depth in 0..=3u32 {
            let side = 1u32 << depth;
            let cell = 32 >> depth;
            for y in 0..side {
                for x in 0..side {
                    let expect = map.area_extents(UVec2::new(x, y) * cell, cell);
                    assert_eq!(pyr.query(depth, UVec2::new(x, y)), expect, "d{depth} ({x},{y})");
                }
            }
        }
    }
}
