// src/heightmap/mod.rs
//
// Cached samplings of the height field. A map goes through two states:
//
//   SampledHeightMap  raw f32 samples, area min/max queries, byte encoding
//        | clean_up(span, sink)
//        v
//   HeightMap         uploaded textures + precomputed node extents only
//
// Quadtree nodes hold `Arc<HeightMap>`; the last drop releases the textures.

pub mod mips;
pub mod registry;
pub mod sampling;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use glam::{UVec2, Vec2};

use crate::gpu::{HeightMapTextures, TextureSink};
use crate::world::Surface;

pub use mips::ExtentPyramid;
pub use registry::{live_count, lookup};
pub use sampling::SampledHeightMap;

static NEXT_INDEX: AtomicU32 = AtomicU32::new(1);

fn next_index() -> u32 {
    NEXT_INDEX.fetch_add(1, Ordering::Relaxed)
}

/// Square region to sample, in the surface's local coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightMapDesc {
    pub origin: Vec2,
    pub size: f32,
    /// Cells per side; texels per side = resolution + 1.
    pub resolution: u32,
    pub surface: Surface,
}

pub struct HeightMap {
    index: u32,
    desc: HeightMapDesc,
    texels: u32,
    extents: ExtentPyramid,
    textures: HeightMapTextures,
    sink: Arc<dyn TextureSink>,
}

impl HeightMap {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn desc(&self) -> &HeightMapDesc {
        &self.desc
    }

    pub fn texels(&self) -> u32 {
        self.texels
    }

    pub fn textures(&self) -> HeightMapTextures {
        self.textures
    }

    /// Depths covered by `extents`.
    pub fn depths(&self) -> u32 {
        self.extents.depths
    }

    /// (min, max) height of the quadtree cell `cell` at `depth` below the
    /// node that sampled this map.
    #[inline]
    pub fn extents(&self, depth: u32, cell: UVec2) -> (f32, f32) {
        self.extents.query(depth, cell)
    }

    /// (u0, v0, du, dv) of that cell inside the texture, texel-centred.
    pub fn uv_rect(&self, depth: u32, cell: UVec2) -> [f32; 4] {
        let n = self.texels as f32;
        let cells = (self.texels - 1) >> depth;
        let px = (cell * cells).as_vec2();
        let du = cells as f32 / n;
        [(px.x + 0.5) / n, (px.y + 0.5) / n, du, du]
    }
}

impl Drop for HeightMap {
    fn drop(&mut self) {
        registry::unregister(self.index);
        self.sink.release_heightmap(self.textures);
    }
}

impl std::fmt::Debug for HeightMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeightMap")
            .field("index", &self.index)
            .field("desc", &self.desc)
            .field("textures", &self.textures)
            .finish()
    }
}
