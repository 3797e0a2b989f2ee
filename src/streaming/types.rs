// src/streaming/types.rs
use glam::{Vec2, Vec3};

use crate::gpu::{HeightMapTextures, MeshHandle, TileGpu, FACE_NONE};
use crate::quadtree::NodeId;
use crate::world::CubeFace;

/// Identifies one root of the paged set.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum RootKey {
    /// Root grid cell; covers `[k*D - D/2, k*D + D/2]` on x and z.
    Grid { x: i32, z: i32 },
    Face(CubeFace),
}

/// Per-frame inputs. Replaces any global frame counter or delta time.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameContext {
    pub camera_position: Vec3,
    pub frame_index: u64,
    pub delta_seconds: f32,
}

impl FrameContext {
    pub fn at(camera_position: Vec3, frame_index: u64) -> Self {
        Self {
            camera_position,
            frame_index,
            delta_seconds: 0.0,
        }
    }
}

/// Planet placement of a tile on a cube-sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphereParams {
    pub center: Vec3,
    pub radius: f32,
    pub face: CubeFace,
    /// Local units spanning the whole face.
    pub face_size: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainTile {
    pub root: RootKey,
    pub node: NodeId,
    pub heightmap: u32,
    /// Lower corner; world XZ on a plane, face-local on a sphere.
    pub origin: Vec2,
    pub dimension: f32,
    pub lod_level: u32,
    pub mesh: MeshHandle,
    pub textures: HeightMapTextures,
    pub uv_rect: [f32; 4],
    pub min_height: f32,
    pub max_height: f32,
    pub sphere: Option<SphereParams>,
}

impl TerrainTile {
    pub fn to_gpu(&self, water_level: f32) -> TileGpu {
        let (sphere, face) = sphere_gpu(self.sphere);
        TileGpu {
            origin: self.origin.to_array(),
            dimension: self.dimension,
            lod_level: self.lod_level,
            uv_rect: self.uv_rect,
            sphere,
            height_tex: self.textures.height.0,
            normal_tex: self.textures.normal.0,
            face,
            water_level,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaterTile {
    pub root: RootKey,
    pub node: NodeId,
    pub origin: Vec2,
    pub dimension: f32,
    pub lod_level: u32,
    pub level: f32,
    pub mesh: MeshHandle,
    pub sphere: Option<SphereParams>,
}

impl WaterTile {
    pub fn to_gpu(&self) -> TileGpu {
        let (sphere, face) = sphere_gpu(self.sphere);
        TileGpu {
            origin: self.origin.to_array(),
            dimension: self.dimension,
            lod_level: self.lod_level,
            uv_rect: [0.0, 0.0, 1.0, 1.0],
            sphere,
            height_tex: 0,
            normal_tex: 0,
            face,
            water_level: self.level,
        }
    }
}

fn sphere_gpu(s: Option<SphereParams>) -> ([f32; 4], u32) {
    match s {
        Some(s) => (s.center.extend(s.radius).to_array(), s.face as u32),
        None => ([0.0; 4], FACE_NONE),
    }
}

/// Output of one `update`: terrain tiles ordered by heightmap index, and the
/// water tiles paired with them.
#[derive(Clone, Debug, Default)]
pub struct DrawLists {
    pub terrain: Vec<TerrainTile>,
    pub water: Vec<WaterTile>,
}

#[derive(Clone, Debug, Default)]
pub struct StreamStats {
    pub center: Option<(i32, i32)>,

    pub roots_live: u32,
    pub roots_pending: u32,
    pub roots_vacant: u32,

    pub in_flight: u32,
    pub done_backlog: u32,
    pub nodes: u32,
    /// Heightmaps referenced by this streamer's live trees.
    pub heightmaps_live: u32,

    pub terrain_tiles: u32,
    pub water_tiles: u32,

    // Window counters since the previous stats() call.
    pub roots_built: u32,
    pub roots_failed: u32,
    pub roots_evicted: u32,
    pub expansions_done: u32,
    pub expansions_failed: u32,
    pub stale_dropped: u32,
    pub build_ms_avg: f64,
    pub build_ms_max: f64,
}
