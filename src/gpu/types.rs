// src/gpu/types.rs
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Default)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Per-tile instance data handed to the renderer untouched.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Default)]
pub struct TileGpu {
    pub origin: [f32; 2],
    pub dimension: f32,
    pub lod_level: u32,

    // (u0, v0, du, dv) of this tile inside its heightmap texture.
    pub uv_rect: [f32; 4],

    // (cx, cy, cz, radius); radius 0 => planar tile.
    pub sphere: [f32; 4],

    pub height_tex: u32,
    pub normal_tex: u32,
    pub face: u32,
    pub water_level: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// The encoded (GPU-resident) side of a heightmap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeightMapTextures {
    pub height: TextureId,
    pub normal: TextureId,
    /// Texels per side.
    pub texels: u32,
}

pub const FACE_NONE: u32 = u32::MAX;
