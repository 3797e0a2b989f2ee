// src/gpu/mod.rs
// Seams to the rendering collaborator. The core only triggers uploads; it
// never talks to a graphics API itself.

pub mod types;

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::mesh::TerrainMesh;

pub use types::*;

/// "Submit mesh for GPU upload". The handle is opaque to the core.
pub trait MeshSink: Send + Sync {
    fn submit_mesh(&self, mesh: &TerrainMesh) -> MeshHandle;

    /// The core will not reference `handle` again.
    fn release_mesh(&self, handle: MeshHandle);
}

/// Receives encoded heightmap textures (R8 heights, RGB8 normals).
pub trait TextureSink: Send + Sync {
    fn upload_heightmap(
        &self,
        index: u32,
        texels: u32,
        heights: &[u8],
        normals: &[u8],
    ) -> HeightMapTextures;

    fn release_heightmap(&self, textures: HeightMapTextures);
}

/// Both upload seams in one object.
pub trait GpuSink: MeshSink + TextureSink {}

impl<T: MeshSink + TextureSink> GpuSink for T {}

/// Hands out sequential ids and keeps counters; no device behind it.
#[derive(Default)]
pub struct HeadlessGpu {
    next_id: AtomicU32,
    meshes: AtomicU32,
    live_meshes: AtomicI64,
    mesh_vertices: AtomicU64,
    live_heightmaps: AtomicI64,
    uploaded_bytes: AtomicU64,
}

impl HeadlessGpu {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn meshes_submitted(&self) -> u32 {
        self.meshes.load(Ordering::Relaxed)
    }

    /// Submitted minus released.
    pub fn live_meshes(&self) -> i64 {
        self.live_meshes.load(Ordering::Acquire)
    }

    pub fn vertices_submitted(&self) -> u64 {
        self.mesh_vertices.load(Ordering::Relaxed)
    }

    /// Uploaded minus released.
    pub fn live_heightmaps(&self) -> i64 {
        self.live_heightmaps.load(Ordering::Acquire)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes.load(Ordering::Relaxed)
    }
}

impl MeshSink for HeadlessGpu {
    fn submit_mesh(&self, mesh: &TerrainMesh) -> MeshHandle {
        self.meshes.fetch_add(1, Ordering::Relaxed);
        self.live_meshes.fetch_add(1, Ordering::AcqRel);
        self.mesh_vertices
            .fetch_add(mesh.vertices.len() as u64, Ordering::Relaxed);
        MeshHandle(self.next())
    }

    fn release_mesh(&self, _handle: MeshHandle) {
        self.live_meshes.fetch_sub(1, Ordering::AcqRel);
    }
}

impl TextureSink for HeadlessGpu {
    fn upload_heightmap(
        &self,
        _index: u32,
        texels: u32,
        heights: &[u8],
        normals: &[u8],
    ) -> HeightMapTextures {
        self.live_heightmaps.fetch_add(1, Ordering::AcqRel);
        self.uploaded_bytes
            .fetch_add((heights.len() + normals.len()) as u64, Ordering::Relaxed);
        HeightMapTextures {
            height: TextureId(self.next()),
            normal: TextureId(self.next()),
            texels,
        }
    }

    fn release_heightmap(&self, _textures: HeightMapTextures) {
        self.live_heightmaps.fetch_sub(1, Ordering::AcqRel);
    }
}
