// src/mesh.rs
//
// Vertex/index generation for terrain tiles.

use glam::{UVec2, Vec2, Vec3};

use crate::error::Result;
use crate::gpu::TerrainVertex;
use crate::heightmap::SampledHeightMap;
use crate::world::Surface;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TerrainMesh {
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<u32>,
}

impl TerrainMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Surface normal from the four axis neighbours of a sample (`spacing` apart)
/// by central differences. Down/up run along the second local axis.
#[inline]
pub fn compute_normal(hl: f32, hr: f32, hd: f32, hu: f32, spacing: f32) -> Vec3 {
    Vec3::new(hl - hr, 2.0 * spacing, hd - hu).normalize()
}

pub struct TerrainMeshBuilder {
    step: u32,
}

impl TerrainMeshBuilder {
    /// `step` = texels skipped between emitted vertices (1 = full detail).
    pub fn new(step: u32) -> Self {
        Self { step: step.max(1) }
    }

    /// Flat `resolution x resolution` quad patch spanning `[0, size]^2`
    /// on XZ. Shared by every tile of a LOD level; displacement comes from
    /// the heightmap texture at draw time.
    pub fn grid(size: f32, resolution: u32) -> TerrainMesh {
        let resolution = resolution.max(1);
        let n = resolution + 1;
        let inv = 1.0 / resolution as f32;

        let mut vertices = Vec::with_capacity((n * n) as usize);
        for z in 0..n {
            for x in 0..n {
                let uv = Vec2::new(x as f32, z as f32) * inv;
                vertices.push(TerrainVertex {
                    position: [uv.x * size, 0.0, uv.y * size],
                    normal: [0.0, 1.0, 0.0],
                    uv: uv.to_array(),
                });
            }
        }

        TerrainMesh {
            vertices,
            indices: quad_indices(n),
        }
    }

    /// Displaced patch over texels `pos ..= pos + texels` of `map`, one vertex
    /// every `step` texels.
    pub fn from_heights(&self, map: &SampledHeightMap, pos: UVec2, texels: u32) -> TerrainMesh {
        let desc = map.desc();
        let spacing = map.spacing();
        let world_step = spacing * desc.surface.unit_length();

        let quads = (texels / self.step).max(1);
        let n = quads + 1;
        let inv = 1.0 / quads as f32;
        let last = map.texels() - 1;

        let mut vertices = Vec::with_capacity((n * n) as usize);
        for j in 0..n {
            for i in 0..n {
                let tx = (pos.x + i * self.step).min(last) as i32;
                let ty = (pos.y + j * self.step).min(last) as i32;

                let h = map.height(tx, ty);
                let local = desc.origin + Vec2::new(tx as f32, ty as f32) * spacing;
                let p = desc.surface.world_point(local, h);

                let n_local = compute_normal(
                    map.height(tx - 1, ty),
                    map.height(tx + 1, ty),
                    map.height(tx, ty - 1),
                    map.height(tx, ty + 1),
                    world_step,
                );

                vertices.push(TerrainVertex {
                    position: p.to_array(),
                    normal: orient_normal(&desc.surface, local, n_local).to_array(),
                    uv: [i as f32 * inv, j as f32 * inv],
                });
            }
        }

        TerrainMesh {
            vertices,
            indices: quad_indices(n),
        }
    }

    /// Mesh over the whole map. Also writes the map's height/normal bytes,
    /// which `clean_up` then uploads.
    pub fn build_authoritative(&self, map: &mut SampledHeightMap) -> Result<TerrainMesh> {
        map.encode_textures()?;
        Ok(self.from_heights(map, UVec2::ZERO, map.texels() - 1))
    }
}

// Planar normals are already in world space. On a cube face the local
// frame is (u, radial, v) at that point.
fn orient_normal(surface: &Surface, local: Vec2, n: Vec3) -> Vec3 {
    match *surface {
        Surface::Plane => n,
        Surface::CubeFace { face, face_size, .. } => {
            let up = face.direction(local / face_size * 2.0 - Vec2::ONE);
            let (_, u, v) = face.basis();
            let t = (u - up * u.dot(up)).normalize_or_zero();
            let b = (v - up * v.dot(up)).normalize_or_zero();
            let w = t * n.x + up * n.y + b * n.z;
            if w.length_squared() > 0.0 { w.normalize() } else { up }
        }
    }
}

// Two CCW (seen from +Y) triangles per quad of an n x n vertex grid.
fn quad_indices(n: u32) -> Vec<u32> {
    let quads = n - 1;
    let mut indices = Vec::with_capacity((quads * quads * 6) as usize);
    for z in 0..quads {
        for x in 0..quads {
            let i00 = z * n + x;
            let i10 = i00 + 1;
            let i01 = i00 + n;
            let i11 = i01 + 1;
            indices.extend_from_slice(&[i00, i01, i10, i10, i01, i11]);
        }
    }
    indices
}
