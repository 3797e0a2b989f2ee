// src/heightmap/sampling.rs
//
// Raw (CPU) side of a heightmap: generator samples with a one-texel apron,
// plus the quantized height/normal bytes once encoded.

use std::mem::size_of;
use std::sync::Arc;

use glam::{UVec2, Vec2};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::warn;

use crate::config;
use crate::error::{Result, TerrainError};
use crate::gpu::TextureSink;
use crate::mesh::compute_normal;
use crate::world::HeightFieldGenerator;

use super::mips::ExtentPyramid;
use super::{next_index, registry, HeightMap, HeightMapDesc};

// Row-parallel sampling. Falls back to the caller's rayon context if the
// dedicated pool can't be built.
static SAMPLE_POOL: Lazy<Option<ThreadPool>> = Lazy::new(|| {
    match ThreadPoolBuilder::new()
        .num_threads(config::SAMPLE_THREADS)
        .thread_name(|i| format!("heightmap-sample-{}", i))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("failed to build heightmap sample pool: {e}");
            None
        }
    }
});

fn in_sample_pool<R: Send>(f: impl FnOnce() -> R + Send) -> R {
    match SAMPLE_POOL.as_ref() {
        Some(pool) => pool.install(f),
        None => f(),
    }
}

pub(crate) fn try_alloc<T: Clone>(len: usize, fill: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| TerrainError::OutOfMemory {
        bytes: len.saturating_mul(size_of::<T>()),
    })?;
    v.resize(len, fill);
    Ok(v)
}

/// A freshly sampled heightmap. Area min/max queries are only possible in
/// this state; `clean_up` consumes it and leaves the texture-only `HeightMap`.
pub struct SampledHeightMap {
    index: u32,
    desc: HeightMapDesc,
    texels: u32,
    spacing: f32,
    bounds: (f32, f32),

    // (texels + 2)^2, row-major, apron included.
    raw: Vec<f32>,

    height_bytes: Vec<u8>,
    normal_bytes: Vec<u8>,
}

impl SampledHeightMap {
    pub fn generate(gen: &HeightFieldGenerator, desc: HeightMapDesc) -> Result<Self> {
        let texels = desc.resolution + 1;
        let stride = (texels + 2) as usize;
        let spacing = desc.size / desc.resolution as f32;

        let mut raw = try_alloc(stride * stride, 0.0f32)?;

        in_sample_pool(|| {
            raw.par_chunks_mut(stride).enumerate().for_each(|(row, out)| {
                let ty = row as f32 - 1.0;
                for (col, h) in out.iter_mut().enumerate() {
                    let tx = col as f32 - 1.0;
                    let local = desc.origin + Vec2::new(tx, ty) * spacing;
                    *h = desc.surface.sample(gen, local);
                }
            });
        });

        Ok(Self {
            index: next_index(),
            desc,
            texels,
            spacing,
            bounds: gen.bounds(),
            raw,
            height_bytes: Vec::new(),
            normal_bytes: Vec::new(),
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn desc(&self) -> &HeightMapDesc {
        &self.desc
    }

    /// Texels per side (`resolution + 1`).
    pub fn texels(&self) -> u32 {
        self.texels
    }

    /// Local units between neighbouring texels.
    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    /// Height at texel `(x, y)`; `-1` and `texels` reach into the apron.
    #[inline]
    pub fn height(&self, x: i32, y: i32) -> f32 {
        let stride = (self.texels + 2) as i32;
        debug_assert!(x >= -1 && x <= self.texels as i32);
        debug_assert!(y >= -1 && y <= self.texels as i32);
        self.raw[((y + 1) * stride + (x + 1)) as usize]
    }

    /// (min, max) over texels `pos ..= pos + dim` on both axes.
    ///
    /// Only callable before `clean_up`; the raw buffer does not outlive it.
    pub fn area_extents(&self, pos: UVec2, dim: u32) -> (f32, f32) {
        let x1 = (pos.x + dim).min(self.texels - 1);
        let y1 = (pos.y + dim).min(self.texels - 1);

        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for y in pos.y..=y1 {
            for x in pos.x..=x1 {
                let h = self.height(x as i32, y as i32);
                lo = lo.min(h);
                hi = hi.max(h);
            }
        }
        (lo, hi)
    }

    pub fn is_encoded(&self) -> bool {
        !self.height_bytes.is_empty()
    }

    pub fn height_bytes(&self) -> &[u8] {
        &self.height_bytes
    }

    pub fn normal_bytes(&self) -> &[u8] {
        &self.normal_bytes
    }

    /// Quantize heights against the generator bounds and pack normals as
    /// RGB8. Idempotent.
    pub fn encode_textures(&mut self) -> Result<()> {
        if self.is_encoded() {
            return Ok(());
        }

        let n = self.texels as usize;
        let mut heights = try_alloc(n * n, 0u8)?;
        let mut normals = try_alloc(n * n * 3, 0u8)?;

        let (lo, hi) = self.bounds;
        let span = hi - lo;
        let step = self.spacing * self.desc.surface.unit_length();

        for y in 0..n as i32 {
            for x in 0..n as i32 {
                let i = y as usize * n + x as usize;

                let h = self.height(x, y);
                let t = if span > 0.0 { ((h - lo) / span).clamp(0.0, 1.0) } else { 0.0 };
                heights[i] = (t * 255.0).round() as u8;

                let nrm = compute_normal(
                    self.height(x - 1, y),
                    self.height(x + 1, y),
                    self.height(x, y - 1),
                    self.height(x, y + 1),
                    step,
                );
                let packed = (nrm * 0.5 + 0.5) * 255.0;
                normals[i * 3] = packed.x.round() as u8;
                normals[i * 3 + 1] = packed.y.round() as u8;
                normals[i * 3 + 2] = packed.z.round() as u8;
            }
        }

        self.height_bytes = heights;
        self.normal_bytes = normals;
        Ok(())
    }

    /// Finish the map: precompute node extents for `span` quadtree depths,
    /// encode and upload the textures, register the index, free the raw data.
    pub fn clean_up(mut self, span: u32, sink: Arc<dyn TextureSink>) -> Result<HeightMap> {
        self.encode_textures()?;

        let extents = ExtentPyramid::build(&self, span);
        let textures =
            sink.upload_heightmap(self.index, self.texels, &self.height_bytes, &self.normal_bytes);
        registry::register(self.index, textures);

        Ok(HeightMap {
            index: self.index,
            desc: self.desc,
            texels: self.texels,
            extents,
            textures,
            sink,
        })
    }
}
