// src/config.rs
// -------------
// Config knobs for terrain streaming. The consts are the defaults; a
// `TerrainConfig` can override any of them (e.g. from TOML).

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

pub const ROOT_DIMENSION: u32 = 1024;
pub const LOD_LEVELS: u32 = 6;

// Level i range = BASE * 2^i (world units).
pub const LOD_RANGE_BASE: f32 = 64.0;

// 1 => 3x3 roots around the camera.
pub const VIEW_RADIUS: u32 = 1;

// Cells per heightmap side (texels = cells + 1).
pub const HEIGHTMAP_RESOLUTION: u32 = 128;
// Quadtree depths served by one heightmap before children sample their own.
pub const HEIGHTMAP_SPAN: u32 = 3;

pub const TILE_RESOLUTION: u32 = 16;
pub const WATER_LEVEL: f32 = 0.0;

pub const MIN_WORKER_THREADS: usize = 4;
// Dedicated rayon pool for heightmap sampling.
pub const SAMPLE_THREADS: usize = 4;
pub const MAX_IN_FLIGHT: usize = 16;
pub const MAX_ROOT_RETRIES: u32 = 2;

// Completions drained per frame (backlog-scaled, see streaming::build).
pub const HARVEST_MIN: usize = 16;
pub const HARVEST_MAX: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Topology {
    /// One fixed root centred on the origin.
    Flat,
    /// Paged grid of roots following the camera.
    Cdlod,
    /// Six fixed roots, one per cube face, projected onto a sphere.
    CubeSphere { radius: f32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub octaves: u32,
    pub amplitude: f32,
    /// Per-octave amplitude falloff (persistence).
    pub roughness: f32,
    /// None => canonical permutation table.
    pub seed: Option<u64>,
    /// Added to every sample; lets a water level of 0 sit inside the range.
    pub height_offset: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            octaves: 8,
            amplitude: 120.0,
            roughness: 0.5,
            seed: None,
            height_offset: 0.0,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.octaves == 0 {
            return Err(ConfigError::ZeroOctaves);
        }
        if !(self.roughness > 0.0 && self.roughness <= 1.0) {
            return Err(ConfigError::Roughness(self.roughness));
        }
        if !self.amplitude.is_finite() || self.amplitude < 0.0 {
            return Err(ConfigError::Amplitude(self.amplitude));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub topology: Topology,
    pub root_dimension: u32,
    pub lod_levels: u32,
    /// Visibility distance per LOD level, finest first.
    pub lod_ranges: Vec<f32>,
    pub view_radius: u32,
    pub heightmap_resolution: u32,
    pub heightmap_span: u32,
    pub tile_resolution: u32,
    pub water_level: f32,
    /// None => max(available_parallelism, MIN_WORKER_THREADS).
    pub worker_threads: Option<usize>,
    pub max_in_flight: usize,
    pub max_root_retries: u32,
    pub generator: GeneratorConfig,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Cdlod,
            root_dimension: ROOT_DIMENSION,
            lod_levels: LOD_LEVELS,
            lod_ranges: default_ranges(LOD_LEVELS, LOD_RANGE_BASE),
            view_radius: VIEW_RADIUS,
            heightmap_resolution: HEIGHTMAP_RESOLUTION,
            heightmap_span: HEIGHTMAP_SPAN,
            tile_resolution: TILE_RESOLUTION,
            water_level: WATER_LEVEL,
            worker_threads: None,
            max_in_flight: MAX_IN_FLIGHT,
            max_root_retries: MAX_ROOT_RETRIES,
            generator: GeneratorConfig::default(),
        }
    }
}

/// `base * 2^i` for each level.
pub fn default_ranges(levels: u32, base: f32) -> Vec<f32> {
    (0..levels).map(|i| base * (1u32 << i) as f32).collect()
}

impl TerrainConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(MIN_WORKER_THREADS)
                .max(MIN_WORKER_THREADS)
        })
    }

    /// Validate everything that must hold before any geometry is built.
    pub fn layout(&self) -> Result<TreeLayout, ConfigError> {
        self.generator.validate()?;

        if self.lod_levels == 0 {
            return Err(ConfigError::NoLodLevels);
        }
        let root_level = self.lod_levels - 1;

        // Every level must halve to an integer dimension, leaf included.
        let divisor = 1u64 << root_level.min(63);
        if root_level >= 32 || self.root_dimension == 0 || (self.root_dimension as u64) % divisor != 0 {
            return Err(ConfigError::NotDivisible {
                dimension: self.root_dimension,
                levels: self.lod_levels,
            });
        }
        let leaf_dimension = self.root_dimension >> root_level;

        if self.lod_ranges.len() < self.lod_levels as usize {
            return Err(ConfigError::RangeTableTooShort {
                ranges: self.lod_ranges.len(),
                levels: self.lod_levels,
            });
        }
        if self.lod_ranges.len() > self.lod_levels as usize {
            warn!(
                ranges = self.lod_ranges.len(),
                levels = self.lod_levels,
                "extra lod range entries are ignored"
            );
        }
        let ranges: Vec<f32> = self.lod_ranges[..self.lod_levels as usize].to_vec();
        let mut prev = 0.0f32;
        for (index, &value) in ranges.iter().enumerate() {
            if !value.is_finite() || value <= prev {
                return Err(ConfigError::RangesNotIncreasing { index, value });
            }
            prev = value;
        }

        if self.heightmap_span == 0 {
            return Err(ConfigError::ZeroHeightMapSpan);
        }
        if self.heightmap_span >= 32
            || self.heightmap_resolution == 0
            || self.heightmap_resolution % (1u32 << self.heightmap_span) != 0
        {
            return Err(ConfigError::HeightMapResolution {
                resolution: self.heightmap_resolution,
                span: self.heightmap_span,
            });
        }

        if self.tile_resolution == 0 {
            return Err(ConfigError::ZeroTileResolution);
        }

        match self.topology {
            Topology::Cdlod if self.view_radius == 0 => return Err(ConfigError::ZeroViewRadius),
            Topology::CubeSphere { radius } if !(radius > 0.0) => {
                return Err(ConfigError::SphereRadius(radius))
            }
            _ => {}
        }

        Ok(TreeLayout {
            topology: self.topology,
            root_dimension: self.root_dimension,
            leaf_dimension,
            root_level,
            ranges,
            view_radius: self.view_radius,
            heightmap_resolution: self.heightmap_resolution,
            heightmap_span: self.heightmap_span,
            tile_resolution: self.tile_resolution,
            water_level: self.water_level,
            max_root_retries: self.max_root_retries,
        })
    }
}

/// Validated, immutable geometry shared by the traversal thread and jobs.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeLayout {
    pub topology: Topology,
    pub root_dimension: u32,
    pub leaf_dimension: u32,
    /// LOD level of a root; leaves are level 0.
    pub root_level: u32,
    /// Exactly `root_level + 1` strictly increasing entries.
    pub ranges: Vec<f32>,
    pub view_radius: u32,
    pub heightmap_resolution: u32,
    pub heightmap_span: u32,
    pub tile_resolution: u32,
    pub water_level: f32,
    pub max_root_retries: u32,
}

impl TreeLayout {
    #[inline]
    pub fn dimension_at(&self, level: u32) -> u32 {
        self.leaf_dimension << level
    }

    #[inline]
    pub fn max_range(&self) -> f32 {
        self.ranges[self.root_level as usize]
    }

    /// Roots kept alive by the pager at any time.
    pub fn root_count(&self) -> usize {
        match self.topology {
            Topology::Flat => 1,
            Topology::Cdlod => {
                let n = (2 * self.view_radius + 1) as usize;
                n * n
            }
            Topology::CubeSphere { .. } => 6,
        }
    }
}
