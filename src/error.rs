// src/error.rs
use thiserror::Error;

/// Setup-time failures. None of these are recoverable at runtime; a streamer
/// refuses to start instead of producing undefined geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("root dimension {dimension} cannot be halved exactly down to LOD level 0 ({levels} levels)")]
    NotDivisible { dimension: u32, levels: u32 },

    #[error("lod_levels must be at least 1")]
    NoLodLevels,

    #[error("range table has {ranges} entries but {levels} LOD levels are configured")]
    RangeTableTooShort { ranges: usize, levels: u32 },

    #[error("lod range {index} ({value}) must be positive and larger than the previous range")]
    RangesNotIncreasing { index: usize, value: f32 },

    #[error("heightmap resolution {resolution} is not divisible by 2^{span}")]
    HeightMapResolution { resolution: u32, span: u32 },

    #[error("heightmap span must be at least 1")]
    ZeroHeightMapSpan,

    #[error("tile resolution must be at least 1")]
    ZeroTileResolution,

    #[error("view radius must be at least 1 for the paged grid")]
    ZeroViewRadius,

    #[error("generator needs at least one octave")]
    ZeroOctaves,

    #[error("roughness {0} must lie in (0, 1]")]
    Roughness(f32),

    #[error("amplitude {0} must be finite and non-negative")]
    Amplitude(f32),

    #[error("cube-sphere radius {0} must be positive")]
    SphereRadius(f32),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TerrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("heightmap allocation of {bytes} bytes failed")]
    OutOfMemory { bytes: usize },

    #[error("job system is shut down")]
    JobSystemStopped,

    #[error("build canceled")]
    Canceled,
}

pub type Result<T, E = TerrainError> = std::result::Result<T, E>;
