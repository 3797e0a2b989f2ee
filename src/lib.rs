// src/lib.rs
//
// Streaming CDLOD terrain: procedural height fields, per-root quadtrees with
// distance-band LOD selection, and background tile generation.

pub mod config;
pub mod error;
pub mod gpu;
pub mod heightmap;
pub mod jobs;
pub mod mesh;
pub mod quadtree;
pub mod streaming;
pub mod world;

pub use config::{GeneratorConfig, TerrainConfig, Topology, TreeLayout};
pub use error::{ConfigError, TerrainError};
pub use gpu::{GpuSink, HeadlessGpu, MeshSink, TextureSink};
pub use jobs::{ImmediateJobs, JobSubmitter, JobSystem};
pub use streaming::{DrawLists, FrameContext, RootKey, TerrainStreamer, TerrainTile, WaterTile};
pub use world::HeightFieldGenerator;
