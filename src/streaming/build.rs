// src/streaming/build.rs
//
// Job bodies and the completion messages they send back. Workers only read
// shared state (layout, generator) and allocate new heightmaps; every tree
// mutation happens on the traversal thread when the completion is harvested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;

use crate::config::{self, TreeLayout};
use crate::error::{Result, TerrainError};
use crate::gpu::{MeshSink, TextureSink};
use crate::heightmap::{HeightMapDesc, SampledHeightMap};
use crate::jobs::JobSubmitter;
use crate::mesh::{TerrainMesh, TerrainMeshBuilder};
use crate::quadtree::{plan_children, ChildSeed, ExpandRequest, NodeId, QuadTree};
use crate::world::HeightFieldGenerator;

use super::pager::RootJob;
use super::types::RootKey;

/// Read-only state shared by every job.
pub(crate) struct BuildContext {
    pub layout: Arc<TreeLayout>,
    pub gen: HeightFieldGenerator,
    pub meshes: Arc<dyn MeshSink>,
    pub textures: Arc<dyn TextureSink>,
}

pub(crate) struct RootBuilt {
    pub tree: QuadTree,
    /// Full-resolution mesh of the root heightmap; submitted on install.
    pub mesh: TerrainMesh,
}

pub(crate) enum Completion {
    Root {
        key: RootKey,
        cancel: Arc<AtomicBool>,
        result: Result<RootBuilt>,
        build_ms: f64,
    },
    Children {
        key: RootKey,
        node: NodeId,
        cancel: Arc<AtomicBool>,
        result: Result<[ChildSeed; 4]>,
        build_ms: f64,
    },
}

/// Completions drained per frame, scaled with the backlog.
#[inline]
pub(crate) fn harvest_budget(backlog: usize) -> usize {
    (config::HARVEST_MIN + backlog / 2).clamp(config::HARVEST_MIN, config::HARVEST_MAX)
}

fn check_cancel(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Acquire) {
        Err(TerrainError::Canceled)
    } else {
        Ok(())
    }
}

pub(crate) fn build_root(ctx: &BuildContext, job: &RootJob) -> Result<RootBuilt> {
    check_cancel(&job.cancel)?;

    let layout = &ctx.layout;
    let desc = HeightMapDesc {
        origin: job.origin,
        size: layout.root_dimension as f32,
        resolution: layout.heightmap_resolution,
        surface: job.surface,
    };
    let mut sampled = SampledHeightMap::generate(&ctx.gen, desc)?;

    let step = (layout.heightmap_resolution / layout.tile_resolution).max(1);
    let mesh = TerrainMeshBuilder::new(step).build_authoritative(&mut sampled)?;

    // Nothing uploaded yet; bail before touching the texture sink.
    check_cancel(&job.cancel)?;

    let map = Arc::new(sampled.clean_up(layout.heightmap_span, ctx.textures.clone())?);
    let tree = QuadTree::new(
        ChildSeed::root(layout, map),
        job.origin,
        job.surface,
        job.cancel.clone(),
    );
    Ok(RootBuilt { tree, mesh })
}

pub(crate) fn spawn_root(
    ctx: &Arc<BuildContext>,
    jobs: &dyn JobSubmitter,
    tx_done: &Sender<Completion>,
    job: RootJob,
) -> Result<()> {
    let ctx = ctx.clone();
    let tx_done = tx_done.clone();
    jobs.submit(Box::new(move || {
        let t0 = Instant::now();
        let result = build_root(&ctx, &job);
        let build_ms = t0.elapsed().as_secs_f64() * 1000.0;
        let _ = tx_done.send(Completion::Root {
            key: job.key,
            cancel: job.cancel,
            result,
            build_ms,
        });
    }))
}

pub(crate) fn spawn_expand(
    ctx: &Arc<BuildContext>,
    jobs: &dyn JobSubmitter,
    tx_done: &Sender<Completion>,
    key: RootKey,
    req: ExpandRequest,
) -> Result<()> {
    let ctx = ctx.clone();
    let tx_done = tx_done.clone();
    jobs.submit(Box::new(move || {
        let t0 = Instant::now();
        let result = plan_children(&ctx.layout, &ctx.gen, &ctx.textures, &req);
        let build_ms = t0.elapsed().as_secs_f64() * 1000.0;
        let _ = tx_done.send(Completion::Children {
            key,
            node: req.node,
            cancel: req.cancel,
            result,
            build_ms,
        });
    }))
}
