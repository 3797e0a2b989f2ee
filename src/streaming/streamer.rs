// src/streaming/streamer.rs
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec3;
use rustc_hash::FxHashMap as HashMap;
use tracing::{debug, trace, warn};

use crate::config::{TerrainConfig, TreeLayout};
use crate::error::{Result, TerrainError};
use crate::gpu::{GpuSink, MeshHandle, MeshSink, TextureSink};
use crate::jobs::{JobSubmitter, JobSystem};
use crate::mesh::TerrainMeshBuilder;
use crate::quadtree::NodeId;
use crate::world::{HeightFieldGenerator, Surface};

use super::build::{self, BuildContext, Completion};
use super::pager::{RootJob, RootOutcome, RootPager, SelectedTile};
use super::stats::{self, BuildWindow};
use super::types::*;

/// Per-frame terrain driver: pages roots, runs LOD selection, keeps workers
/// fed and turns the selection into draw lists. Never blocks on a worker.
pub struct TerrainStreamer {
    pub(crate) ctx: Arc<BuildContext>,
    pub(crate) jobs: Arc<dyn JobSubmitter>,
    pub(crate) pager: RootPager,

    pub(crate) tx_done: Sender<Completion>,
    pub(crate) rx_done: Receiver<Completion>,
    pub(crate) in_flight: usize,
    pub(crate) max_in_flight: usize,

    // One flat patch per LOD level, indexed by level.
    pub(crate) grid_meshes: Vec<MeshHandle>,
    pub(crate) root_meshes: HashMap<RootKey, MeshHandle>,

    pub(crate) last_frame: Option<u64>,
    pub(crate) last_tiles: (u32, u32),
    pub(crate) window: BuildWindow,
}

impl TerrainStreamer {
    pub fn new<G: GpuSink + 'static>(
        config: &TerrainConfig,
        gpu: Arc<G>,
        jobs: Arc<dyn JobSubmitter>,
    ) -> Result<Self> {
        let layout = Arc::new(config.layout()?);
        let gen = HeightFieldGenerator::new(&config.generator)?;

        let meshes: Arc<dyn MeshSink> = gpu.clone();
        let textures: Arc<dyn TextureSink> = gpu;

        let grid_meshes = (0..=layout.root_level)
            .map(|level| {
                let mesh = TerrainMeshBuilder::grid(layout.dimension_at(level) as f32, layout.tile_resolution);
                meshes.submit_mesh(&mesh)
            })
            .collect();

        // Unbounded: inline submitters send from inside `update`.
        let (tx_done, rx_done) = unbounded::<Completion>();

        debug!(
            topology = ?layout.topology,
            root_dimension = layout.root_dimension,
            levels = layout.root_level + 1,
            "terrain streamer created"
        );

        Ok(Self {
            ctx: Arc::new(BuildContext { layout: layout.clone(), gen, meshes, textures }),
            jobs,
            pager: RootPager::new(layout),
            tx_done,
            rx_done,
            in_flight: 0,
            max_in_flight: config.max_in_flight.max(1),
            grid_meshes,
            root_meshes: HashMap::default(),
            last_frame: None,
            last_tiles: (0, 0),
            window: BuildWindow::default(),
        })
    }

    /// Same as `new`, with a private `JobSystem` sized from the config.
    pub fn with_worker_pool<G: GpuSink + 'static>(config: &TerrainConfig, gpu: Arc<G>) -> Result<Self> {
        let jobs = Arc::new(JobSystem::new(config.worker_threads()));
        Self::new(config, gpu, jobs)
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.ctx.layout
    }

    pub fn generator(&self) -> &HeightFieldGenerator {
        &self.ctx.gen
    }

    pub fn pager(&self) -> &RootPager {
        &self.pager
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// No jobs outstanding and nothing left to harvest.
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.rx_done.is_empty()
    }

    pub fn grid_mesh(&self, level: u32) -> Option<MeshHandle> {
        self.grid_meshes.get(level as usize).copied()
    }

    /// Authoritative mesh of a live root.
    pub fn root_mesh(&self, key: RootKey) -> Option<MeshHandle> {
        self.root_meshes.get(&key).copied()
    }

    pub fn stats(&mut self) -> StreamStats {
        stats::stats(self)
    }

    pub fn update(&mut self, frame: &FrameContext) -> DrawLists {
        if let Some(last) = self.last_frame {
            if frame.frame_index <= last {
                trace!(frame = frame.frame_index, last, "frame index did not advance");
            }
        }
        self.last_frame = Some(frame.frame_index);
        let cam = frame.camera_position;

        // 1) fold finished jobs into the trees
        self.harvest_done();

        // 2) keep the root neighbourhood around the camera
        self.page_roots(cam);

        // 3) select
        let selection = self.pager.select(cam);

        // 4) feed workers, nearest first
        self.dispatch_expansions(selection.expand);

        // 5) draw lists for this frame only
        let lists = self.materialize(&selection.by_map);
        self.last_tiles = (lists.terrain.len() as u32, lists.water.len() as u32);
        lists
    }

    fn harvest_done(&mut self) {
        let max_done = build::harvest_budget(self.rx_done.len());

        for _ in 0..max_done {
            let Ok(done) = self.rx_done.try_recv() else { break };
            self.in_flight = self.in_flight.saturating_sub(1);

            match done {
                Completion::Root { key, cancel, result, build_ms } => {
                    let (result, mesh) = match result {
                        Ok(b) => (Ok(b.tree), Some(b.mesh)),
                        Err(e) => (Err(e), None),
                    };
                    match self.pager.complete_root(key, &cancel, result) {
                        RootOutcome::Installed => {
                            if let Some(mesh) = mesh {
                                let handle = self.ctx.meshes.submit_mesh(&mesh);
                                if let Some(old) = self.root_meshes.insert(key, handle) {
                                    self.ctx.meshes.release_mesh(old);
                                }
                            }
                            self.window.roots_built += 1;
                            self.window.record_build(build_ms);
                            debug!(?key, build_ms, "root ready");
                        }
                        RootOutcome::Stale => self.window.stale_dropped += 1,
                        RootOutcome::Retry(job) => {
                            self.window.roots_failed += 1;
                            self.submit_root(job);
                        }
                        RootOutcome::Vacant => self.window.roots_failed += 1,
                    }
                }

                Completion::Children { key, node, cancel, result, build_ms } => {
                    let Some(tree) = self.pager.tree_mut(key) else {
                        debug!(?key, ?node, "dropping expansion for evicted root");
                        self.window.stale_dropped += 1;
                        continue;
                    };
                    if !Arc::ptr_eq(tree.cancel_token(), &cancel) {
                        self.window.stale_dropped += 1;
                        continue;
                    }

                    match result {
                        Ok(seeds) => {
                            if tree.attach_children(node, seeds).is_some() {
                                self.window.expansions_done += 1;
                                self.window.record_build(build_ms);
                            } else {
                                self.window.stale_dropped += 1;
                            }
                        }
                        Err(TerrainError::Canceled) => self.window.stale_dropped += 1,
                        Err(e) => {
                            warn!(?key, ?node, "node expansion failed: {e}");
                            tree.unschedule(node);
                            self.window.expansions_failed += 1;
                        }
                    }
                }
            }
        }
    }

    fn page_roots(&mut self, cam: Vec3) {
        let delta = self.pager.update(cam);

        for key in &delta.evicted {
            if let Some(handle) = self.root_meshes.remove(key) {
                self.ctx.meshes.release_mesh(handle);
            }
        }
        self.window.roots_evicted += delta.evicted.len() as u32;

        for job in delta.spawned {
            self.submit_root(job);
        }
    }

    fn submit_root(&mut self, job: RootJob) {
        let key = job.key;
        let cancel = job.cancel.clone();
        match build::spawn_root(&self.ctx, self.jobs.as_ref(), &self.tx_done, job) {
            Ok(()) => self.in_flight += 1,
            Err(e) => {
                warn!(?key, "could not submit root job: {e}");
                self.pager.abandon(key, &cancel);
            }
        }
    }

    fn dispatch_expansions(&mut self, mut expand: Vec<(RootKey, NodeId, f32)>) {
        expand.sort_by(|a, b| a.2.total_cmp(&b.2));

        for (key, id, _) in expand {
            let Some(tree) = self.pager.tree_mut(key) else { continue };

            // Over budget: let the next traversal enqueue it again.
            if self.in_flight >= self.max_in_flight {
                tree.unschedule(id);
                continue;
            }
            let Some(req) = tree.expand_request(id) else { continue };

            match build::spawn_expand(&self.ctx, self.jobs.as_ref(), &self.tx_done, key, req) {
                Ok(()) => self.in_flight += 1,
                Err(e) => {
                    warn!(?key, node = ?id, "could not submit expansion: {e}");
                    tree.unschedule(id);
                }
            }
        }
    }

    fn materialize(&self, by_map: &std::collections::BTreeMap<u32, Vec<SelectedTile>>) -> DrawLists {
        let water_level = self.ctx.layout.water_level;
        let mut lists = DrawLists::default();

        for (&heightmap, tiles) in by_map {
            for t in tiles {
                let Some(tree) = self.pager.tree(t.root) else { continue };
                let id = t.selection.node;
                let n = tree.node(id);

                let sphere = match *tree.surface() {
                    Surface::Plane => None,
                    Surface::CubeFace { face, radius, face_size } => Some(SphereParams {
                        center: Vec3::ZERO,
                        radius,
                        face,
                        face_size,
                    }),
                };
                let origin = tree.local_origin(id);
                let dimension = n.dimension as f32;
                let mesh = self.grid_meshes[n.level as usize];

                lists.terrain.push(TerrainTile {
                    root: t.root,
                    node: id,
                    heightmap,
                    origin,
                    dimension,
                    lod_level: t.selection.draw_level,
                    mesh,
                    textures: n.map.textures(),
                    uv_rect: n.map.uv_rect(n.map_depth, n.map_cell),
                    min_height: n.min_height,
                    max_height: n.max_height,
                    sphere,
                });

                if n.min_height < water_level {
                    lists.water.push(WaterTile {
                        root: t.root,
                        node: id,
                        origin,
                        dimension,
                        lod_level: t.selection.draw_level,
                        level: water_level,
                        mesh,
                        sphere,
                    });
                }
            }
        }

        lists
    }
}

impl Drop for TerrainStreamer {
    fn drop(&mut self) {
        // Queued jobs for this streamer become no-ops.
        self.pager.cancel_all();

        for (_, handle) in self.root_meshes.drain() {
            self.ctx.meshes.release_mesh(handle);
        }
        for handle in self.grid_meshes.drain(..) {
            self.ctx.meshes.release_mesh(handle);
        }
    }
}
