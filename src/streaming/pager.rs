// src/streaming/pager.rs
//
// Keeps the set of live roots around the camera. All decisions are made
// here synchronously; building happens elsewhere and comes back through
// `complete_root`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::{IVec2, Vec2, Vec3};
use rustc_hash::FxHashMap as HashMap;
use tracing::{debug, info, warn};

use crate::config::{Topology, TreeLayout};
use crate::error::TerrainError;
use crate::quadtree::{NodeId, QuadTree, Selection, SelectionMap};
use crate::world::{CubeFace, Surface};

use super::types::RootKey;

pub enum RootSlot {
    /// A root job is in flight; completions carrying another token are stale.
    Pending { cancel: Arc<AtomicBool>, attempt: u32 },
    Live(Box<QuadTree>),
    /// Gave up after repeated failures. Stays empty until paged out.
    Vacant { attempt: u32 },
}

/// A root build to hand to the job system.
#[derive(Clone, Debug)]
pub struct RootJob {
    pub key: RootKey,
    pub origin: Vec2,
    pub surface: Surface,
    pub cancel: Arc<AtomicBool>,
    pub attempt: u32,
}

#[derive(Debug, Default)]
pub struct PagerDelta {
    pub spawned: Vec<RootJob>,
    pub evicted: Vec<RootKey>,
}

/// What happened to a finished root job.
#[derive(Debug)]
pub enum RootOutcome {
    Installed,
    /// Token did not match the slot (evicted or re-requested meanwhile).
    Stale,
    Retry(RootJob),
    Vacant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectedTile {
    pub root: RootKey,
    pub selection: Selection,
}

/// One frame's traversal result over every live root.
#[derive(Debug, Default)]
pub struct FrameSelection {
    /// Heightmap index -> tiles drawn with it.
    pub by_map: BTreeMap<u32, Vec<SelectedTile>>,
    /// Nodes newly scheduled for expansion, with squared camera distance.
    pub expand: Vec<(RootKey, NodeId, f32)>,
}

pub struct RootPager {
    layout: Arc<TreeLayout>,
    center: Option<IVec2>,
    roots: HashMap<RootKey, RootSlot>,
}

impl RootPager {
    pub fn new(layout: Arc<TreeLayout>) -> Self {
        Self {
            layout,
            center: None,
            roots: HashMap::default(),
        }
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    pub fn center(&self) -> Option<IVec2> {
        self.center
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = RootKey> + '_ {
        self.roots.keys().copied()
    }

    pub fn slot(&self, key: RootKey) -> Option<&RootSlot> {
        self.roots.get(&key)
    }

    pub fn tree(&self, key: RootKey) -> Option<&QuadTree> {
        match self.roots.get(&key) {
            Some(RootSlot::Live(t)) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub fn tree_mut(&mut self, key: RootKey) -> Option<&mut QuadTree> {
        match self.roots.get_mut(&key) {
            Some(RootSlot::Live(t)) => Some(t.as_mut()),
            _ => None,
        }
    }

    pub fn live_trees(&self) -> impl Iterator<Item = (RootKey, &QuadTree)> + '_ {
        self.roots.iter().filter_map(|(k, s)| match s {
            RootSlot::Live(t) => Some((*k, t.as_ref())),
            _ => None,
        })
    }

    /// (live, pending, vacant)
    pub fn counts(&self) -> (u32, u32, u32) {
        let mut c = (0, 0, 0);
        for s in self.roots.values() {
            match s {
                RootSlot::Live(_) => c.0 += 1,
                RootSlot::Pending { .. } => c.1 += 1,
                RootSlot::Vacant { .. } => c.2 += 1,
            }
        }
        c
    }

    /// Grid cell whose root contains `camera`. Clamped so the whole
    /// neighbourhood stays addressable.
    pub fn center_key(&self, camera: Vec3) -> IVec2 {
        let d = self.layout.root_dimension as f64;
        let r = self.layout.view_radius.min(i32::MAX as u32 / 2) as i32;
        let (lo, hi) = (i32::MIN + r, i32::MAX - r);
        let cell = |v: f32| -> i32 {
            let k = (v as f64 / d).round();
            if k.is_nan() {
                0
            } else {
                k.clamp(lo as f64, hi as f64) as i32
            }
        };
        IVec2::new(cell(camera.x), cell(camera.z))
    }

    /// Local origin and surface of the root under `key`.
    pub fn placement(&self, key: RootKey) -> (Vec2, Surface) {
        let d = self.layout.root_dimension as f32;
        match key {
            RootKey::Grid { x, z } => (
                (Vec2::new(x as f32, z as f32) - 0.5) * d,
                Surface::Plane,
            ),
            RootKey::Face(face) => {
                let radius = match self.layout.topology {
                    Topology::CubeSphere { radius } => radius,
                    _ => d * 0.5,
                };
                (Vec2::ZERO, Surface::CubeFace { face, radius, face_size: d })
            }
        }
    }

    fn wanted(&self, center: IVec2) -> Vec<RootKey> {
        match self.layout.topology {
            Topology::Flat => vec![RootKey::Grid { x: 0, z: 0 }],
            Topology::CubeSphere { .. } => CubeFace::ALL.iter().map(|&f| RootKey::Face(f)).collect(),
            Topology::Cdlod => {
                let r = self.layout.view_radius as i32;
                let mut keys = Vec::with_capacity(self.layout.root_count());
                for dz in -r..=r {
                    for dx in -r..=r {
                        keys.push(RootKey::Grid { x: center.x + dx, z: center.y + dz });
                    }
                }
                keys
            }
        }
    }

    fn job(&self, key: RootKey, attempt: u32) -> (RootJob, Arc<AtomicBool>) {
        let cancel = Arc::new(AtomicBool::new(false));
        let (origin, surface) = self.placement(key);
        (
            RootJob { key, origin, surface, cancel: cancel.clone(), attempt },
            cancel,
        )
    }

    /// Recenter on `camera`. Newly wanted cells become pending (their jobs
    /// are returned for submission); cells outside the neighbourhood are
    /// cancelled and dropped right away.
    pub fn update(&mut self, camera: Vec3) -> PagerDelta {
        let mut delta = PagerDelta::default();

        let center = match self.layout.topology {
            Topology::Cdlod => self.center_key(camera),
            Topology::Flat | Topology::CubeSphere { .. } => IVec2::ZERO,
        };
        if self.center == Some(center) {
            return delta;
        }
        if let Some(old) = self.center {
            info!(from = ?old, to = ?center, "recentering root grid");
        }
        self.center = Some(center);

        let wanted = self.wanted(center);

        let stale: Vec<RootKey> = self
            .roots
            .keys()
            .filter(|k| !wanted.contains(k))
            .copied()
            .collect();
        for key in stale {
            self.evict(key);
            delta.evicted.push(key);
        }

        for key in wanted {
            if self.roots.contains_key(&key) {
                continue;
            }
            let (job, cancel) = self.job(key, 0);
            self.roots.insert(key, RootSlot::Pending { cancel, attempt: 0 });
            delta.spawned.push(job);
        }

        debug_assert_eq!(self.roots.len(), self.layout.root_count());
        delta
    }

    fn evict(&mut self, key: RootKey) {
        match self.roots.remove(&key) {
            Some(RootSlot::Pending { cancel, .. }) => {
                cancel.store(true, Ordering::Release);
            }
            Some(RootSlot::Live(tree)) => {
                tree.cancel();
                debug!(?key, nodes = tree.len(), "evicted root");
            }
            Some(RootSlot::Vacant { .. }) | None => {}
        }
    }

    /// Raise every cancel token without dropping anything.
    pub fn cancel_all(&self) {
        for slot in self.roots.values() {
            match slot {
                RootSlot::Pending { cancel, .. } => cancel.store(true, Ordering::Release),
                RootSlot::Live(tree) => tree.cancel(),
                RootSlot::Vacant { .. } => {}
            }
        }
    }

    /// Apply a finished root job.
    pub fn complete_root(
        &mut self,
        key: RootKey,
        cancel: &Arc<AtomicBool>,
        result: Result<QuadTree, TerrainError>,
    ) -> RootOutcome {
        let attempt = match self.roots.get(&key) {
            Some(RootSlot::Pending { cancel: cur, attempt }) if Arc::ptr_eq(cur, cancel) => *attempt,
            _ => return RootOutcome::Stale,
        };

        match result {
            Ok(tree) => {
                self.roots.insert(key, RootSlot::Live(Box::new(tree)));
                RootOutcome::Installed
            }
            Err(TerrainError::Canceled) => RootOutcome::Stale,
            Err(e) if attempt < self.layout.max_root_retries => {
                warn!(?key, attempt, "root build failed, retrying: {e}");
                let (job, cancel) = self.job(key, attempt + 1);
                self.roots.insert(key, RootSlot::Pending { cancel, attempt: attempt + 1 });
                RootOutcome::Retry(job)
            }
            Err(e) => {
                warn!(?key, attempt, "root build failed, leaving cell vacant: {e}");
                self.roots.insert(key, RootSlot::Vacant { attempt });
                RootOutcome::Vacant
            }
        }
    }

    /// Undo a pending slot whose job could not be submitted.
    pub(crate) fn abandon(&mut self, key: RootKey, cancel: &Arc<AtomicBool>) {
        if let Some(RootSlot::Pending { cancel: cur, attempt }) = self.roots.get(&key) {
            if Arc::ptr_eq(cur, cancel) {
                let attempt = *attempt;
                self.roots.insert(key, RootSlot::Vacant { attempt });
            }
        }
    }

    /// LOD traversal over every live root at the top level.
    pub fn select(&mut self, camera: Vec3) -> FrameSelection {
        let mut frame = FrameSelection::default();
        let ranges = self.layout.ranges.clone();

        let mut out = SelectionMap::new();
        let mut queue = Vec::new();
        for (&key, slot) in self.roots.iter_mut() {
            let RootSlot::Live(tree) = slot else { continue };

            out.clear();
            queue.clear();
            tree.lod_select(&ranges, camera, &mut out, &mut queue);

            for (&map, sels) in out.iter() {
                frame
                    .by_map
                    .entry(map)
                    .or_default()
                    .extend(sels.iter().map(|&selection| SelectedTile { root: key, selection }));
            }
            for &id in &queue {
                frame.expand.push((key, id, tree.bounds(id).distance_sq(camera)));
            }
        }

        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TerrainConfig, Topology};

    fn pager(topology: Topology, view_radius: u32) -> RootPager {
        let layout = TerrainConfig {
            topology,
            view_radius,
            root_dimension: 64,
            lod_levels: 4,
            lod_ranges: vec![8.0, 16.0, 32.0, 64.0],
            heightmap_resolution: 16,
            heightmap_span: 2,
            ..Default::default()
        }
        .layout()
        .unwrap();
        RootPager::new(Arc::new(layout))
    }

    #[test]
    fn first_update_requests_the_whole_neighbourhood() {
        let mut p = pager(Topology::Cdlod, 1);
        let d = p.update(Vec3::ZERO);
        assert_eq!(d.spawned.len(), 9);
        assert!(d.evicted.is_empty());
        assert_eq!(p.counts(), (0, 9, 0));
        assert!(p.update(Vec3::new(10.0, 0.0, -10.0)).spawned.is_empty());
    }

    #[test]
    fn rounding_picks_the_containing_cell() {
        let p = pager(Topology::Cdlod, 1);
        assert_eq!(p.center_key(Vec3::new(31.9, 0.0, -31.9)), IVec2::ZERO);
        assert_eq!(p.center_key(Vec3::new(32.1, 0.0, -32.1)), IVec2::new(1, -1));
        assert_eq!(p.placement(RootKey::Grid { x: 1, z: -1 }).0, Vec2::new(32.0, -96.0));
    }

    #[test]
    fn far_cameras_keep_a_full_neighbourhood() {
        let mut p = pager(Topology::Cdlod, 1);
        for cam in [
            Vec3::new(1.0e12, 0.0, 0.0),
            Vec3::new(-1.0e12, 0.0, 3.0e11),
            Vec3::new(f32::MAX, 0.0, f32::MIN),
            Vec3::new(f32::NAN, 0.0, 64.0),
        ] {
            p.update(cam);
            assert_eq!(p.len(), 9, "camera {cam}");
        }

        let c = p.center_key(Vec3::new(1.0e12, 0.0, -1.0e12));
        assert_eq!(c, IVec2::new(i32::MAX - 1, i32::MIN + 1));
        assert_eq!(p.center_key(Vec3::new(f32::NAN, 0.0, 64.0)), IVec2::new(0, 1));
    }

    #[test]
    fn fixed_topologies_spawn_once() {
        let mut flat = pager(Topology::Flat, 1);
        assert_eq!(flat.update(Vec3::ZERO).spawned.len(), 1);
        assert!(flat.update(Vec3::new(5000.0, 0.0, 0.0)).spawned.is_empty());

        let mut sphere = pager(Topology::CubeSphere { radius: 200.0 }, 1);
        let d = sphere.update(Vec3::ZERO);
        assert_eq!(d.spawned.len(), 6);
        assert!(matches!(d.spawned[0].surface, Surface::CubeFace { radius, .. } if radius == 200.0));
    }

    #[test]
    fn stale_and_failed_completions() {
        let mut p = pager(Topology::Flat, 1);
        let job = p.update(Vec3::ZERO).spawned.remove(0);
        let other = Arc::new(AtomicBool::new(false));

        assert!(matches!(
            p.complete_root(job.key, &other, Err(TerrainError::OutOfMemory { bytes: 1 })),
            RootOutcome::Stale
        ));

        let mut cancel = job.cancel.clone();
        for _ in 0..p.layout().max_root_retries {
            match p.complete_root(job.key, &cancel, Err(TerrainError::OutOfMemory { bytes: 1 })) {
                RootOutcome::Retry(next) => cancel = next.cancel,
                o => panic!("expected retry, got {o:?}"),
            }
        }
        assert!(matches!(
            p.complete_root(job.key, &cancel, Err(TerrainError::OutOfMemory { bytes: 1 })),
            RootOutcome::Vacant
        ));
        assert_eq!(p.counts(), (0, 0, 1));
    }
}
