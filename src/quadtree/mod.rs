// src/quadtree/mod.rs
//
// Per-root quadtree kept in an arena. Nodes are appended, never removed;
// dropping the tree is the only way nodes go away. All mutation happens on
// the traversal thread: workers compute `ChildSeed`s and send them back,
// `attach_children` publishes them.

pub mod bounds;
pub mod expand;
pub mod lod;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::{UVec2, Vec2};

use crate::heightmap::HeightMap;
use crate::world::Surface;

pub use bounds::{patch_bounds, Aabb};
pub use expand::{build_complete, plan_children, sample_heightmap, ChildSeed, ExpandRequest};
pub use lod::{Selection, SelectionMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expansion {
    /// LOD level 0; never subdivides.
    Leaf,
    Unexpanded,
    /// In the creation queue or being built by a worker.
    Scheduled,
    /// Four children attached.
    Expanded,
}

#[derive(Debug)]
pub struct QuadNode {
    /// Lower corner relative to the tree origin, in local units.
    pub offset: UVec2,
    pub dimension: u32,
    pub level: u32,
    pub min_height: f32,
    pub max_height: f32,
    pub parent: Option<NodeId>,
    pub children: Option<[NodeId; 4]>,
    pub expansion: Expansion,

    /// Heightmap serving this node; `map_depth` levels below the node that
    /// sampled it, at cell `map_cell` of that depth.
    pub map: Arc<HeightMap>,
    pub map_depth: u32,
    pub map_cell: UVec2,
}

impl QuadNode {
    fn from_seed(seed: ChildSeed, parent: Option<NodeId>) -> Self {
        Self {
            offset: seed.offset,
            dimension: seed.dimension,
            level: seed.level,
            min_height: seed.min_height,
            max_height: seed.max_height,
            parent,
            children: None,
            expansion: if seed.level == 0 { Expansion::Leaf } else { Expansion::Unexpanded },
            map: seed.map,
            map_depth: seed.map_depth,
            map_cell: seed.map_cell,
        }
    }
}

pub struct QuadTree {
    nodes: Vec<QuadNode>,
    origin: Vec2,
    surface: Surface,
    cancel: Arc<AtomicBool>,
}

impl QuadTree {
    /// Tree with a single root node built from `root`.
    pub fn new(root: ChildSeed, origin: Vec2, surface: Surface, cancel: Arc<AtomicBool>) -> Self {
        Self {
            nodes: vec![QuadNode::from_seed(root, None)],
            origin,
            surface,
            cancel,
        }
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &QuadNode {
        &self.nodes[id.idx()]
    }

    pub fn root(&self) -> &QuadNode {
        &self.nodes[0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.expansion == Expansion::Leaf).count()
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn cancel_token(&self) -> &Arc<AtomicBool> {
        &self.cancel
    }

    /// Signals in-flight jobs for this tree to stop. Set before eviction.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    /// Node's lower corner in the surface's local coordinates.
    #[inline]
    pub fn local_origin(&self, id: NodeId) -> Vec2 {
        self.origin + self.node(id).offset.as_vec2()
    }

    pub fn bounds(&self, id: NodeId) -> Aabb {
        let n = self.node(id);
        patch_bounds(
            &self.surface,
            self.local_origin(id),
            n.dimension as f32,
            n.min_height,
            n.max_height,
        )
    }

    /// Work item for expanding `id`; `None` unless it is scheduled.
    pub fn expand_request(&self, id: NodeId) -> Option<ExpandRequest> {
        let n = self.node(id);
        if n.expansion != Expansion::Scheduled {
            return None;
        }
        Some(ExpandRequest {
            node: id,
            offset: n.offset,
            dimension: n.dimension,
            level: n.level,
            map: n.map.clone(),
            map_depth: n.map_depth,
            map_cell: n.map_cell,
            origin: self.origin,
            surface: self.surface,
            cancel: self.cancel.clone(),
        })
    }

    /// Scheduled -> Unexpanded, so the next traversal can enqueue it again.
    pub fn unschedule(&mut self, id: NodeId) {
        let n = &mut self.nodes[id.idx()];
        if n.expansion == Expansion::Scheduled {
            n.expansion = Expansion::Unexpanded;
        }
    }

    pub(crate) fn schedule(&mut self, id: NodeId) -> bool {
        let n = &mut self.nodes[id.idx()];
        if n.expansion == Expansion::Unexpanded {
            n.expansion = Expansion::Scheduled;
            true
        } else {
            false
        }
    }

    /// Publish four children built by a worker. Ignored (returns `None`) if
    /// `id` is not waiting for children.
    pub fn attach_children(&mut self, id: NodeId, seeds: [ChildSeed; 4]) -> Option<[NodeId; 4]> {
        if self.node(id).expansion != Expansion::Scheduled {
            return None;
        }

        let base = self.nodes.len() as u32;
        let ids = [NodeId(base), NodeId(base + 1), NodeId(base + 2), NodeId(base + 3)];
        for seed in seeds {
            self.nodes.push(QuadNode::from_seed(seed, Some(id)));
        }

        let n = &mut self.nodes[id.idx()];
        n.children = Some(ids);
        n.expansion = Expansion::Expanded;

        self.refresh_extents(id);
        Some(ids)
    }

    // Recompute min/max from children at `id`, then walk up while anything
    // changes.
    fn refresh_extents(&mut self, id: NodeId) {
        let mut cur = Some(id);
        let mut first = true;
        while let Some(c) = cur {
            let Some(children) = self.nodes[c.idx()].children else {
                break;
            };
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for ch in children {
                let n = &self.nodes[ch.idx()];
                lo = lo.min(n.min_height);
                hi = hi.max(n.max_height);
            }

            let n = &mut self.nodes[c.idx()];
            if !first && n.min_height == lo && n.max_height == hi {
                break;
            }
            n.min_height = lo;
            n.max_height = hi;
            first = false;
            cur = n.parent;
        }
    }
}
