// src/quadtree/expand.rs
//
// Worker-side half of node expansion. Nothing here touches a `QuadTree`
// arena except `build_complete`, which owns the tree it builds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::{UVec2, Vec2};

use crate::config::TreeLayout;
use crate::error::{Result, TerrainError};
use crate::gpu::TextureSink;
use crate::heightmap::{HeightMap, HeightMapDesc, SampledHeightMap};
use crate::world::{HeightFieldGenerator, Surface};

use super::{NodeId, QuadTree};

// Child order: (0,0), (1,0), (0,1), (1,1).
const QUADRANTS: [UVec2; 4] = [UVec2::new(0, 0), UVec2::new(1, 0), UVec2::new(0, 1), UVec2::new(1, 1)];

/// Everything a worker needs to build a node's children, detached from the arena.
#[derive(Clone)]
pub struct ExpandRequest {
    pub node: NodeId,
    pub offset: UVec2,
    pub dimension: u32,
    pub level: u32,
    pub map: Arc<HeightMap>,
    pub map_depth: u32,
    pub map_cell: UVec2,
    pub origin: Vec2,
    pub surface: Surface,
    pub cancel: Arc<AtomicBool>,
}

/// A node ready to be attached.
#[derive(Debug)]
pub struct ChildSeed {
    pub offset: UVec2,
    pub dimension: u32,
    pub level: u32,
    pub min_height: f32,
    pub max_height: f32,
    pub map: Arc<HeightMap>,
    pub map_depth: u32,
    pub map_cell: UVec2,
}

impl ChildSeed {
    /// Root node over a freshly sampled root heightmap.
    pub fn root(layout: &TreeLayout, map: Arc<HeightMap>) -> Self {
        let (min_height, max_height) = map.extents(0, UVec2::ZERO);
        Self {
            offset: UVec2::ZERO,
            dimension: layout.root_dimension,
            level: layout.root_level,
            min_height,
            max_height,
            map,
            map_depth: 0,
            map_cell: UVec2::ZERO,
        }
    }
}

/// Sample and finish a heightmap covering `[origin, origin + dimension]^2`.
pub fn sample_heightmap(
    layout: &TreeLayout,
    gen: &HeightFieldGenerator,
    sink: &Arc<dyn TextureSink>,
    surface: Surface,
    origin: Vec2,
    dimension: u32,
) -> Result<Arc<HeightMap>> {
    let desc = HeightMapDesc {
        origin,
        size: dimension as f32,
        resolution: layout.heightmap_resolution,
        surface,
    };
    let sampled = SampledHeightMap::generate(gen, desc)?;
    Ok(Arc::new(sampled.clean_up(layout.heightmap_span, sink.clone())?))
}

/// Compute the four children of `req.node`.
///
/// Children reuse the parent's heightmap while it still has a finer depth to
/// offer; past that each child samples its own.
pub fn plan_children(
    layout: &TreeLayout,
    gen: &HeightFieldGenerator,
    sink: &Arc<dyn TextureSink>,
    req: &ExpandRequest,
) -> Result<[ChildSeed; 4]> {
    debug_assert!(req.level > 0);
    if req.cancel.load(Ordering::Acquire) {
        return Err(TerrainError::Canceled);
    }

    let half = req.dimension / 2;
    let level = req.level - 1;
    let reuse = req.map_depth + 1 < req.map.depths();

    let child = |q: UVec2| -> Result<ChildSeed> {
        let offset = req.offset + q * half;

        let (map, map_depth, map_cell) = if reuse {
            (req.map.clone(), req.map_depth + 1, req.map_cell * 2 + q)
        } else {
            if req.cancel.load(Ordering::Acquire) {
                return Err(TerrainError::Canceled);
            }
            let map = sample_heightmap(layout, gen, sink, req.surface, req.origin + offset.as_vec2(), half)?;
            (map, 0, UVec2::ZERO)
        };

        let (min_height, max_height) = map.extents(map_depth, map_cell);
        Ok(ChildSeed {
            offset,
            dimension: half,
            level,
            min_height,
            max_height,
            map,
            map_depth,
            map_cell,
        })
    };

    let [q0, q1, q2, q3] = QUADRANTS;
    Ok([child(q0)?, child(q1)?, child(q2)?, child(q3)?])
}

/// Build a root's whole subtree synchronously, down to the leaves.
pub fn build_complete(
    layout: &TreeLayout,
    gen: &HeightFieldGenerator,
    sink: &Arc<dyn TextureSink>,
    origin: Vec2,
    surface: Surface,
) -> Result<QuadTree> {
    let map = sample_heightmap(layout, gen, sink, surface, origin, layout.root_dimension)?;
    let mut tree = QuadTree::new(ChildSeed::root(layout, map), origin, surface, Arc::default());

    let mut stack = vec![NodeId::ROOT];
    while let Some(id) = stack.pop() {
        if !tree.schedule(id) {
            continue;
        }
        let Some(req) = tree.expand_request(id) else {
            continue;
        };
        let seeds = plan_children(layout, gen, sink, &req)?;
        if let Some(ids) = tree.attach_children(id, seeds) {
            stack.extend(ids);
        }
    }

    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_ranges, TerrainConfig, Topology};
    use crate::gpu::HeadlessGpu;
    use crate::quadtree::Expansion;

    fn layout(root: u32, levels: u32, res: u32, span: u32) -> TreeLayout {
        TerrainConfig {
            topology: Topology::Flat,
            root_dimension: root,
            lod_levels: levels,
            lod_ranges: default_ranges(levels, 16.0),
            heightmap_resolution: res,
            heightmap_span: span,
            ..Default::default()
        }
        .layout()
        .unwrap()
    }

    #[test]
    fn children_share_the_parent_map_within_span() {
        let layout = layout(64, 4, 16, 2);
        let gen = HeightFieldGenerator::new(&Default::default()).unwrap();
        let gpu = Arc::new(HeadlessGpu::new());
        let sink: Arc<dyn TextureSink> = gpu.clone();

        let map = sample_heightmap(&layout, &gen, &sink, Surface::Plane, Vec2::ZERO, 64).unwrap();
        let mut tree = QuadTree::new(ChildSeed::root(&layout, map), Vec2::ZERO, Surface::Plane, Arc::default());
        tree.schedule(NodeId::ROOT);

        let req = tree.expand_request(NodeId::ROOT).unwrap();
        let seeds = plan_children(&layout, &gen, &sink, &req).unwrap();
        assert!(seeds.iter().all(|s| Arc::ptr_eq(&s.map, &req.map) && s.map_depth == 1));
        assert_eq!(seeds[3].map_cell, UVec2::new(1, 1));
        assert_eq!(seeds[2].offset, UVec2::new(0, 32));
        assert_eq!(gpu.live_heightmaps(), 1);

        // Depth 2 is the map's last; the next split samples new maps.
        let ids = tree.attach_children(NodeId::ROOT, seeds).unwrap();
        tree.schedule(ids[0]);
        let seeds = plan_children(&layout, &gen, &sink, &tree.expand_request(ids[0]).unwrap()).unwrap();
        assert!(seeds.iter().all(|s| s.map_depth == 2));
        let grand = tree.attach_children(ids[0], seeds).unwrap();
        tree.schedule(grand[1]);
        let seeds = plan_children(&layout, &gen, &sink, &tree.expand_request(grand[1]).unwrap()).unwrap();
        assert!(seeds.iter().all(|s| s.map_depth == 0 && s.level == 0));
        assert_eq!(gpu.live_heightmaps(), 5);
    }

    #[test]
    fn canceled_request_builds_nothing() {
        let layout = layout(64, 4, 16, 1);
        let gen = HeightFieldGenerator::new(&Default::default()).unwrap();
        let sink: Arc<dyn TextureSink> = Arc::new(HeadlessGpu::new());
        let map = sample_heightmap(&layout, &gen, &sink, Surface::Plane, Vec2::ZERO, 64).unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut tree = QuadTree::new(ChildSeed::root(&layout, map), Vec2::ZERO, Surface::Plane, cancel.clone());
        tree.schedule(NodeId::ROOT);
        let req = tree.expand_request(NodeId::ROOT).unwrap();

        tree.cancel();
        assert_eq!(plan_children(&layout, &gen, &sink, &req).err(), Some(TerrainError::Canceled));
    }

    #[test]
    fn complete_tree_reaches_every_leaf() {
        let layout = layout(64, 3, 8, 1);
        let gen = HeightFieldGenerator::new(&Default::default()).unwrap();
        let sink: Arc<dyn TextureSink> = Arc::new(HeadlessGpu::new());
        let tree = build_complete(&layout, &gen, &sink, Vec2::new(-32.0, -32.0), Surface::Plane).unwrap();
        assert_eq!(tree.len(), 21);
        assert_eq!(tree.leaf_count(), 16);
        assert!(tree.ids().all(|id| {
            let n = tree.node(id);
            (n.level == 0) == (n.expansion == Expansion::Leaf)
        }));
    }
}
