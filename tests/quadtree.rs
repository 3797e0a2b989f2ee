use std::sync::Arc;

use glam::{UVec2, Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use terrain_stream::config::{GeneratorConfig, TerrainConfig, Topology, TreeLayout};
use terrain_stream::gpu::{HeadlessGpu, TextureSink};
use terrain_stream::quadtree::{build_complete, sample_heightmap, ChildSeed, NodeId, QuadTree, SelectionMap};
use terrain_stream::world::{CubeFace, Surface};
use terrain_stream::HeightFieldGenerator;

fn layout(root: u32, levels: u32, ranges: Vec<f32>) -> TreeLayout {
    TerrainConfig {
        topology: Topology::Flat,
        root_dimension: root,
        lod_levels: levels,
        lod_ranges: ranges,
        heightmap_resolution: 16,
        heightmap_span: 2,
        ..Default::default()
    }
    .layout()
    .unwrap()
}

fn sink() -> Arc<dyn TextureSink> {
    Arc::new(HeadlessGpu::new())
}

fn complete(layout: &TreeLayout, gen: &GeneratorConfig) -> QuadTree {
    let gen = HeightFieldGenerator::new(gen).unwrap();
    build_complete(layout, &gen, &sink(), Vec2::ZERO, Surface::Plane).unwrap()
}

fn leaves(tree: &QuadTree) -> Vec<NodeId> {
    tree.ids().filter(|&id| tree.node(id).children.is_none()).collect()
}

#[test]
fn complete_tree_has_expected_node_counts() {
    for levels in 1..=4u32 {
        let root = 8u32 << (levels - 1);
        let ranges = (0..levels).map(|i| 10.0 * (i + 1) as f32).collect();
        let tree = complete(&layout(root, levels, ranges), &GeneratorConfig::default());

        let leaves_expected = 4usize.pow(levels - 1);
        let nodes_expected = (4usize.pow(levels) - 1) / 3;
        assert_eq!(tree.leaf_count(), leaves_expected, "levels = {levels}");
        assert_eq!(tree.len(), nodes_expected, "levels = {levels}");
        assert!(leaves(&tree).iter().all(|&id| tree.node(id).level == 0));
    }
}

#[test]
fn leaves_tile_the_root_exactly() {
    let layout = layout(64, 4, vec![10.0, 20.0, 40.0, 80.0]);
    assert_eq!(layout.leaf_dimension, 8);
    let tree = complete(&layout, &GeneratorConfig::default());

    let mut hits = [[0u32; 8]; 8];
    for id in leaves(&tree) {
        let n = tree.node(id);
        assert_eq!(n.dimension, 8);
        assert_eq!(n.offset.x % 8, 0);
        assert_eq!(n.offset.y % 8, 0);
        hits[(n.offset.y / 8) as usize][(n.offset.x / 8) as usize] += 1;
    }
    assert!(hits.iter().flatten().all(|&h| h == 1), "{hits:?}");
}

#[test]
fn extents_propagate_bottom_up() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..4 {
        let gen = GeneratorConfig {
            octaves: rng.gen_range(1..8),
            amplitude: rng.gen_range(1.0f32..150.0),
            roughness: rng.gen_range(0.2f32..0.9),
            seed: Some(rng.gen()),
            height_offset: rng.gen_range(-20.0f32..20.0),
        };
        let tree = complete(&layout(64, 4, vec![10.0, 20.0, 40.0, 80.0]), &gen);

        for id in tree.ids() {
            let n = tree.node(id);
            assert!(n.min_height <= n.max_height);
            let Some(children) = n.children else { continue };

            let lo = children.iter().map(|&c| tree.node(c).min_height).fold(f32::INFINITY, f32::min);
            let hi = children.iter().map(|&c| tree.node(c).max_height).fold(f32::NEG_INFINITY, f32::max);
            assert_eq!(n.min_height, lo, "node {id:?}");
            assert_eq!(n.max_height, hi, "node {id:?}");
        }

        // The root bounds are exactly the leaf bounds.
        let all = leaves(&tree);
        let lo = all.iter().map(|&c| tree.node(c).min_height).fold(f32::INFINITY, f32::min);
        let hi = all.iter().map(|&c| tree.node(c).max_height).fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(tree.root().min_height, lo);
        assert_eq!(tree.root().max_height, hi);
    }
}

/// Number of times each leaf-sized cell is covered by a selected node.
fn coverage(tree: &QuadTree, leaf: u32, cells: usize, out: &SelectionMap) -> Vec<u32> {
    let mut hits = vec![0u32; cells * cells];
    for s in out.values().flatten() {
        let n = tree.node(s.node);
        let span = n.dimension / leaf;
        let UVec2 { x, y } = n.offset / leaf;
        for cy in y..y + span {
            for cx in x..x + span {
                hits[cy as usize * cells + cx as usize] += 1;
            }
        }
    }
    hits
}

#[test]
fn selection_covers_root_without_gaps_or_overlap() {
    let layout = layout(64, 4, vec![10.0, 20.0, 40.0, 80.0]);
    let flat = GeneratorConfig { amplitude: 2.0, ..Default::default() };
    let mut tree = complete(&layout, &flat);

    for cz in (-40..=104).step_by(12) {
        for cx in (-40..=104).step_by(12) {
            let camera = Vec3::new(cx as f32, 3.0, cz as f32);
            let mut out = SelectionMap::new();
            let mut queue = Vec::new();
            let selected = tree.lod_select(&layout.ranges, camera, &mut out, &mut queue);
            assert!(queue.is_empty());

            if !selected {
                assert!(out.is_empty());
                continue;
            }
            let hits = coverage(&tree, 8, 8, &out);
            assert!(hits.iter().all(|&h| h == 1), "camera {camera}: {hits:?}");

            for s in out.values().flatten() {
                let level = tree.node(s.node).level;
                assert!(s.draw_level == level || s.draw_level == level + 1);
            }
        }
    }
}

#[test]
fn unexpanded_root_still_covers_its_area() {
    let layout = layout(64, 4, vec![10.0, 20.0, 40.0, 80.0]);
    let gen = HeightFieldGenerator::new(&GeneratorConfig { amplitude: 2.0, ..Default::default() }).unwrap();
    let map = sample_heightmap(&layout, &gen, &sink(), Surface::Plane, Vec2::ZERO, 64).unwrap();
    let mut tree = QuadTree::new(ChildSeed::root(&layout, map), Vec2::ZERO, Surface::Plane, Arc::default());

    let mut out = SelectionMap::new();
    let mut queue = Vec::new();
    assert!(tree.lod_select(&layout.ranges, Vec3::new(30.0, 1.0, 30.0), &mut out, &mut queue));
    assert_eq!(queue, vec![NodeId::ROOT]);
    assert!(coverage(&tree, 8, 8, &out).iter().all(|&h| h == 1));
}

#[test]
fn node_beyond_its_band_is_rejected() {
    let layout = layout(64, 4, vec![10.0, 20.0, 40.0, 80.0]);
    let mut tree = complete(&layout, &GeneratorConfig { amplitude: 2.0, ..Default::default() });

    // ~60 units from the nearest edge: inside ranges[3], outside ranges[2].
    let camera = Vec3::new(124.0, 0.0, 32.0);
    let mut out = SelectionMap::new();
    let mut queue = Vec::new();
    assert!(!tree.lod_select_node(NodeId::ROOT, &layout.ranges, 2, camera, &mut out, &mut queue));
    assert!(out.is_empty());
    assert!(queue.is_empty());

    assert!(tree.lod_select_node(NodeId::ROOT, &layout.ranges, 3, camera, &mut out, &mut queue));
    assert_eq!(out.values().flatten().count(), 1);
}

fn sphere_trees(radius: f32) -> (TreeLayout, Vec<QuadTree>) {
    let layout = TerrainConfig {
        topology: Topology::CubeSphere { radius },
        root_dimension: 64,
        lod_levels: 4,
        lod_ranges: vec![8.0, 16.0, 32.0, 50.0],
        heightmap_resolution: 16,
        heightmap_span: 2,
        generator: GeneratorConfig { amplitude: 1.0, ..Default::default() },
        ..Default::default()
    }
    .layout()
    .unwrap();
    let gen = HeightFieldGenerator::new(&GeneratorConfig { amplitude: 1.0, ..Default::default() }).unwrap();
    let sink = sink();
    let trees = CubeFace::ALL
        .iter()
        .map(|&face| {
            let surface = Surface::CubeFace { face, radius, face_size: 64.0 };
            build_complete(&layout, &gen, &sink, Vec2::ZERO, surface).unwrap()
        })
        .collect();
    (layout, trees)
}

#[test]
fn cube_sphere_selects_terrain_at_face_edges_and_corners() {
    let (layout, mut trees) = sphere_trees(500.0);
    let (_, hi) = HeightFieldGenerator::new(&GeneratorConfig { amplitude: 1.0, ..Default::default() })
        .unwrap()
        .bounds();

    let cameras = [
        Vec3::new(1.0, 1.0, 0.0),  // PosX/PosY edge midpoint
        Vec3::new(0.0, -1.0, 1.0), // NegY/PosZ edge midpoint
        Vec3::new(1.0, 1.0, 1.0),  // corner of three faces
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(0.0, 0.0, 1.0), // face centre
    ];
    for dir in cameras {
        let camera = dir.normalize() * (500.0 + hi + 2.0);
        let mut tiles = 0;
        for tree in &mut trees {
            let mut out = SelectionMap::new();
            let mut queue = Vec::new();
            if tree.lod_select(&layout.ranges, camera, &mut out, &mut queue) {
                assert!(coverage(tree, 8, 8, &out).iter().all(|&h| h == 1));
                tiles += out.values().flatten().count();
            }
            assert!(queue.is_empty());
        }
        assert!(tiles > 0, "nothing selected under {camera}");
    }
}
