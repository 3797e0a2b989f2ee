// src/quadtree/lod.rs
//
// Distance-band LOD selection. Ranges nest (range[i] < range[i + 1]), so a
// node either covers its whole area itself or hands it to its children, and
// the selected set tiles every root within reach with no gaps or overlap.

use std::collections::BTreeMap;

use glam::Vec3;

use super::{NodeId, QuadTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub node: NodeId,
    /// LOD band to draw at. Equals the node's own level except for
    /// placeholders, which take their parent's level.
    pub draw_level: u32,
}

/// Selected nodes grouped by heightmap index.
pub type SelectionMap = BTreeMap<u32, Vec<Selection>>;

impl QuadTree {
    /// Select from the root at the root's own level.
    pub fn lod_select(
        &mut self,
        ranges: &[f32],
        camera: Vec3,
        out: &mut SelectionMap,
        creation_queue: &mut Vec<NodeId>,
    ) -> bool {
        let level = self.root().level;
        self.lod_select_node(NodeId::ROOT, ranges, level, camera, out, creation_queue)
    }

    /// Returns `false` when the node lies outside `ranges[lod_level]`; the
    /// caller is then responsible for that area. A `lod_level` with no range
    /// entry is treated as out of range.
    pub fn lod_select_node(
        &mut self,
        id: NodeId,
        ranges: &[f32],
        lod_level: u32,
        camera: Vec3,
        out: &mut SelectionMap,
        creation_queue: &mut Vec<NodeId>,
    ) -> bool {
        let Some(&range) = ranges.get(lod_level as usize) else {
            return false;
        };
        let dist_sq = self.bounds(id).distance_sq(camera);
        if dist_sq > range * range {
            return false;
        }

        if lod_level == 0 {
            self.emit(id, lod_level, out);
            return true;
        }

        let finer = ranges[lod_level as usize - 1];
        if dist_sq > finer * finer {
            self.emit(id, lod_level, out);
            return true;
        }

        match self.node(id).children {
            Some(children) => {
                for child in children {
                    if !self.lod_select_node(child, ranges, lod_level - 1, camera, out, creation_queue) {
                        self.emit(child, lod_level, out);
                    }
                }
            }
            None => {
                if self.schedule(id) {
                    creation_queue.push(id);
                }
                self.emit(id, lod_level, out);
            }
        }
        true
    }

    fn emit(&self, id: NodeId, draw_level: u32, out: &mut SelectionMap) {
        out.entry(self.node(id).map.index())
            .or_default()
            .push(Selection { node: id, draw_level });
    }
}
