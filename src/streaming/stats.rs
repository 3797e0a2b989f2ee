// src/streaming/stats.rs
use rustc_hash::FxHashSet;

use super::streamer::TerrainStreamer;
use super::types::StreamStats;

/// Counters accumulated between two `stats()` calls.
#[derive(Clone, Debug, Default)]
pub struct BuildWindow {
    pub roots_built: u32,
    pub roots_failed: u32,
    pub roots_evicted: u32,
    pub expansions_done: u32,
    pub expansions_failed: u32,
    pub stale_dropped: u32,

    pub builds: u32,
    pub build_ms_sum: f64,
    pub build_ms_max: f64,
}

impl BuildWindow {
    #[inline]
    pub fn record_build(&mut self, build_ms: f64) {
        self.builds += 1;
        self.build_ms_sum += build_ms;
        self.build_ms_max = self.build_ms_max.max(build_ms);
    }

    #[inline]
    pub fn drain(&mut self) -> Self {
        std::mem::take(self)
    }
}

pub(crate) fn stats(s: &mut TerrainStreamer) -> StreamStats {
    let mut out = StreamStats::default();

    out.center = s.pager.center().map(|c| (c.x, c.y));

    let (live, pending, vacant) = s.pager.counts();
    out.roots_live = live;
    out.roots_pending = pending;
    out.roots_vacant = vacant;

    out.in_flight = s.in_flight as u32;
    out.done_backlog = s.rx_done.len() as u32;
    out.nodes = s.pager.live_trees().map(|(_, t)| t.len() as u32).sum();
    // Distinct maps referenced by this streamer's trees; the global registry
    // also holds other streamers' maps.
    let mut maps = FxHashSet::default();
    for (_, tree) in s.pager.live_trees() {
        maps.extend(tree.ids().map(|id| tree.node(id).map.index()));
    }
    out.heightmaps_live = maps.len() as u32;

    out.terrain_tiles = s.last_tiles.0;
    out.water_tiles = s.last_tiles.1;

    let w = s.window.drain();
    out.roots_built = w.roots_built;
    out.roots_failed = w.roots_failed;
    out.roots_evicted = w.roots_evicted;
    out.expansions_done = w.expansions_done;
    out.expansions_failed = w.expansions_failed;
    out.stale_dropped = w.stale_dropped;
    if w.builds > 0 {
        out.build_ms_avg = w.build_ms_sum / w.builds as f64;
        out.build_ms_max = w.build_ms_max;
    }

    out
}
