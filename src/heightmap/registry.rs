// src/heightmap/registry.rs
// Process-wide index -> textures map. Written from worker threads (clean_up)
// and from whichever thread drops the last reference to a map.

use std::sync::RwLock;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::gpu::HeightMapTextures;

static REGISTRY: Lazy<RwLock<FxHashMap<u32, HeightMapTextures>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

pub(super) fn register(index: u32, textures: HeightMapTextures) {
    let mut map = REGISTRY.write().unwrap_or_else(|e| e.into_inner());
    map.insert(index, textures);
}

pub(super) fn unregister(index: u32) -> Option<HeightMapTextures> {
    let mut map = REGISTRY.write().unwrap_or_else(|e| e.into_inner());
    map.remove(&index)
}

/// Textures of a live heightmap, if `index` still names one.
pub fn lookup(index: u32) -> Option<HeightMapTextures> {
    let map = REGISTRY.read().unwrap_or_else(|e| e.into_inner());
    map.get(&index).copied()
}

pub fn live_count() -> usize {
    REGISTRY.read().unwrap_or_else(|e| e.into_inner()).len()
}
