// src/streaming/mod.rs
// Root paging + job plumbing + the per-frame streamer.

pub mod pager;
pub mod streamer;
pub mod types;

mod build;
mod stats;

pub use pager::{FrameSelection, PagerDelta, RootJob, RootOutcome, RootPager, RootSlot, SelectedTile};
pub use stats::BuildWindow;
pub use streamer::TerrainStreamer;
pub use types::*;
