pub mod beat_sync;
pub mod css_vars;
pub mod random;

pub use beat_sync::{BeatSyncConfig, BeatSyncMapper, SyncFrame};
pub use css_vars::CssVars;
pub use random::{FastRandom, FixedRandom, RandomSource};
