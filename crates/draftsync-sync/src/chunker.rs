//! Chunking of the draft queue into upload batches

use draftsync_core::config::SyncConfig;
use draftsync_core::domain::DraftRecord;

/// Bounds for adaptive chunk sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingSettings {
    pub base: usize,
    pub min: usize,
    pub max: usize,
}

impl ChunkingSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            base: config.chunk_size_base,
            min: config.chunk_size_min,
            max: config.chunk_size_max,
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Splits `drafts` into contiguous, order-preserving chunks of at most `size`
///
/// A `size` of zero is treated as one. An empty input yields no chunks.
pub fn chunk(drafts: Vec<DraftRecord>, size: usize) -> Vec<Vec<DraftRecord>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(drafts.len().div_ceil(size));
    let mut iter = drafts.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

/// Chunk size after `failed_attempts` consecutive failed runs
///
/// Halves the base size per failure, clamped to `[min, max]`.
pub fn adaptive_chunk_size(failed_attempts: u32, settings: &ChunkingSettings) -> usize {
    let shrunk = settings
        .base
        .checked_shr(failed_attempts)
        .unwrap_or_default();
    let min = settings.min.max(1);
    shrunk.clamp(min, settings.max.max(min))
}
