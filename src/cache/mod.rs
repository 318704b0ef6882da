//! Build Cache
//!
//! Decides whether a song's PCM file is still up to date so msupcm++ is only
//! run when the job description or the artifact changed.

pub mod entry;
pub mod store;

pub use entry::{content_hash, CacheEntry};
pub use store::GenerationCache;
