//! msubuild - MSU-1 Audio Pack Build Pipeline
//!
//! Turns declarative per-song mixing trees into msupcm++ job descriptions and
//! builds the resulting PCM files in parallel, skipping songs whose artifact is
//! still current.
//!
//! # Architecture
//!
//! - `model`: projects, tracks, songs and their audio node trees
//! - `compile`: lowers a song's tree into an msupcm++ job description
//! - `cache`: per-song fingerprints of the last successful build
//! - `build`: bounded worker pool driving the external compiler

pub mod build;
pub mod cache;
pub mod cli;
pub mod compile;
pub mod error;
pub mod model;

pub use error::{MsuError, Result};
