//! MSU-1 PCM artifact checks.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{MsuError, Result};

pub const MSU_MAGIC: &[u8; 4] = b"MSU1";
pub const HEADER_LEN: u64 = 8;
/// 16-bit stereo frame.
pub const FRAME_LEN: u64 = 4;

/// Check the `MSU1` header and that the loop point lands inside the audio.
///
/// Returns the number of sample frames after the header.
pub fn validate_artifact(path: &Path) -> Result<u64> {
    let invalid = |reason: &str| MsuError::InvalidArtifact {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut file = File::open(path).map_err(|e| MsuError::FileReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let len = file
        .metadata()
        .map_err(|e| MsuError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();

    let mut header = [0u8; HEADER_LEN as usize];
    if len < HEADER_LEN || file.read_exact(&mut header).is_err() {
        return Err(invalid("Bad Header"));
    }
    if &header[..4] != MSU_MAGIC {
        return Err(invalid("Bad Header"));
    }

    let loop_point = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
    let frames = (len - HEADER_LEN) / FRAME_LEN;
    if loop_point >= frames {
        return Err(invalid("Bad loop point specified"));
    }
    Ok(frames)
}

/// Build an artifact image, used by tests and fake compilers.
pub fn encode_artifact(loop_point: u32, frames: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN as usize + frames * FRAME_LEN as usize);
    bytes.extend_from_slice(MSU_MAGIC);
    bytes.extend_from_slice(&loop_point.to_le_bytes());
    bytes.resize(HEADER_LEN as usize + frames * FRAME_LEN as usize, 0);
    bytes
}
