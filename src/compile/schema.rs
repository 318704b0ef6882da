//! msupcm++ Job Schema
//!
//! Serializable shape of the JSON document msupcm++ consumes. Unset fields are
//! skipped, never written as `null`, so msupcm++ applies its own defaults.
//! Field order here is the order in the serialized output.

use serde::{Deserialize, Serialize};

/// Parameters of a track, sub-track, or sub-channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_point: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_start: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_end: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_fade: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad_start: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad_end: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_option: Option<u32>,

    /// Files concatenated to form this node's input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_tracks: Vec<NodeRecord>,

    /// Files mixed together to form this node's input.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_channels: Vec<NodeRecord>,

    /// Sparse alternates, ordered by option index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionRecord>,
}

/// A variant overlay: only the fields the alternate overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRecord {
    pub option: u32,

    #[serde(flatten)]
    pub record: NodeRecord,
}

/// Top-level entry of the `tracks` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_number: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(flatten)]
    pub node: NodeRecord,
}

/// Complete msupcm++ job description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    /// Target game.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<String>,

    /// Pack display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Prefix for output files, followed by `-<track number>.pcm`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_prefix: Option<String>,

    /// Global RMS normalization in dBFS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dither: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_temps: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_track: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_track: Option<u32>,

    pub tracks: Vec<TrackRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unset_fields_are_omitted() {
        let job = JobDescription {
            game: Some("Super Metroid".to_string()),
            pack: None,
            artist: None,
            url: None,
            output_prefix: None,
            normalization: None,
            dither: None,
            verbosity: Some(2),
            keep_temps: None,
            first_track: Some(1),
            last_track: Some(1),
            tracks: vec![TrackRecord {
                track_number: 1,
                title: None,
                node: NodeRecord {
                    file: Some("title.wav".to_string()),
                    options: vec![OptionRecord {
                        option: 2,
                        record: NodeRecord {
                            loop_point: Some(800),
                            ..NodeRecord::default()
                        },
                    }],
                    ..NodeRecord::default()
                },
            }],
        };

        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(
            json,
            r#"{"game":"Super Metroid","verbosity":2,"first_track":1,"last_track":1,"tracks":[{"track_number":1,"file":"title.wav","options":[{"option":2,"loop":800}]}]}"#
        );
        assert!(!json.contains("null"));
    }
}
