//! Audio Node
//!
//! A single unit of the mixing tree. Every parameter is optional: an unset
//! field means "let msupcm++ decide", so fields are never default-filled.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::tree::NodeSpec;

/// Stable identifier of a node inside one song's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which child list of a node an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    /// Sub-tracks: concatenated end to end.
    Sequence,
    /// Sub-channels: mixed together.
    Mix,
}

impl ChildKind {
    /// Name of the list in the msupcm++ job schema.
    pub fn schema_name(&self) -> &'static str {
        match self {
            ChildKind::Sequence => "sub_tracks",
            ChildKind::Mix => "sub_channels",
        }
    }
}

/// User-set parameters of a node.
///
/// Sample offsets and durations are in samples at 44.1 kHz.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFields {
    /// Input file. A node with a file is a leaf.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Final output file, only honored on the root node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_point: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_start: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_end: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_in: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fade_out: Option<u64>,

    /// Cross fade from the end of the track back to the loop point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_fade: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pad_start: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pad_end: Option<u64>,

    /// Tempo ratio, 1.0 leaves the tempo unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,

    /// RMS normalization target in dBFS, overrides the project default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalization: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<bool>,

    /// Per-song dither override, consulted by the per-track dither policies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dither: Option<bool>,

    /// Selects one of the node's variant overlays.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_option: Option<u32>,
}

impl NodeFields {
    /// Leaf node reading a single file.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Apply `overlay` on top of `self`, field by field.
    ///
    /// A field set on the overlay wins; a field left unset inherits the base value.
    pub fn overlay(&self, overlay: &NodeFields) -> NodeFields {
        NodeFields {
            file: overlay.file.clone().or_else(|| self.file.clone()),
            output: overlay.output.clone().or_else(|| self.output.clone()),
            loop_point: overlay.loop_point.or(self.loop_point),
            trim_start: overlay.trim_start.or(self.trim_start),
            trim_end: overlay.trim_end.or(self.trim_end),
            fade_in: overlay.fade_in.or(self.fade_in),
            fade_out: overlay.fade_out.or(self.fade_out),
            cross_fade: overlay.cross_fade.or(self.cross_fade),
            pad_start: overlay.pad_start.or(self.pad_start),
            pad_end: overlay.pad_end.or(self.pad_end),
            tempo: overlay.tempo.or(self.tempo),
            normalization: overlay.normalization.or(self.normalization),
            compression: overlay.compression.or(self.compression),
            dither: overlay.dither.or(self.dither),
            use_option: overlay.use_option.or(self.use_option),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn has_file(&self) -> bool {
        self.file.as_ref().is_some_and(|f| !f.as_os_str().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        *self == NodeFields::default()
    }
}

/// An alternate definition of a node, sparse-merged over the node itself.
///
/// Unset fields fall back to the node's own. A child list left as `None`
/// inherits the node's children; `Some` replaces that list for this option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOverlay {
    /// Index matched against `use_option`.
    pub option: u32,

    #[serde(flatten)]
    pub fields: NodeFields,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_tracks: Option<Vec<NodeSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_channels: Option<Vec<NodeSpec>>,
}

impl VariantOverlay {
    pub fn new(option: u32, fields: NodeFields) -> Self {
        Self {
            option,
            fields,
            sub_tracks: None,
            sub_channels: None,
        }
    }

    pub fn with_children(mut self, kind: ChildKind, children: Vec<NodeSpec>) -> Self {
        match kind {
            ChildKind::Sequence => self.sub_tracks = Some(children),
            ChildKind::Mix => self.sub_channels = Some(children),
        }
        self
    }

    /// Replacement list for `kind`, if this option declares one.
    pub fn children(&self, kind: ChildKind) -> Option<&[NodeSpec]> {
        match kind {
            ChildKind::Sequence => self.sub_tracks.as_deref(),
            ChildKind::Mix => self.sub_channels.as_deref(),
        }
    }
}

/// A node of the mixing tree as stored in a [`NodeTree`](super::NodeTree) arena.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioNode {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) fields: NodeFields,
    pub(crate) sub_tracks: Vec<NodeId>,
    pub(crate) sub_channels: Vec<NodeId>,
    pub(crate) options: Vec<VariantOverlay>,
}

impl AudioNode {
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>) -> Self {
        Self {
            id,
            parent,
            fields: NodeFields::default(),
            sub_tracks: Vec::new(),
            sub_channels: Vec::new(),
            options: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn fields(&self) -> &NodeFields {
        &self.fields
    }

    pub fn options(&self) -> &[VariantOverlay] {
        &self.options
    }

    /// Children in the given list, in play order.
    pub fn children(&self, kind: ChildKind) -> &[NodeId] {
        match kind {
            ChildKind::Sequence => &self.sub_tracks,
            ChildKind::Mix => &self.sub_channels,
        }
    }

    pub(crate) fn children_mut(&mut self, kind: ChildKind) -> &mut Vec<NodeId> {
        match kind {
            ChildKind::Sequence => &mut self.sub_tracks,
            ChildKind::Mix => &mut self.sub_channels,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.fields.has_file()
    }

    pub fn has_children(&self) -> bool {
        !self.sub_tracks.is_empty() || !self.sub_channels.is_empty()
    }

    /// Both child lists populated; msupcm++ cannot render such a node.
    pub fn has_mixed_children(&self) -> bool {
        !self.sub_tracks.is_empty() && !self.sub_channels.is_empty()
    }

    /// Overlay with the given option index, if declared.
    pub fn option(&self, option: u32) -> Option<&VariantOverlay> {
        self.options.iter().find(|o| o.option == option)
    }
}
