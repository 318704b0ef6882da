//! Node Tree
//!
//! Arena of [`AudioNode`]s for one song. Nodes are addressed by [`NodeId`] and
//! store their parent as an id, so ancestry walks never need back-references.
//! Ids are never reused within a tree.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::node::{AudioNode, ChildKind, NodeFields, NodeId, VariantOverlay};
use crate::error::{MsuError, Result};

/// What is wrong with a node found by [`NodeTree::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeWarningKind {
    /// Sub-tracks and sub-channels on the same node.
    MixedChildren,
    /// A node that reads a file and also has children.
    LeafWithChildren,
}

/// Advisory problem in a tree. Does not block compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeWarning {
    pub node: NodeId,
    /// Location such as `root.sub_tracks[1]`.
    pub path: String,
    pub kind: TreeWarningKind,
}

impl fmt::Display for TreeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TreeWarningKind::MixedChildren => write!(
                f,
                "{}: sub-tracks and sub-channels can't be at the same level and be generated by msupcm++",
                self.path
            ),
            TreeWarningKind::LeafWithChildren => write!(
                f,
                "{}: node has an input file and children; the children will be ignored",
                self.path
            ),
        }
    }
}

/// Recursive, serializable form of a tree, as stored in project files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(flatten)]
    pub fields: NodeFields,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_tracks: Vec<NodeSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_channels: Vec<NodeSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<VariantOverlay>,
}

impl NodeSpec {
    pub fn leaf(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            fields: NodeFields::with_file(path),
            ..Self::default()
        }
    }

    /// Input files of this subtree, overlays included, pre-order.
    pub fn files(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        self.collect_files(&mut out);
        out
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a Path>) {
        out.extend(self.fields.file().filter(|_| self.fields.has_file()));
        for child in self.sub_tracks.iter().chain(&self.sub_channels) {
            child.collect_files(out);
        }
        overlay_files(&self.options, out);
    }
}

fn overlay_files<'a>(options: &'a [VariantOverlay], out: &mut Vec<&'a Path>) {
    for overlay in options {
        out.extend(overlay.fields.file().filter(|_| overlay.fields.has_file()));
        for kind in [ChildKind::Sequence, ChildKind::Mix] {
            for child in overlay.children(kind).unwrap_or_default() {
                child.collect_files(out);
            }
        }
    }
}

/// The mixing tree of one song. Always has a root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NodeSpec", into = "NodeSpec")]
pub struct NodeTree {
    /// Slot `i` holds the node with id `base + i`.
    nodes: Vec<Option<AudioNode>>,
    base: u32,
    root: NodeId,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    /// Create a tree holding a single empty root node.
    pub fn new() -> Self {
        let root = NodeId(0);
        Self {
            nodes: vec![Some(AudioNode::new(root, None))],
            base: 0,
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &AudioNode {
        // The root slot is only ever replaced, never emptied.
        self.node(self.root)
            .unwrap_or_else(|| unreachable!("tree root is always present"))
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        let root = self.root_node();
        !root.has_children() && root.fields.is_empty() && root.options.is_empty()
    }

    fn slot(&self, id: NodeId) -> Option<usize> {
        id.0.checked_sub(self.base).map(|i| i as usize)
    }

    pub fn node(&self, id: NodeId) -> Option<&AudioNode> {
        self.slot(id)
            .and_then(|i| self.nodes.get(i))
            .and_then(|n| n.as_ref())
    }

    pub fn get(&self, id: NodeId) -> Result<&AudioNode> {
        self.node(id).ok_or(MsuError::NodeNotFound { node: id })
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut AudioNode> {
        self.slot(id)
            .and_then(|i| self.nodes.get_mut(i))
            .and_then(|n| n.as_mut())
            .ok_or(MsuError::NodeNotFound { node: id })
    }

    fn next_id(&self) -> NodeId {
        NodeId(self.base + self.nodes.len() as u32)
    }

    fn alloc(&mut self, parent: Option<NodeId>) -> NodeId {
        let id = self.next_id();
        self.nodes.push(Some(AudioNode::new(id, parent)));
        id
    }

    /// Insert a new empty node into `parent`'s `kind` list at `position`.
    ///
    /// Positions past the end append. Fails if `parent` reads a file.
    pub fn insert_child(
        &mut self,
        parent: NodeId,
        kind: ChildKind,
        position: usize,
    ) -> Result<NodeId> {
        let parent_node = self.get(parent)?;
        if parent_node.is_leaf() {
            return Err(MsuError::invalid_structure(format!(
                "node {} has an input file and cannot gain {}",
                parent,
                kind.schema_name()
            )));
        }

        let id = self.alloc(Some(parent));
        let list = self.get_mut(parent)?.children_mut(kind);
        let position = position.min(list.len());
        list.insert(position, id);
        Ok(id)
    }

    /// Detach `node` and drop its whole subtree.
    ///
    /// Removing the root replaces it with a fresh empty root.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        let parent = self.get(node)?.parent;

        let Some(parent) = parent else {
            *self = Self::starting_at(self.next_id());
            return Ok(());
        };

        for id in self.descendants(node) {
            if let Some(slot) = self.slot(id).and_then(|i| self.nodes.get_mut(i)) {
                *slot = None;
            }
        }

        let parent_node = self.get_mut(parent)?;
        parent_node.sub_tracks.retain(|&c| c != node);
        parent_node.sub_channels.retain(|&c| c != node);
        Ok(())
    }

    /// Fresh tree whose root takes id `root`, so stale ids held by callers
    /// never alias a new node.
    fn starting_at(root: NodeId) -> Self {
        Self {
            nodes: vec![Some(AudioNode::new(root, None))],
            base: root.0,
            root,
        }
    }

    /// Move the subtree rooted at `node` into `new_parent`'s `kind` list.
    ///
    /// The root cannot be moved. Fails with [`MsuError::Cycle`] when
    /// `new_parent` is `node` or one of its descendants; the tree is left
    /// unchanged on any error.
    pub fn move_node(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
        kind: ChildKind,
        position: usize,
    ) -> Result<()> {
        let old_parent = self.get(node)?.parent;
        let target = self.get(new_parent)?;

        let Some(old_parent) = old_parent else {
            return Err(MsuError::invalid_structure("the root node cannot be moved"));
        };
        if self.is_ancestor_or_self(node, new_parent) {
            return Err(MsuError::Cycle {
                node,
                target: new_parent,
            });
        }
        if target.is_leaf() {
            return Err(MsuError::invalid_structure(format!(
                "node {} has an input file and cannot gain {}",
                new_parent,
                kind.schema_name()
            )));
        }

        let old = self.get_mut(old_parent)?;
        old.sub_tracks.retain(|&c| c != node);
        old.sub_channels.retain(|&c| c != node);

        let list = self.get_mut(new_parent)?.children_mut(kind);
        let position = position.min(list.len());
        list.insert(position, node);

        self.get_mut(node)?.parent = Some(new_parent);
        Ok(())
    }

    /// True if `ancestor` is `node` or lies on the path from `node` to the root.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    /// `node` and everything below it, pre-order, sub-tracks before sub-channels.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(n) = self.node(id) else { continue };
            out.push(id);
            for &child in n.sub_channels.iter().rev() {
                stack.push(child);
            }
            for &child in n.sub_tracks.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Parent, list, and index of `node` within that list.
    pub fn position_of(&self, node: NodeId) -> Option<(NodeId, ChildKind, usize)> {
        let parent = self.node(node)?.parent?;
        let parent_node = self.node(parent)?;
        for kind in [ChildKind::Sequence, ChildKind::Mix] {
            if let Some(index) = parent_node.children(kind).iter().position(|&c| c == node) {
                return Some((parent, kind, index));
            }
        }
        None
    }

    /// Human readable location of `node`, e.g. `root.sub_channels[0].sub_tracks[2]`.
    pub fn path_of(&self, node: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = node;
        while let Some((parent, kind, index)) = self.position_of(current) {
            segments.push(format!("{}[{}]", kind.schema_name(), index));
            current = parent;
        }
        segments.push("root".to_string());
        segments.reverse();
        segments.join(".")
    }

    /// Replace all fields of `node`.
    ///
    /// Giving a file to a node that has children is rejected.
    pub fn set_fields(&mut self, node: NodeId, fields: NodeFields) -> Result<()> {
        let target = self.get(node)?;
        if fields.has_file() && target.has_children() {
            return Err(MsuError::invalid_structure(format!(
                "node {} has children and cannot read an input file",
                node
            )));
        }
        self.get_mut(node)?.fields = fields;
        Ok(())
    }

    /// Edit the fields of `node` in place, with the same checks as [`set_fields`](Self::set_fields).
    pub fn update_fields(&mut self, node: NodeId, edit: impl FnOnce(&mut NodeFields)) -> Result<()> {
        let mut fields = self.get(node)?.fields.clone();
        edit(&mut fields);
        self.set_fields(node, fields)
    }

    /// Replace the variant overlays of `node`. Option indices must be unique.
    pub fn set_options(&mut self, node: NodeId, mut options: Vec<VariantOverlay>) -> Result<()> {
        options.sort_by_key(|o| o.option);
        if let Some(pair) = options.windows(2).find(|w| w[0].option == w[1].option) {
            return Err(MsuError::invalid_structure(format!(
                "node {} declares option {} more than once",
                node, pair[0].option
            )));
        }
        self.get_mut(node)?.options = options;
        Ok(())
    }

    /// Walk the tree and report every node msupcm++ could not render.
    pub fn validate(&self) -> Vec<TreeWarning> {
        let mut warnings = Vec::new();
        for id in self.descendants(self.root) {
            let Some(node) = self.node(id) else { continue };
            if node.has_mixed_children() {
                warnings.push(TreeWarning {
                    node: id,
                    path: self.path_of(id),
                    kind: TreeWarningKind::MixedChildren,
                });
            } else if node.is_leaf() && node.has_children() {
                warnings.push(TreeWarning {
                    node: id,
                    path: self.path_of(id),
                    kind: TreeWarningKind::LeafWithChildren,
                });
            }
        }
        warnings
    }

    /// Every input file referenced by the tree, overlays included, pre-order.
    pub fn files(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        for node in self.descendants(self.root).into_iter().filter_map(|id| self.node(id)) {
            out.extend(node.fields.file().filter(|_| node.fields.has_file()));
            overlay_files(&node.options, &mut out);
        }
        out
    }

    /// Recursive form of the subtree rooted at `node`.
    pub fn to_spec(&self, node: NodeId) -> Result<NodeSpec> {
        let n = self.get(node)?;
        Ok(NodeSpec {
            fields: n.fields.clone(),
            sub_tracks: n
                .sub_tracks
                .iter()
                .map(|&c| self.to_spec(c))
                .collect::<Result<_>>()?,
            sub_channels: n
                .sub_channels
                .iter()
                .map(|&c| self.to_spec(c))
                .collect::<Result<_>>()?,
            options: n.options.clone(),
        })
    }

    fn graft(&mut self, parent: Option<NodeId>, spec: NodeSpec) -> NodeId {
        let id = self.alloc(parent);
        let sub_tracks: Vec<NodeId> = spec
            .sub_tracks
            .into_iter()
            .map(|c| self.graft(Some(id), c))
            .collect();
        let sub_channels: Vec<NodeId> = spec
            .sub_channels
            .into_iter()
            .map(|c| self.graft(Some(id), c))
            .collect();

        let mut options = spec.options;
        options.sort_by_key(|o| o.option);

        if let Ok(node) = self.get_mut(id) {
            node.fields = spec.fields;
            node.sub_tracks = sub_tracks;
            node.sub_channels = sub_channels;
            node.options = options;
        }
        id
    }
}

impl From<NodeSpec> for NodeTree {
    /// Builds the tree as-is; invalid shapes are kept and surface through
    /// [`NodeTree::validate`].
    fn from(spec: NodeSpec) -> Self {
        let mut tree = NodeTree {
            nodes: Vec::new(),
            base: 0,
            root: NodeId(0),
        };
        tree.root = tree.graft(None, spec);
        tree
    }
}

impl From<NodeTree> for NodeSpec {
    fn from(tree: NodeTree) -> Self {
        tree.to_spec(tree.root).unwrap_or_default()
    }
}
