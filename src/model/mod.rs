//! Composition Model
//!
//! In-memory description of how each song's source files are combined:
//! a tree of audio nodes per song, grouped into tracks and a project.

pub mod node;
pub mod project;
pub mod song;
pub mod tree;

pub use node::{AudioNode, ChildKind, NodeFields, NodeId, VariantOverlay};
pub use project::{DitherPolicy, Project, ProjectDefaults};
pub use song::{Song, Track};
pub use tree::{NodeSpec, NodeTree, TreeWarning, TreeWarningKind};
