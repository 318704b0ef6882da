//! Songs and Tracks
//!
//! A track is a numbered slot of the target game. It owns one primary song and
//! any number of alternates, each with an independent mixing tree.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::{ChildKind, NodeFields, NodeId, VariantOverlay};
use super::tree::{NodeTree, TreeWarning};
use crate::error::Result;

/// One audio deliverable for a track slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// Stable identity, used as the generation cache key.
    pub id: String,

    pub track_number: u32,

    #[serde(default)]
    pub track_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Where the finished PCM goes unless the root node overrides it.
    #[serde(default)]
    pub output_path: PathBuf,

    #[serde(default)]
    pub is_alt: bool,

    pub last_modified: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_built: Option<DateTime<Utc>>,

    #[serde(default, rename = "msu_pcm_info")]
    tree: NodeTree,
}

impl Song {
    pub fn new(track_number: u32, track_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            track_number,
            track_name: track_name.into(),
            song_name: None,
            artist: None,
            album: None,
            url: None,
            output_path: PathBuf::new(),
            is_alt: false,
            last_modified: Utc::now(),
            last_built: None,
            tree: NodeTree::new(),
        }
    }

    pub fn with_output(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = output_path.into();
        self
    }

    pub fn with_tree(mut self, tree: NodeTree) -> Self {
        self.tree = tree;
        self.touch();
        self
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Mark the song as edited.
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    pub fn insert_child(&mut self, parent: NodeId, kind: ChildKind, position: usize) -> Result<NodeId> {
        let id = self.tree.insert_child(parent, kind, position)?;
        self.touch();
        Ok(id)
    }

    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        self.tree.remove_node(node)?;
        self.touch();
        Ok(())
    }

    pub fn move_node(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
        kind: ChildKind,
        position: usize,
    ) -> Result<()> {
        self.tree.move_node(node, new_parent, kind, position)?;
        self.touch();
        Ok(())
    }

    pub fn set_fields(&mut self, node: NodeId, fields: NodeFields) -> Result<()> {
        self.tree.set_fields(node, fields)?;
        self.touch();
        Ok(())
    }

    pub fn update_fields(&mut self, node: NodeId, edit: impl FnOnce(&mut NodeFields)) -> Result<()> {
        self.tree.update_fields(node, edit)?;
        self.touch();
        Ok(())
    }

    pub fn set_options(&mut self, node: NodeId, options: Vec<VariantOverlay>) -> Result<()> {
        self.tree.set_options(node, options)?;
        self.touch();
        Ok(())
    }

    pub fn validate(&self) -> Vec<TreeWarning> {
        self.tree.validate()
    }

    pub fn has_audio_files(&self) -> bool {
        !self.tree.files().is_empty()
    }

    /// Output path after the root-level override.
    pub fn resolved_output(&self) -> PathBuf {
        self.tree
            .root_node()
            .fields()
            .output
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| self.output_path.clone())
    }

    /// Edited since the last successful build, or never built.
    pub fn is_stale(&self) -> bool {
        match self.last_built {
            None => true,
            Some(built) => self.last_modified > built,
        }
    }

    /// Display name for messages: song name, else track name.
    pub fn display_name(&self) -> &str {
        self.song_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.track_name)
    }
}

/// A numbered slot of the target game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub number: u32,
    pub name: String,

    /// First song is the primary, the rest are alternates.
    #[serde(default)]
    pub songs: Vec<Song>,
}

impl Track {
    pub fn new(number: u32, name: impl Into<String>) -> Self {
        Self {
            number,
            name: name.into(),
            songs: Vec::new(),
        }
    }

    pub fn primary(&self) -> Option<&Song> {
        self.songs.first()
    }

    pub fn alternates(&self) -> &[Song] {
        self.songs.get(1..).unwrap_or(&[])
    }

    /// Append a song; it becomes the primary if the track was empty.
    pub fn add_song(&mut self, mut song: Song) -> &mut Song {
        song.track_number = self.number;
        song.track_name = self.name.clone();
        song.is_alt = !self.songs.is_empty();
        self.songs.push(song);
        let index = self.songs.len() - 1;
        &mut self.songs[index]
    }

    /// Remove a song by id. The next song is promoted if the primary goes.
    pub fn remove_song(&mut self, song_id: &str) -> Option<Song> {
        let index = self.songs.iter().position(|s| s.id == song_id)?;
        let removed = self.songs.remove(index);
        for (i, song) in self.songs.iter_mut().enumerate() {
            song.is_alt = i > 0;
        }
        Some(removed)
    }
}
