//! Integration Tests
//!
//! End-to-end tests for the composition model and the job compiler.

use msubuild::compile::{compile, compile_variant, CompileSettings};
use msubuild::model::{
    ChildKind, NodeFields, NodeId, NodeTree, Project, ProjectDefaults, Song, TreeWarningKind, VariantOverlay,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// root
/// ├── sub_tracks: intro, loop
/// └── (loop) sub_channels: drums, bass
fn build_tree() -> (NodeTree, Vec<NodeId>) {
    let mut tree = NodeTree::new();
    let root = tree.root();
    let intro = tree.insert_child(root, ChildKind::Sequence, 0).unwrap();
    let body = tree.insert_child(root, ChildKind::Sequence, 1).unwrap();
    let drums = tree.insert_child(body, ChildKind::Mix, 0).unwrap();
    let bass = tree.insert_child(body, ChildKind::Mix, 1).unwrap();

    tree.set_fields(intro, NodeFields::with_file("intro.wav")).unwrap();
    tree.set_fields(drums, NodeFields::with_file("drums.wav")).unwrap();
    tree.set_fields(bass, NodeFields::with_file("bass.wav")).unwrap();

    (tree, vec![root, intro, body, drums, bass])
}

// === Model Invariants ===

#[test]
fn test_move_into_own_subtree_always_fails() {
    let (tree, ids) = build_tree();

    for &node in &ids[1..] {
        for descendant in tree.descendants(node) {
            if descendant == node {
                continue;
            }
            let mut attempt = tree.clone();
            let err = attempt
                .move_node(node, descendant, ChildKind::Sequence, 0)
                .unwrap_err();
            assert_eq!(err.error_code(), "CYCLE");
            assert_eq!(attempt, tree, "tree changed after rejected move");
        }
    }

    // The root has no parent to leave, whatever the target.
    for &target in &ids {
        let mut attempt = tree.clone();
        let err = attempt.move_node(tree.root(), target, ChildKind::Mix, 0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STRUCTURE");
        assert_eq!(attempt, tree);
    }
}

#[test]
fn test_move_between_branches() {
    let (mut tree, ids) = build_tree();
    let (root, intro, body, drums) = (ids[0], ids[1], ids[2], ids[3]);

    tree.move_node(drums, root, ChildKind::Sequence, 0).unwrap();

    assert_eq!(tree.node(drums).unwrap().parent(), Some(root));
    assert_eq!(tree.node(root).unwrap().children(ChildKind::Sequence), &[drums, intro, body]);
    assert_eq!(tree.node(body).unwrap().children(ChildKind::Mix).len(), 1);
}

#[test]
fn test_mixed_children_warn_but_compile() {
    let mut tree = NodeTree::new();
    let root = tree.root();
    let a = tree.insert_child(root, ChildKind::Sequence, 0).unwrap();
    let b = tree.insert_child(root, ChildKind::Mix, 0).unwrap();
    tree.set_fields(a, NodeFields::with_file("a.wav")).unwrap();
    tree.set_fields(b, NodeFields::with_file("b.wav")).unwrap();

    let warnings = tree.validate();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, TreeWarningKind::MixedChildren);

    let song = Song::new(1, "Mixed").with_output("mixed.pcm").with_tree(tree);
    let config = compile(&song, &ProjectDefaults::default());
    assert_eq!(config.warnings.len(), 1);
    assert_eq!(config.job.tracks[0].node.sub_tracks.len(), 1);
    assert_eq!(config.job.tracks[0].node.sub_channels.len(), 1);
}

// === Compiler Properties ===

#[test]
fn test_compile_is_deterministic_across_insert_order() {
    let (tree, _) = build_tree();
    let in_order = Song::new(3, "Order").with_output("order.pcm").with_tree(tree);

    // Same logical tree, children inserted back to front.
    let mut reversed = NodeTree::new();
    let root = reversed.root();
    let body = reversed.insert_child(root, ChildKind::Sequence, 0).unwrap();
    let intro = reversed.insert_child(root, ChildKind::Sequence, 0).unwrap();
    let bass = reversed.insert_child(body, ChildKind::Mix, 0).unwrap();
    let drums = reversed.insert_child(body, ChildKind::Mix, 0).unwrap();
    reversed.set_fields(bass, NodeFields::with_file("bass.wav")).unwrap();
    reversed.set_fields(drums, NodeFields::with_file("drums.wav")).unwrap();
    reversed.set_fields(intro, NodeFields::with_file("intro.wav")).unwrap();

    let mut other = Song::new(3, "Order").with_output("order.pcm").with_tree(reversed);
    other.id = in_order.id.clone();

    let defaults = ProjectDefaults::default();
    let first = compile(&in_order, &defaults).to_json().unwrap();
    let second = compile(&in_order, &defaults).to_json().unwrap();
    let third = compile(&other, &defaults).to_json().unwrap();

    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[test]
fn test_overlay_inherits_base_fields() {
    let mut song = Song::new(1, "Variant").with_output("variant.pcm");
    let root = song.root();
    song.set_fields(
        root,
        NodeFields {
            trim_start: Some(1000),
            fade_in: Some(500),
            ..NodeFields::with_file("base.wav")
        },
    )
    .unwrap();
    song.set_options(
        root,
        vec![VariantOverlay::new(
            1,
            NodeFields {
                loop_point: Some(4242),
                ..NodeFields::default()
            },
        )],
    )
    .unwrap();

    let config = compile_variant(&song, &ProjectDefaults::default(), &CompileSettings::default(), 1);
    let node = &config.job.tracks[0].node;

    assert_eq!(node.trim_start, Some(1000));
    assert_eq!(node.fade_in, Some(500));
    assert_eq!(node.loop_point, Some(4242));
    assert!(node.options.is_empty());

    // The sparse form keeps the overlay minimal.
    let sparse = compile(&song, &ProjectDefaults::default());
    let json = serde_json::to_value(&sparse.job).unwrap();
    assert_eq!(json["tracks"][0]["options"][0], serde_json::json!({"option": 1, "loop": 4242}));
}

// === Persistence ===

#[test]
fn test_project_round_trip_compiles_identically() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pack.json");

    let defaults = ProjectDefaults {
        game: "Super Metroid".to_string(),
        pack_name: Some("Round Trip".to_string()),
        normalization: Some(-20.0),
        ..ProjectDefaults::default()
    };
    let mut project = Project::new("Round Trip", defaults);
    project.project_path = path.clone();

    let (tree, _) = build_tree();
    let song = Song::new(5, "Brinstar").with_output("pack-5.pcm").with_tree(tree);
    let song_id = song.id.clone();
    project.track_mut(5, "Brinstar").add_song(song);
    project.save().unwrap();

    let loaded = Project::load(&path).unwrap();
    let before = compile(project.song(&song_id).unwrap(), &project.defaults)
        .to_json()
        .unwrap();
    let after = compile(loaded.song(&song_id).unwrap(), &loaded.defaults)
        .to_json()
        .unwrap();

    assert_eq!(before, after);
    assert_eq!(loaded.song(&song_id).unwrap().tree().len(), 5);
}
