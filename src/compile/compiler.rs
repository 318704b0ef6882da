//! Config Compiler
//!
//! Lowers a song's mixing tree plus the project defaults into an msupcm++ job
//! description. Compilation is a pure function of the logical tree: children
//! are emitted in list order and overlays in option order, so the same tree
//! always serializes to the same bytes.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::schema::{JobDescription, NodeRecord, OptionRecord, TrackRecord};
use crate::error::Result;
use crate::model::{
    ChildKind, NodeFields, NodeId, NodeSpec, NodeTree, Project, ProjectDefaults, Song, TreeWarning,
    VariantOverlay,
};

/// Default msupcm++ verbosity level.
pub const DEFAULT_VERBOSITY: u8 = 2;

/// Knobs that shape a job description but are not part of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileSettings {
    pub verbosity: u8,
    pub keep_temps: bool,
    /// Relative input files are resolved against this directory.
    pub base_dir: Option<PathBuf>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            verbosity: DEFAULT_VERBOSITY,
            keep_temps: false,
            base_dir: None,
        }
    }
}

/// Job description for one song, ready to hash and hand to msupcm++.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledConfig {
    pub song_id: String,
    pub job: JobDescription,
    /// Structural problems found while compiling. Advisory only.
    pub warnings: Vec<TreeWarning>,
}

impl CompiledConfig {
    /// Canonical serialized form. These bytes are what the cache hashes.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.job)?)
    }

    /// Output file named by the root track record.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.job
            .tracks
            .first()
            .and_then(|t| t.node.output.as_ref())
            .map(PathBuf::from)
    }

    /// Copy of the job that writes its artifact to `path` instead.
    pub fn with_output(&self, path: &Path) -> JobDescription {
        let mut job = self.job.clone();
        for track in &mut job.tracks {
            track.node.output = Some(path.to_string_lossy().to_string());
        }
        job
    }
}

/// Compile one song with default settings.
pub fn compile(song: &Song, defaults: &ProjectDefaults) -> CompiledConfig {
    compile_with(song, defaults, &CompileSettings::default())
}

/// Compile one song into a single-track job description.
pub fn compile_with(song: &Song, defaults: &ProjectDefaults, settings: &CompileSettings) -> CompiledConfig {
    let warnings = song.validate();
    for warning in &warnings {
        debug!("Song {}: {}", song.id, warning);
    }

    let mut job = job_header(defaults, settings);
    job.dither = defaults
        .dither_policy
        .resolve(defaults.dither, song.tree().root_node().fields().dither);
    job.first_track = Some(song.track_number);
    job.last_track = Some(song.track_number);
    job.tracks = vec![track_record(song, defaults, settings, None)];

    CompiledConfig {
        song_id: song.id.clone(),
        job,
        warnings,
    }
}

/// Compile one song with the overlay `option` applied at every node that
/// declares it. The result carries no `options` arrays.
pub fn compile_variant(
    song: &Song,
    defaults: &ProjectDefaults,
    settings: &CompileSettings,
    option: u32,
) -> CompiledConfig {
    let mut config = compile_with(song, defaults, settings);
    config.job.tracks = vec![track_record(song, defaults, settings, Some(option))];
    config
}

/// Compile every song of the project into one pack-wide job description.
///
/// Songs with an empty tree are left out.
pub fn compile_project(project: &Project, settings: &CompileSettings) -> JobDescription {
    let defaults = &project.defaults;
    let mut job = job_header(defaults, settings);

    if defaults.dither_policy.is_per_song() {
        warn!("Per-song dither cannot be expressed in a pack-wide job file; leaving dither unset");
        job.dither = None;
    } else {
        job.dither = defaults.dither_policy.resolve(defaults.dither, None);
    }

    job.first_track = project.tracks.iter().map(|t| t.number).min();
    job.last_track = project.tracks.iter().map(|t| t.number).max();
    job.tracks = project
        .songs()
        .filter(|s| !s.tree().is_empty())
        .map(|s| track_record(s, defaults, settings, None))
        .collect();
    job
}

fn job_header(defaults: &ProjectDefaults, settings: &CompileSettings) -> JobDescription {
    JobDescription {
        game: Some(defaults.game.clone()).filter(|g| !g.is_empty()),
        pack: defaults.pack_name.clone(),
        artist: defaults.artist.clone(),
        url: defaults.url.clone(),
        output_prefix: defaults
            .output_prefix
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
        normalization: defaults.normalization,
        dither: None,
        verbosity: Some(settings.verbosity),
        keep_temps: settings.keep_temps.then_some(true),
        first_track: None,
        last_track: None,
        tracks: Vec::new(),
    }
}

fn track_record(
    song: &Song,
    defaults: &ProjectDefaults,
    settings: &CompileSettings,
    variant: Option<u32>,
) -> TrackRecord {
    let tree = song.tree();
    let mut node = node_record(tree, tree.root(), settings, variant);

    let output = song.resolved_output();
    node.output = (!output.as_os_str().is_empty()).then(|| output.to_string_lossy().to_string());
    if node.normalization.is_none() {
        node.normalization = defaults.normalization;
    }

    TrackRecord {
        track_number: song.track_number,
        title: Some(song.track_name.clone()).filter(|t| !t.is_empty()),
        node,
    }
}

/// Emit the record for `id` and its subtree.
fn node_record(tree: &NodeTree, id: NodeId, settings: &CompileSettings, variant: Option<u32>) -> NodeRecord {
    match tree.to_spec(id) {
        Ok(spec) => spec_record(&spec, settings, variant),
        Err(_) => NodeRecord::default(),
    }
}

/// With `variant` set, the matching overlay is merged in at every level,
/// replacing child lists it declares, and no `options` are emitted.
fn spec_record(spec: &NodeSpec, settings: &CompileSettings, variant: Option<u32>) -> NodeRecord {
    let overlay = variant.and_then(|option| spec.options.iter().find(|o| o.option == option));

    let fields = match overlay {
        Some(overlay) => spec.fields.overlay(&overlay.fields),
        None => spec.fields.clone(),
    };

    let mut record = fields_record(&fields, settings);
    record.sub_tracks = child_list(spec, overlay, ChildKind::Sequence)
        .iter()
        .map(|c| spec_record(c, settings, variant))
        .collect();
    record.sub_channels = child_list(spec, overlay, ChildKind::Mix)
        .iter()
        .map(|c| spec_record(c, settings, variant))
        .collect();

    if variant.is_some() {
        record.use_option = None;
    } else {
        let mut options: Vec<&VariantOverlay> = spec.options.iter().collect();
        options.sort_by_key(|o| o.option);
        record.options = options.into_iter().map(|o| option_record(o, settings)).collect();
    }
    record
}

fn child_list<'a>(spec: &'a NodeSpec, overlay: Option<&'a VariantOverlay>, kind: ChildKind) -> &'a [NodeSpec] {
    let own = match kind {
        ChildKind::Sequence => spec.sub_tracks.as_slice(),
        ChildKind::Mix => spec.sub_channels.as_slice(),
    };
    overlay.and_then(|o| o.children(kind)).unwrap_or(own)
}

/// Sparse form of an overlay; child lists appear only when it replaces them.
fn option_record(overlay: &VariantOverlay, settings: &CompileSettings) -> OptionRecord {
    let mut record = fields_record(&overlay.fields, settings);
    let emit = |kind: ChildKind| -> Vec<NodeRecord> {
        overlay
            .children(kind)
            .unwrap_or_default()
            .iter()
            .map(|c| spec_record(c, settings, None))
            .collect()
    };
    record.sub_tracks = emit(ChildKind::Sequence);
    record.sub_channels = emit(ChildKind::Mix);
    OptionRecord {
        option: overlay.option,
        record,
    }
}

/// Only the fields that are set; dither lives on the job, not the node.
fn fields_record(fields: &NodeFields, settings: &CompileSettings) -> NodeRecord {
    NodeRecord {
        file: fields
            .file()
            .filter(|f| !f.as_os_str().is_empty())
            .map(|f| resolve_path(f, settings.base_dir.as_deref())),
        output: fields
            .output
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().to_string()),
        loop_point: fields.loop_point,
        trim_start: fields.trim_start,
        trim_end: fields.trim_end,
        fade_in: fields.fade_in,
        fade_out: fields.fade_out,
        cross_fade: fields.cross_fade,
        pad_start: fields.pad_start,
        pad_end: fields.pad_end,
        tempo: fields.tempo,
        normalization: fields.normalization,
        compression: fields.compression,
        use_option: fields.use_option,
        sub_tracks: Vec::new(),
        sub_channels: Vec::new(),
        options: Vec::new(),
    }
}

fn resolve_path(path: &Path, base_dir: Option<&Path>) -> String {
    match base_dir {
        Some(base) if path.is_relative() => base.join(path).to_string_lossy().to_string(),
        _ => path.to_string_lossy().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DitherPolicy;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn defaults() -> ProjectDefaults {
        ProjectDefaults {
            game: "A Link to the Past".to_string(),
            pack_name: Some("Orchestral".to_string()),
            normalization: Some(-25.0),
            ..ProjectDefaults::default()
        }
    }

    fn leaf_song() -> Song {
        let mut song = Song::new(2, "Title").with_output("alttp-2.pcm");
        let root = song.root();
        song.set_fields(
            root,
            NodeFields {
                file: Some(PathBuf::from("title.flac")),
                loop_point: Some(44100),
                ..NodeFields::default()
            },
        )
        .unwrap();
        song
    }

    #[test]
    fn test_compile_leaf_song() {
        let config = compile(&leaf_song(), &defaults());
        let json = config.to_json().unwrap();
        let expected = r#"{
  "game": "A Link to the Past",
  "pack": "Orchestral",
  "normalization": -25.0,
  "verbosity": 2,
  "first_track": 2,
  "last_track": 2,
  "tracks": [
    {
      "track_number": 2,
      "title": "Title",
      "file": "title.flac",
      "output": "alttp-2.pcm",
      "loop": 44100,
      "normalization": -25.0
    }
  ]
}"#;
        assert_eq!(json, expected);
        assert_eq!(config.output_path(), Some(PathBuf::from("alttp-2.pcm")));
    }

    #[test]
    fn test_root_normalization_overrides_default() {
        let mut song = leaf_song();
        let root = song.root();
        song.update_fields(root, |f| f.normalization = Some(-18.5)).unwrap();

        let config = compile(&song, &defaults());
        let root_record = &config.job.tracks[0].node;
        assert_relative_eq!(root_record.normalization.unwrap(), -18.5);
        assert_relative_eq!(config.job.normalization.unwrap(), -25.0);
    }

    #[test]
    fn test_child_normalization_is_not_filled() {
        let mut song = Song::new(1, "Intro").with_output("intro.pcm");
        let root = song.root();
        let child = song.insert_child(root, ChildKind::Sequence, 0).unwrap();
        song.set_fields(child, NodeFields::with_file("a.wav")).unwrap();

        let config = compile(&song, &defaults());
        let record = &config.job.tracks[0].node;
        assert_eq!(record.normalization, Some(-25.0));
        assert_eq!(record.sub_tracks[0].normalization, None);
        assert_eq!(record.sub_tracks[0].file.as_deref(), Some("a.wav"));
    }

    #[test]
    fn test_compile_is_independent_of_insert_order() {
        let mut first = Song::new(1, "Intro").with_output("intro.pcm");
        let root = first.root();
        let a = first.insert_child(root, ChildKind::Mix, 0).unwrap();
        let b = first.insert_child(root, ChildKind::Mix, 1).unwrap();
        first.set_fields(a, NodeFields::with_file("a.wav")).unwrap();
        first.set_fields(b, NodeFields::with_file("b.wav")).unwrap();

        let mut second = Song::new(1, "Intro").with_output("intro.pcm");
        let root = second.root();
        let b = second.insert_child(root, ChildKind::Mix, 0).unwrap();
        second.set_fields(b, NodeFields::with_file("b.wav")).unwrap();
        let a = second.insert_child(root, ChildKind::Mix, 0).unwrap();
        second.set_fields(a, NodeFields::with_file("a.wav")).unwrap();

        let d = defaults();
        assert_eq!(
            compile(&first, &d).to_json().unwrap(),
            compile(&second, &d).to_json().unwrap()
        );
        assert_eq!(
            compile(&first, &d).to_json().unwrap(),
            compile(&first, &d).to_json().unwrap()
        );
    }

    #[test]
    fn test_options_are_sparse_and_ordered() {
        let mut song = leaf_song();
        let root = song.root();
        song.set_options(
            root,
            vec![
                VariantOverlay::new(
                    3,
                    NodeFields {
                        trim_end: Some(9000),
                        ..NodeFields::default()
                    },
                ),
                VariantOverlay::new(
                    1,
                    NodeFields {
                        loop_point: Some(100),
                        ..NodeFields::default()
                    },
                ),
            ],
        )
        .unwrap();

        let config = compile(&song, &defaults());
        let options = &config.job.tracks[0].node.options;
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].option, 1);
        assert_eq!(options[0].record.loop_point, Some(100));
        assert_eq!(options[0].record.file, None);
        assert_eq!(options[1].option, 3);
        assert_eq!(options[1].record.trim_end, Some(9000));
    }

    #[test]
    fn test_compile_variant_merges_overlay() {
        let mut song = Song::new(4, "Boss").with_output("boss.pcm");
        let root = song.root();
        song.set_fields(
            root,
            NodeFields {
                file: Some(PathBuf::from("boss.wav")),
                trim_start: Some(1000),
                fade_in: Some(500),
                loop_point: Some(20),
                ..NodeFields::default()
            },
        )
        .unwrap();
        song.set_options(
            root,
            vec![VariantOverlay::new(
                1,
                NodeFields {
                    loop_point: Some(7777),
                    ..NodeFields::default()
                },
            )],
        )
        .unwrap();

        let config = compile_variant(&song, &defaults(), &CompileSettings::default(), 1);
        let record = &config.job.tracks[0].node;
        assert_eq!(record.trim_start, Some(1000));
        assert_eq!(record.fade_in, Some(500));
        assert_eq!(record.loop_point, Some(7777));
        assert!(record.options.is_empty());

        let missing = compile_variant(&song, &defaults(), &CompileSettings::default(), 9);
        assert_eq!(missing.job.tracks[0].node.loop_point, Some(20));
    }

    fn song_with_alternate_children() -> Song {
        let mut song = Song::new(6, "Ridley").with_output("ridley.pcm");
        let root = song.root();
        let intro = song.insert_child(root, ChildKind::Sequence, 0).unwrap();
        let body = song.insert_child(root, ChildKind::Sequence, 1).unwrap();
        song.set_fields(intro, NodeFields::with_file("intro.wav")).unwrap();
        song.set_fields(body, NodeFields::with_file("body.wav")).unwrap();
        song.set_options(
            root,
            vec![
                VariantOverlay::new(
                    1,
                    NodeFields {
                        loop_point: Some(300),
                        ..NodeFields::default()
                    },
                )
                .with_children(
                    ChildKind::Sequence,
                    vec![NodeSpec::leaf("remix-intro.wav"), NodeSpec::leaf("remix-body.wav")],
                ),
                VariantOverlay::new(
                    2,
                    NodeFields {
                        trim_end: Some(900),
                        ..NodeFields::default()
                    },
                ),
            ],
        )
        .unwrap();
        song
    }

    #[test]
    fn test_options_emit_replacement_children() {
        let config = compile(&song_with_alternate_children(), &defaults());
        let record = &config.job.tracks[0].node;

        assert_eq!(record.sub_tracks.len(), 2);
        let remix = &record.options[0].record;
        assert_eq!(remix.loop_point, Some(300));
        let files: Vec<_> = remix.sub_tracks.iter().map(|r| r.file.as_deref()).collect();
        assert_eq!(files, vec![Some("remix-intro.wav"), Some("remix-body.wav")]);
        assert!(record.options[1].record.sub_tracks.is_empty());

        let json = serde_json::to_value(&config.job).unwrap();
        assert_eq!(
            json["tracks"][0]["options"][1],
            serde_json::json!({"option": 2, "trim_end": 900})
        );
    }

    #[test]
    fn test_compile_variant_uses_overlay_children() {
        let song = song_with_alternate_children();
        let settings = CompileSettings::default();

        let remix = compile_variant(&song, &defaults(), &settings, 1);
        let record = &remix.job.tracks[0].node;
        let files: Vec<_> = record.sub_tracks.iter().map(|r| r.file.as_deref()).collect();
        assert_eq!(files, vec![Some("remix-intro.wav"), Some("remix-body.wav")]);
        assert_eq!(record.loop_point, Some(300));
        assert!(record.options.is_empty());

        // No child list on option 2, so the base children are kept.
        let trimmed = compile_variant(&song, &defaults(), &settings, 2);
        let record = &trimmed.job.tracks[0].node;
        let files: Vec<_> = record.sub_tracks.iter().map(|r| r.file.as_deref()).collect();
        assert_eq!(files, vec![Some("intro.wav"), Some("body.wav")]);
        assert_eq!(record.trim_end, Some(900));
    }

    #[test]
    fn test_dither_policy_on_job() {
        let mut song = leaf_song();
        let root = song.root();
        song.update_fields(root, |f| f.dither = Some(false)).unwrap();

        let mut d = defaults();
        d.dither_policy = DitherPolicy::DefaultOn;
        assert_eq!(compile(&song, &d).job.dither, Some(false));

        d.dither_policy = DitherPolicy::All;
        assert_eq!(compile(&song, &d).job.dither, Some(true));

        d.dither_policy = DitherPolicy::Default;
        assert_eq!(compile(&song, &d).job.dither, None);
    }

    #[test]
    fn test_relative_files_resolved_against_base_dir() {
        let settings = CompileSettings {
            base_dir: Some(PathBuf::from("/music")),
            ..CompileSettings::default()
        };
        let config = compile_with(&leaf_song(), &defaults(), &settings);
        let file = config.job.tracks[0].node.file.clone().unwrap();
        assert_eq!(PathBuf::from(file), Path::new("/music").join("title.flac"));
    }

    #[test]
    fn test_mixed_children_still_compile() {
        let mut song = Song::new(1, "Intro").with_output("intro.pcm");
        let root = song.root();
        let seq = song.insert_child(root, ChildKind::Sequence, 0).unwrap();
        let mix = song.insert_child(root, ChildKind::Mix, 0).unwrap();
        song.set_fields(seq, NodeFields::with_file("a.wav")).unwrap();
        song.set_fields(mix, NodeFields::with_file("b.wav")).unwrap();

        let config = compile(&song, &defaults());
        assert_eq!(config.warnings.len(), 1);
        let record = &config.job.tracks[0].node;
        assert_eq!(record.sub_tracks.len(), 1);
        assert_eq!(record.sub_channels.len(), 1);
    }

    #[test]
    fn test_staging_output_does_not_change_compiled_job() {
        let config = compile(&leaf_song(), &defaults());
        let staged = config.with_output(Path::new("/tmp/work/temp.pcm"));
        assert_eq!(staged.tracks[0].node.output.as_deref(), Some("/tmp/work/temp.pcm"));
        assert_eq!(config.output_path(), Some(PathBuf::from("alttp-2.pcm")));
    }
}
