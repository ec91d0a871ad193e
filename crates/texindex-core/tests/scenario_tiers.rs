//! # Scenario Tier Tests (T0-T4)
//!
//! ## Tiers
//! - T0: Path Resolution
//! - T1: Instance Counting
//! - T2: Repoint and Rename
//! - T3: Event Ingestion
//! - T4: Reference Contexts and Real Disk

use texindex_core::{
    ContextId, FileState, FixedPolicy, Host, HostEvent, IndexConfig, IngestMode, MemoryFileSystem,
    MemoryWatcher, PathResolver, Propagation, ReferenceContext, ResolveRule, SceneHost,
    SceneObject, TexIndexError, TextureIndex,
};

const ATTR: &str = "fileTextureName";

type Index = TextureIndex<SceneHost, MemoryWatcher>;

fn index_over(fs: &MemoryFileSystem, host: SceneHost) -> Index {
    TextureIndex::new(
        host,
        MemoryWatcher::new(),
        Box::new(fs.clone()),
        Box::new(FixedPolicy(Propagation::Single)),
        IndexConfig::default(),
    )
    .expect("index")
}

fn context(root: &str, sub: &str) -> ReferenceContext {
    ReferenceContext {
        id: ContextId(0),
        name: "ROOT".to_string(),
        root_path: root.to_string(),
        resource_subfolder: sub.to_string(),
    }
}

// =============================================================================
// TIER T0: PATH RESOLUTION
// =============================================================================

mod t0_resolution {
    use super::*;

    /// T0.1: A bare file name falls back to the resource folder.
    #[test]
    fn resource_folder_fallback() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/proj/res/tex.png");

        let resolved = PathResolver::resolve("tex.png", &context("/proj", "res"), &fs);
        assert_eq!(resolved.path, "/proj/res/tex.png");
        assert_eq!(resolved.rule, ResolveRule::ResourceFolder);
    }

    /// T0.2: Workspace-relative beats the resource folder.
    #[test]
    fn workspace_relative_first() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/proj/maps/tex.png");
        fs.add_file("/proj/res/tex.png");

        let resolved = PathResolver::resolve("/maps/tex.png", &context("/proj", "res"), &fs);
        assert_eq!(resolved.path, "/proj/maps/tex.png");
        assert_eq!(resolved.rule, ResolveRule::WorkspaceRelative);
    }

    /// T0.3: Environment references are expanded.
    #[test]
    fn environment_expansion() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/library/stone.png");
        fs.set_env("TEXLIB", "/library");

        let resolved = PathResolver::resolve("$TEXLIB/stone.png", &context("/proj", "res"), &fs);
        assert_eq!(resolved.path, "/library/stone.png");
        assert_eq!(resolved.rule, ResolveRule::Environment);
    }

    /// T0.4: Exhausted rules keep the normalized raw value.
    #[test]
    fn unresolved_keeps_raw() {
        let fs = MemoryFileSystem::new();
        let resolved = PathResolver::resolve("maps\\gone.png", &context("/proj", "res"), &fs);
        assert_eq!(resolved.path, "maps/gone.png");
        assert!(!resolved.is_resolved());
    }
}

// =============================================================================
// TIER T1: INSTANCE COUNTING
// =============================================================================

mod t1_instances {
    use super::*;

    /// T1.1: Shared files are counted, and released one node at a time.
    #[test]
    fn add_and_remove_scenario() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/ws/a/b.png");
        let mut index = index_over(&fs, SceneHost::new("/ws"));
        assert_eq!(index.file_count(), 0);

        index.insert_node("tex1", "file", "a/b.png", None).expect("tex1");
        let file = index.file_of("tex1").expect("file").clone();
        assert_eq!(file.absolute_path, "/ws/a/b.png");
        assert_eq!(file.instance_count, 1);

        index.insert_node("tex2", "file", "a/b.png", None).expect("tex2");
        assert_eq!(index.file_of("tex2").map(|f| f.id), Some(file.id));
        assert_eq!(index.file(file.id).map(|f| f.instance_count), Some(2));

        index.remove("tex1").expect("remove tex1");
        assert_eq!(index.file(file.id).map(|f| f.instance_count), Some(1));

        index.remove("tex2").expect("remove tex2");
        assert!(index.file(file.id).is_none());
        assert_eq!(index.file_count(), 0);
        index.verify_invariants().expect("invariants");
    }

    /// T1.2: Duplicate names are refused and release the file again.
    #[test]
    fn duplicate_insert_refused() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/ws/a/b.png");
        let mut index = index_over(&fs, SceneHost::new("/ws"));
        index.insert_node("tex1", "file", "a/b.png", None).expect("tex1");
        let result = index.insert_node("tex1", "file", "/ws/other.png", None);
        assert!(matches!(result, Err(TexIndexError::DuplicateName(_))));
        assert_eq!(index.file_count(), 1);
        index.verify_invariants().expect("invariants");
    }

    /// T1.3: State counts group rows by file state.
    #[test]
    fn state_counts() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/ws/sourceimages/a.png");
        fs.add_read_only("/ws/sourceimages/b.png");
        let mut host = SceneHost::new("/ws");
        host.add_texture("a", "file", ATTR, "a.png");
        host.add_texture("b", "file", ATTR, "b.png");
        host.add_texture("c", "file", ATTR, "c.png");
        let index = index_over(&fs, host);

        let counts = index.state_counts();
        assert_eq!(counts.get(&FileState::Writable), Some(&1));
        assert_eq!(counts.get(&FileState::ReadOnly), Some(&1));
        assert_eq!(counts.get(&FileState::Missing), Some(&1));
    }
}

// =============================================================================
// TIER T2: REPOINT AND RENAME
// =============================================================================

mod t2_mutations {
    use super::*;

    fn shared_scene(fs: &MemoryFileSystem) -> Index {
        fs.add_file("/ws/a/b.png");
        fs.add_file("/ws/c/d.png");
        let mut host = SceneHost::new("/ws");
        host.add_texture("tex1", "file", ATTR, "a/b.png");
        host.add_texture("tex2", "file", ATTR, "a/b.png");
        index_over(fs, host)
    }

    /// T2.1: Repointing the sole user replaces the row.
    #[test]
    fn repoint_sole_user() {
        let fs = MemoryFileSystem::new();
        let mut index = shared_scene(&fs);
        index.remove("tex1").expect("remove");
        let old = index.file_of("tex2").map(|f| f.id).expect("old");

        index.repoint("tex2", "c/d.png").expect("repoint");
        assert!(index.file(old).is_none());
        let new = index.file_of("tex2").expect("new");
        assert_eq!(new.absolute_path, "/ws/c/d.png");
        assert_eq!(new.instance_count, 1);
        assert!(!index.watcher().is_watched("/ws/a/b.png"));
        assert!(index.watcher().is_watched("/ws/c/d.png"));
    }

    /// T2.2: A refused host write changes nothing.
    #[test]
    fn repoint_atomicity() {
        let fs = MemoryFileSystem::new();
        let mut index = shared_scene(&fs);
        let before: Vec<_> = index.files().iter().cloned().collect();
        let node_before = index.node_by_name("tex1").cloned();

        index.host_mut().reject_writes("tex1");
        let result = index.repoint("tex1", "c/d.png");
        assert!(matches!(result, Err(TexIndexError::HostRejected { .. })));

        let after: Vec<_> = index.files().iter().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(index.node_by_name("tex1").cloned(), node_before);
        assert!(!index.watcher().is_watched("/ws/c/d.png"));
    }

    /// T2.3: Renaming onto a live name fails and keeps both names.
    #[test]
    fn rename_uniqueness() {
        let fs = MemoryFileSystem::new();
        let mut index = shared_scene(&fs);
        let result = index.rename("tex2", "tex1");
        assert!(matches!(result, Err(TexIndexError::DuplicateName(_))));
        assert!(index.node_by_name("tex1").is_some());
        assert!(index.node_by_name("tex2").is_some());
        assert!(index.host().object_type("tex2").is_some());
    }

    /// T2.4: The instance group follows the propagation answer.
    #[test]
    fn propagation_answer_applies() {
        let fs = MemoryFileSystem::new();
        let mut index = shared_scene(&fs);
        index.set_policy(Box::new(FixedPolicy(Propagation::Cancel)));
        assert_eq!(index.repoint("tex1", "c/d.png").expect("repoint"), 1);
        assert_eq!(index.instance_group("tex2").len(), 1);

        index.set_policy(Box::new(FixedPolicy(Propagation::All)));
        assert_eq!(index.repoint("tex2", "c/d.png").expect("repoint"), 1);
        assert_eq!(index.instance_group("tex1").len(), 2);
        index.verify_invariants().expect("invariants");
    }
}

// =============================================================================
// TIER T3: EVENT INGESTION
// =============================================================================

mod t3_events {
    use super::*;

    /// T3.1: Host-side renames migrate the selection.
    #[test]
    fn rename_migrates_selection() {
        let fs = MemoryFileSystem::new();
        let mut host = SceneHost::new("/ws");
        host.add_texture("tex1", "file", ATTR, "a.png");
        host.add_object("lambert1", SceneObject::new("lambert"));
        host.add_object("lambert1SG", SceneObject::new("shadingEngine"));
        host.connect("tex1", "lambert1");
        host.connect("lambert1", "lambert1SG");
        let mut index = index_over(&fs, host);

        index.host_mut().select(&["lambert1"]);
        index.pump(IngestMode::Live);
        assert!(index.selection().admits("tex1"));
        assert!(index.selection().is_active());

        index.host_mut().rename("tex1", "wood").expect("rename");
        index.pump(IngestMode::Live);
        assert!(index.selection().admits("wood"));
        assert!(index.node_by_name("wood").is_some());
    }

    /// T3.2: Suspended ingestion drops everything but resets.
    #[test]
    fn suspended_mode() {
        let fs = MemoryFileSystem::new();
        let mut index = index_over(&fs, SceneHost::new("/ws"));
        let added = index
            .ingest(
                HostEvent::NodeAdded {
                    name: "tex1".into(),
                },
                IngestMode::Suspended,
            )
            .expect("ingest");
        assert!(!added);

        index.host_mut().add_texture("tex1", "file", ATTR, "a.png");
        let reset = index
            .ingest(HostEvent::DocumentReset, IngestMode::Suspended)
            .expect("reset");
        assert!(reset);
        assert_eq!(index.node_count(), 1);
    }

    /// T3.3: Events for unknown or untracked objects are ignored.
    #[test]
    fn unknown_objects_ignored() {
        let fs = MemoryFileSystem::new();
        let mut index = index_over(&fs, SceneHost::new("/ws"));
        index.host_mut().add_object("blinn1", SceneObject::new("blinn"));
        assert_eq!(index.pump(IngestMode::Live), 0);
        let renamed = index
            .ingest(
                HostEvent::NodeRenamed {
                    old_name: "ghost".into(),
                    new_name: "spirit".into(),
                },
                IngestMode::Live,
            )
            .expect("ingest");
        assert!(!renamed);
        assert_eq!(index.node_count(), 0);
    }

    /// T3.4: A failing watch does not block indexing.
    #[test]
    fn watch_failure_is_soft() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/ws/sourceimages/a.png");
        let mut watcher = MemoryWatcher::new();
        watcher.fail_on("/ws/sourceimages/a.png");
        let mut host = SceneHost::new("/ws");
        host.add_texture("tex1", "file", ATTR, "a.png");
        let index = TextureIndex::new(
            host,
            watcher,
            Box::new(fs.clone()),
            Box::new(FixedPolicy(Propagation::Single)),
            IndexConfig::default(),
        )
        .expect("index");
        assert_eq!(index.node_count(), 1);
        assert!(index.watches().is_empty());
    }
}

// =============================================================================
// TIER T4: REFERENCE CONTEXTS AND REAL DISK
// =============================================================================

mod t4_contexts {
    use super::*;
    use texindex_core::{FileSystem, OsFileSystem};

    /// T4.1: Referenced nodes resolve against their own workspace.
    #[test]
    fn reference_context_discovery() {
        let fs = MemoryFileSystem::new();
        fs.write("/lib/props/workspace.mel", r#"workspace -fr "sourceImages" "maps";"#);
        fs.add_file("/lib/props/maps/crate.png");
        fs.add_file("/lib/props/scenes/crate.ma");

        let mut host = SceneHost::new("/ws");
        host.add_reference("propsRN", "/lib/props/scenes/crate.ma");
        let mut object = SceneObject::new("file").with_attribute(ATTR, "crate.png");
        object.reference = Some("propsRN".into());
        host.add_object("props:crateTex", object);
        let mut index = index_over(&fs, host);

        assert_eq!(index.context_count(), 2);
        let context = index.contexts().by_name("propsRN").expect("context");
        assert_eq!(context.root_path, "/lib/props");
        assert_eq!(context.resource_subfolder, "maps");
        assert_eq!(
            index.file_of("props:crateTex").map(|f| f.absolute_path.as_str()),
            Some("/lib/props/maps/crate.png")
        );
        assert!(matches!(
            index.repoint("props:crateTex", "other.png"),
            Err(TexIndexError::NodeLocked(_))
        ));
    }

    /// T4.2: A scene on real disk, including read-only detection.
    #[test]
    fn os_file_system() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_string_lossy().replace('\\', "/");
        let images = dir.path().join("sourceimages");
        std::fs::create_dir_all(&images).expect("mkdir");
        std::fs::write(images.join("wood.png"), b"png").expect("write");

        let mut host = SceneHost::new(&root);
        host.add_texture("wood", "file", ATTR, "wood.png");
        host.add_texture("gone", "file", ATTR, "sourceimages/gone.png");
        let mut index = TextureIndex::new(
            host,
            MemoryWatcher::new(),
            Box::new(OsFileSystem),
            Box::new(FixedPolicy(Propagation::Single)),
            IndexConfig::default(),
        )
        .expect("index");

        let wood = index.file_of("wood").expect("wood").clone();
        assert_eq!(wood.state, FileState::Writable);
        assert!(OsFileSystem.is_file(&wood.absolute_path));
        assert_eq!(index.file_of("gone").map(|f| f.state), Some(FileState::Missing));

        let ids = vec![index.node_id("wood").expect("id")];
        assert_eq!(index.toggle_read_only(&ids).expect("toggle"), 1);
        assert_eq!(index.file_of("wood").map(|f| f.state), Some(FileState::ReadOnly));
        index.toggle_read_only(&ids).expect("toggle back");
        assert_eq!(index.file_of("wood").map(|f| f.state), Some(FileState::Writable));
    }
}
