use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use trellis_classpath::{ProjectContext, ViewKey, ViewKind};
use trellis_config::EngineConfig;
use trellis_jdk::ToolchainRegistry;
use trellis_project::{
    Dependency, DependencyScope, FileChange, PathEntry, ProjectSnapshot, Resolution,
    SourceRootKind,
};

use super::support::{
    artifact, compile_dep, config, context, coordinate, jdk17, jdk8, paths, toolchains,
};

fn snapshot_with_unresolved_b(repo: &Path) -> ProjectSnapshot {
    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.dependencies = vec![
        compile_dep("A", "1.0", artifact(repo, "A-1.0.jar")),
        Dependency::unresolved(coordinate("B", "2.0"), DependencyScope::Compile),
    ];
    snapshot
}

#[test]
fn unresolved_dependency_marks_compile_view_incomplete() {
    let repo = TempDir::new().unwrap();
    let ctx = context(snapshot_with_unresolved_b(repo.path()), repo.path());

    let view = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert_eq!(paths(view.entries()), vec![repo.path().join("A-1.0.jar")]);
    assert!(!view.is_complete());
    assert!(!view.is_degraded());
}

#[test]
fn resolving_a_dependency_completes_the_view() {
    let repo = TempDir::new().unwrap();
    let ctx = context(snapshot_with_unresolved_b(repo.path()), repo.path());
    let before = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert!(!before.is_complete());

    let invalidated = ctx
        .update_dependency(
            &coordinate("B", "2.0"),
            Resolution::Resolved {
                file: artifact(repo.path(), "B-2.0.jar"),
            },
        )
        .unwrap();
    assert!(!invalidated.is_empty());

    let after = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert_eq!(
        paths(after.entries()),
        vec![repo.path().join("A-1.0.jar"), repo.path().join("B-2.0.jar")]
    );
    assert!(after.is_complete());
    assert!(!ctx.is_current(
        ViewKey::new(ViewKind::Compile, SourceRootKind::Main),
        &before
    ));
}

#[test]
fn removing_the_unresolved_dependency_restores_completeness() {
    let repo = TempDir::new().unwrap();
    let mut snapshot = snapshot_with_unresolved_b(repo.path());
    snapshot
        .dependencies
        .push(compile_dep("C", "3.0", artifact(repo.path(), "C-3.0.jar")));
    let ctx = context(snapshot, repo.path());

    let before = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert!(!before.is_complete());

    ctx.remove_dependency(&coordinate("B", "2.0")).unwrap();

    let after = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert!(after.is_complete());
    assert_eq!(after.entries(), before.entries());
    assert_eq!(
        paths(after.entries()),
        vec![repo.path().join("A-1.0.jar"), repo.path().join("C-3.0.jar")]
    );
}

#[test]
fn resolved_artifacts_missing_on_disk_keep_their_entry() {
    let repo = TempDir::new().unwrap();
    let gone = repo.path().join("gone-1.0.jar");
    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.dependencies = vec![compile_dep("gone", "1.0", &gone)];
    let ctx = context(snapshot, repo.path());

    let view = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert_eq!(paths(view.entries()), vec![gone.clone()]);
    assert!(!view.is_complete());

    // The file appearing later is reported through the dependency update.
    fs::write(&gone, b"").unwrap();
    ctx.update_dependency(
        &coordinate("gone", "1.0"),
        Resolution::Resolved { file: gone.clone() },
    )
    .unwrap();
    assert!(ctx
        .view(ViewKind::Compile, SourceRootKind::Main)
        .is_complete());
}

#[test]
fn descriptor_moves_dependencies_to_the_module_path() {
    let project = TempDir::new().unwrap();
    let repo = TempDir::new().unwrap();
    let root = project.path();
    fs::create_dir_all(root.join("src/main")).unwrap();

    let mut snapshot = ProjectSnapshot::new(root);
    snapshot.source_roots = vec![trellis_project::SourceRoot::new(
        SourceRootKind::Main,
        root.join("src/main"),
    )];
    snapshot.dependencies = vec![compile_dep("A", "1.0", root.join("repo/A-1.0.jar"))];

    let ctx = ProjectContext::builder(snapshot)
        .config(EngineConfig {
            descriptor_file_name: "module-info.src".into(),
            ..config(repo.path())
        })
        .toolchains(toolchains())
        .build();

    assert!(ctx.view(ViewKind::ModulePath, SourceRootKind::Main).is_empty());
    assert_eq!(ctx.view(ViewKind::Compile, SourceRootKind::Main).len(), 1);

    let descriptor = root.join("src/main/module-info.src");
    fs::write(&descriptor, "module app { requires A; }").unwrap();
    ctx.apply_file_changes(&[FileChange::created(&descriptor)]);

    let module_path = ctx.view(ViewKind::ModulePath, SourceRootKind::Main);
    assert_eq!(
        paths(module_path.entries()),
        vec![root.join("repo/A-1.0.jar")]
    );
    assert!(ctx.view(ViewKind::Compile, SourceRootKind::Main).is_empty());
}

#[test]
fn unknown_toolchain_falls_back_to_the_default_and_is_degraded() {
    let repo = TempDir::new().unwrap();
    let mut registry = ToolchainRegistry::new();
    registry.register(jdk17().with_boot_entries(vec![PathEntry::archive("/jdk17/lib/jrt-fs.jar")]));
    registry.register(jdk8());

    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.toolchain = Some("jdk8".into());
    let ctx = ProjectContext::builder(snapshot)
        .config(config(repo.path()))
        .toolchains(registry)
        .build();

    let boot = ctx.view(ViewKind::Boot, SourceRootKind::Main);
    assert!(!boot.is_degraded());
    assert!(boot.contains("/jdk8/jre/lib/rt.jar".as_ref()));

    ctx.set_toolchain(Some("no-such-jdk".into())).unwrap();
    let fallback = ctx.view(ViewKind::Boot, SourceRootKind::Main);
    assert!(fallback.is_degraded());
    assert_eq!(
        paths(fallback.entries()),
        vec![PathBuf::from("/jdk17/lib/jrt-fs.jar")]
    );

    // Same entries as selecting the default explicitly, minus the flag.
    ctx.set_toolchain(None).unwrap();
    let default = ctx.view(ViewKind::Boot, SourceRootKind::Main);
    assert!(!default.is_degraded());
    assert_eq!(default.entries(), fallback.entries());
}
