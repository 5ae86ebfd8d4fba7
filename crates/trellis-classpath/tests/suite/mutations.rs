use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use trellis_classpath::{
    DescriptorPersistence, MutationError, PersistError, ProjectContext, ViewKey, ViewKind,
};
use trellis_jdk::ToolchainRegistry;
use trellis_project::{
    CompilerConfig, Dependency, DependencyScope, OutputDir, ProjectMutation, ProjectSnapshot,
    SourceRootKind,
};

use super::support::{compile_dep, config, context, coordinate, jdk8, paths, toolchains};

/// Records every persisted mutation; fails when `fail` is set.
#[derive(Default)]
struct RecordingPersistence {
    fail: bool,
    persisted: Mutex<Vec<ProjectMutation>>,
}

impl DescriptorPersistence for RecordingPersistence {
    fn persist(
        &self,
        _snapshot: &ProjectSnapshot,
        mutation: &ProjectMutation,
    ) -> Result<(), PersistError> {
        if self.fail {
            return Err(PersistError::new("pom.xml is read-only"));
        }
        self.persisted.lock().push(mutation.clone());
        Ok(())
    }
}

fn persisted_context(persistence: Arc<RecordingPersistence>, repo: &TempDir) -> ProjectContext {
    ProjectContext::builder(ProjectSnapshot::maven_layout("/p"))
        .config(config(repo.path()))
        .toolchains(toolchains())
        .persistence(persistence as Arc<dyn DescriptorPersistence>)
        .build()
}

#[test]
fn mutations_are_persisted() {
    let repo = TempDir::new().unwrap();
    let persistence = Arc::new(RecordingPersistence::default());
    let ctx = persisted_context(Arc::clone(&persistence), &repo);

    ctx.declare_dependency(compile_dep("a", "1.0", "/repo/a-1.0.jar"))
        .unwrap();
    ctx.set_toolchain(Some("jdk8".into())).unwrap();

    assert_eq!(
        *persistence.persisted.lock(),
        vec![
            ProjectMutation::DependenciesChanged,
            ProjectMutation::ToolchainChanged
        ]
    );
}

#[test]
fn persistence_failure_keeps_the_in_memory_change() {
    let repo = TempDir::new().unwrap();
    let persistence = Arc::new(RecordingPersistence {
        fail: true,
        ..RecordingPersistence::default()
    });
    let ctx = persisted_context(persistence, &repo);
    assert!(ctx.view(ViewKind::Compile, SourceRootKind::Main).is_empty());

    let err = ctx
        .declare_dependency(compile_dep("a", "1.0", "/repo/a-1.0.jar"))
        .unwrap_err();
    assert!(matches!(err, MutationError::Persist(_)));

    assert!(ctx.snapshot().dependency(&coordinate("a", "1.0")).is_some());
    assert_eq!(
        paths(ctx.view(ViewKind::Compile, SourceRootKind::Main).entries()),
        vec![PathBuf::from("/repo/a-1.0.jar")]
    );
}

#[test]
fn removing_an_undeclared_dependency_fails_without_side_effects() {
    let repo = TempDir::new().unwrap();
    let ctx = context(ProjectSnapshot::maven_layout("/p"), repo.path());
    let before = ctx.view(ViewKind::Runtime, SourceRootKind::Main);

    let err = ctx.remove_dependency(&coordinate("ghost", "1.0")).unwrap_err();
    assert!(matches!(err, MutationError::UnknownDependency(c) if c == coordinate("ghost", "1.0")));
    assert!(Arc::ptr_eq(
        &before,
        &ctx.view(ViewKind::Runtime, SourceRootKind::Main)
    ));
}

#[test]
fn runtime_and_test_scopes_follow_the_scope_table() {
    let repo = TempDir::new().unwrap();
    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.dependencies = vec![
        compile_dep("api", "1.0", "/repo/api-1.0.jar"),
        Dependency::resolved(
            coordinate("servlet", "4.0"),
            DependencyScope::Provided,
            "/repo/servlet-4.0.jar",
        ),
        Dependency::resolved(
            coordinate("driver", "2.0"),
            DependencyScope::Runtime,
            "/repo/driver-2.0.jar",
        ),
        Dependency::resolved(
            coordinate("junit", "5.0"),
            DependencyScope::Test,
            "/repo/junit-5.0.jar",
        ),
    ];
    let ctx = context(snapshot, repo.path());

    assert_eq!(
        paths(ctx.view(ViewKind::Runtime, SourceRootKind::Main).entries()),
        vec![
            PathBuf::from("/p/target/classes"),
            PathBuf::from("/repo/api-1.0.jar"),
            PathBuf::from("/repo/driver-2.0.jar"),
        ]
    );
    assert_eq!(
        paths(ctx.view(ViewKind::Runtime, SourceRootKind::Test).entries()),
        vec![
            PathBuf::from("/p/target/test-classes"),
            PathBuf::from("/p/target/classes"),
            PathBuf::from("/repo/api-1.0.jar"),
            PathBuf::from("/repo/driver-2.0.jar"),
            PathBuf::from("/repo/junit-5.0.jar"),
        ]
    );
}

#[test]
fn moving_output_dirs_reorders_only_the_dependency_paths() {
    let repo = TempDir::new().unwrap();
    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.dependencies = vec![compile_dep("api", "1.0", "/repo/api-1.0.jar")];
    let ctx = context(snapshot, repo.path());
    let source = ctx.view(ViewKind::Source, SourceRootKind::Main);
    let boot = ctx.view(ViewKind::LegacyBoot, SourceRootKind::Main);
    assert_eq!(
        ctx.view(ViewKind::Runtime, SourceRootKind::Main).entries()[0].path,
        PathBuf::from("/p/target/classes")
    );

    let invalidated = ctx
        .set_output_dirs(vec![
            OutputDir {
                kind: SourceRootKind::Main,
                path: "/p/build/classes".into(),
            },
            OutputDir {
                kind: SourceRootKind::Test,
                path: "/p/build/test-classes".into(),
            },
        ])
        .unwrap();
    assert!(invalidated.contains(&ViewKey::new(ViewKind::LegacyRuntime, SourceRootKind::Main)));
    assert!(invalidated.contains(&ViewKey::new(ViewKind::Runtime, SourceRootKind::Main)));

    assert_eq!(
        paths(ctx.view(ViewKind::Runtime, SourceRootKind::Test).entries()),
        vec![
            PathBuf::from("/p/build/test-classes"),
            PathBuf::from("/p/build/classes"),
            PathBuf::from("/repo/api-1.0.jar"),
        ]
    );
    assert!(Arc::ptr_eq(&source, &ctx.view(ViewKind::Source, SourceRootKind::Main)));
    assert!(Arc::ptr_eq(&boot, &ctx.view(ViewKind::LegacyBoot, SourceRootKind::Main)));
}

#[test]
fn processor_path_prefers_explicit_declarations() {
    let repo = TempDir::new().unwrap();
    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.dependencies = vec![compile_dep("api", "1.0", "/repo/api-1.0.jar")];
    let ctx = context(snapshot, repo.path());

    let implicit = ctx.view(ViewKind::Processor, SourceRootKind::Main);
    assert_eq!(paths(implicit.entries()), vec![PathBuf::from("/repo/api-1.0.jar")]);

    ctx.set_compiler_config(CompilerConfig {
        processor_path: vec![Dependency::resolved(
            coordinate("mapstruct-processor", "1.5"),
            DependencyScope::Processor,
            "/repo/mapstruct-processor-1.5.jar",
        )],
        ..CompilerConfig::default()
    })
    .unwrap();

    let explicit = ctx.view(ViewKind::Processor, SourceRootKind::Main);
    assert_eq!(
        paths(explicit.entries()),
        vec![PathBuf::from("/repo/mapstruct-processor-1.5.jar")]
    );
}

#[test]
fn boot_overrides_are_stripped_against_the_platform() {
    let repo = TempDir::new().unwrap();
    let boot_classpath = std::env::join_paths([
        "/jdk8/jre/lib/rt.jar",
        "/opt/endorsed/jaxws.jar",
        "/jdk8/jre/lib/ext/jfxrt.jar",
    ])
    .unwrap()
    .into_string()
    .unwrap();

    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.toolchain = Some("jdk8".into());
    snapshot.compiler.boot_classpath = Some(boot_classpath);
    snapshot.dependencies = vec![compile_dep("api", "1.0", "/repo/api-1.0.jar")];
    let ctx = context(snapshot, repo.path());

    let boot = ctx.view(ViewKind::LegacyBoot, SourceRootKind::Main);
    let expected = vec![
        PathBuf::from("/jdk8/jre/lib/rt.jar"),
        PathBuf::from("/jdk8/jre/lib/ext/jfxrt.jar"),
        PathBuf::from("/opt/endorsed/jaxws.jar"),
    ];
    assert_eq!(paths(boot.entries()), expected);
    assert_eq!(
        boot.extension_library().map(|entry| entry.path.clone()),
        Some(PathBuf::from("/jdk8/jre/lib/ext/jfxrt.jar"))
    );

    let compile = ctx.view(ViewKind::LegacyCompile, SourceRootKind::Main);
    assert_eq!(
        paths(compile.entries()),
        vec![
            PathBuf::from("/repo/api-1.0.jar"),
            PathBuf::from("/jdk8/jre/lib/ext/jfxrt.jar"),
        ]
    );

    // Re-applying the same compiler configuration yields the same boot path.
    let compiler = ctx.snapshot().compiler.clone();
    ctx.set_compiler_config(compiler).unwrap();
    let again = ctx.view(ViewKind::LegacyBoot, SourceRootKind::Main);
    assert!(!Arc::ptr_eq(&boot, &again));
    assert_eq!(paths(again.entries()), expected);
}

#[test]
fn registering_toolchains_invalidates_boot_views() {
    let repo = TempDir::new().unwrap();
    let mut snapshot = ProjectSnapshot::maven_layout("/p");
    snapshot.toolchain = Some("jdk8".into());
    let ctx = ProjectContext::builder(snapshot)
        .config(config(repo.path()))
        .build();

    let boot = ctx.view(ViewKind::Boot, SourceRootKind::Main);
    assert!(boot.is_empty());
    assert!(boot.is_degraded());

    let mut registry = ToolchainRegistry::new();
    registry.register(jdk8());
    let invalidated = ctx.set_toolchains(registry);
    assert!(!invalidated.is_empty());

    let boot = ctx.view(ViewKind::Boot, SourceRootKind::Main);
    assert!(!boot.is_degraded());
    assert_eq!(boot.len(), 2);
}
