use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use trellis_classpath::{ProjectContext, ViewKind};
use trellis_project::{CompilerConfig, FileChange, JavaVersion, ProjectSnapshot, SourceRootKind};

use super::support::{compile_dep, context, paths};

struct Project {
    dir: TempDir,
    _repo: TempDir,
    ctx: ProjectContext,
}

impl Project {
    fn new(source: Option<JavaVersion>) -> Self {
        let dir = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/main/java")).unwrap();
        fs::create_dir_all(root.join("src/test/java")).unwrap();

        let mut snapshot = ProjectSnapshot::maven_layout(root);
        snapshot.dependencies = vec![compile_dep("lib", "1.0", root.join("repo/lib-1.0.jar"))];
        snapshot.compiler = CompilerConfig {
            source,
            ..CompilerConfig::default()
        };
        let ctx = context(snapshot, repo.path());
        Self {
            dir,
            _repo: repo,
            ctx,
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn descriptor(&self, kind: &str) -> PathBuf {
        self.root().join(format!("src/{kind}/java/module-info.java"))
    }

    fn create_descriptor(&self, kind: &str) {
        self.write_descriptor(kind, "module app { requires lib; }");
    }

    fn write_descriptor(&self, kind: &str, source: &str) {
        let path = self.descriptor(kind);
        let change = if path.exists() {
            FileChange::modified(&path)
        } else {
            FileChange::created(&path)
        };
        fs::write(&path, source).unwrap();
        self.ctx.apply_file_changes(&[change]);
    }

    fn delete_descriptor(&self, kind: &str) {
        let path = self.descriptor(kind);
        fs::remove_file(&path).unwrap();
        self.ctx.apply_file_changes(&[FileChange::deleted(path)]);
    }
}

#[test]
fn descriptor_creation_and_removal_flip_the_representation() {
    let project = Project::new(None);
    let ctx = &project.ctx;
    let jar = project.root().join("repo/lib-1.0.jar");

    assert_eq!(paths(ctx.view(ViewKind::Compile, SourceRootKind::Main).entries()), vec![jar.clone()]);
    assert!(ctx.view(ViewKind::ModulePath, SourceRootKind::Main).is_empty());
    assert!(ctx.view(ViewKind::ModuleRuntime, SourceRootKind::Main).is_empty());
    let legacy_boot = ctx.view(ViewKind::Boot, SourceRootKind::Main);
    assert!(legacy_boot.is_empty());

    project.create_descriptor("main");
    assert_eq!(
        paths(ctx.view(ViewKind::ModulePath, SourceRootKind::Main).entries()),
        vec![jar.clone()]
    );
    assert!(ctx.view(ViewKind::Compile, SourceRootKind::Main).is_empty());
    let jmods = vec![
        PathBuf::from("/jdk17/jmods/java.base.jmod"),
        PathBuf::from("/jdk17/jmods/java.sql.jmod"),
    ];
    assert_eq!(paths(ctx.view(ViewKind::Boot, SourceRootKind::Main).entries()), jmods);
    assert_eq!(
        paths(ctx.view(ViewKind::ModuleBoot, SourceRootKind::Main).entries()),
        jmods
    );
    // The runtime module path leads with the module's own classes.
    assert_eq!(
        paths(ctx.view(ViewKind::ModuleRuntime, SourceRootKind::Main).entries()),
        vec![project.root().join("target/classes"), jar.clone()]
    );
    assert!(ctx.view(ViewKind::Runtime, SourceRootKind::Main).is_empty());

    project.delete_descriptor("main");
    assert!(ctx.view(ViewKind::ModulePath, SourceRootKind::Main).is_empty());
    assert!(ctx.view(ViewKind::ModuleRuntime, SourceRootKind::Main).is_empty());
    assert_eq!(paths(ctx.view(ViewKind::Compile, SourceRootKind::Main).entries()), vec![jar]);
}

#[test]
fn test_sources_see_the_main_module_on_the_module_path() {
    let project = Project::new(None);
    let ctx = &project.ctx;
    project.create_descriptor("main");

    let module_path = ctx.view(ViewKind::ModulePath, SourceRootKind::Test);
    let classes = project.root().join("target/classes");
    assert_eq!(module_path.entries()[0].path, classes);
    assert!(module_path.contains(&project.root().join("repo/lib-1.0.jar")));
}

#[test]
fn test_descriptor_only_affects_test_views() {
    let project = Project::new(None);
    let ctx = &project.ctx;
    let main = ctx.view(ViewKind::Compile, SourceRootKind::Main);

    project.create_descriptor("test");

    assert!(!ctx.view(ViewKind::ModulePath, SourceRootKind::Test).is_empty());
    let main_again = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert!(std::sync::Arc::ptr_eq(&main, &main_again));
}

#[test]
fn old_source_level_falls_back_to_a_flagged_legacy_path() {
    let project = Project::new(Some(JavaVersion::JAVA_8));
    let ctx = &project.ctx;
    project.create_descriptor("main");

    let module_path = ctx.view(ViewKind::ModulePath, SourceRootKind::Main);
    assert!(module_path.is_empty());
    assert!(module_path.is_degraded());
    assert!(ctx.view(ViewKind::ModuleRuntime, SourceRootKind::Main).is_degraded());
    assert!(ctx.view(ViewKind::ModuleBoot, SourceRootKind::Main).is_empty());

    let compile = ctx.view(ViewKind::Compile, SourceRootKind::Main);
    assert_eq!(compile.len(), 1);
    assert!(compile.is_degraded());

    // Raising the level through the compiler config re-enables modules.
    ctx.set_compiler_config(CompilerConfig {
        source: Some(JavaVersion::JAVA_11),
        ..CompilerConfig::default()
    })
    .unwrap();
    let module_path = ctx.view(ViewKind::ModulePath, SourceRootKind::Main);
    assert_eq!(module_path.len(), 1);
    assert!(!module_path.is_degraded());
}

#[test]
fn only_required_modules_go_on_the_module_path() {
    let project = Project::new(None);
    let ctx = &project.ctx;
    let jar = project.root().join("repo/lib-1.0.jar");

    project.write_descriptor("main", "module app { requires java.sql; }");
    assert!(ctx.view(ViewKind::ModulePath, SourceRootKind::Main).is_empty());
    assert_eq!(
        paths(ctx.view(ViewKind::Compile, SourceRootKind::Main).entries()),
        vec![jar.clone()]
    );

    // Editing the descriptor re-splits the path.
    project.write_descriptor("main", "module app {\n    requires transitive lib;\n}");
    assert_eq!(
        paths(ctx.view(ViewKind::ModulePath, SourceRootKind::Main).entries()),
        vec![jar.clone()]
    );
    assert!(ctx.view(ViewKind::Compile, SourceRootKind::Main).is_empty());

    // A descriptor that can't be parsed keeps every candidate on the module path.
    project.write_descriptor("main", "module app { requires");
    assert_eq!(
        paths(ctx.view(ViewKind::ModulePath, SourceRootKind::Main).entries()),
        vec![jar]
    );
}
