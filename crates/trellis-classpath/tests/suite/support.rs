use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trellis_classpath::{
    ArtifactResolver, DependencyResolver, ProjectContext, ResolvedPath, ResolverConfig,
};
use trellis_config::EngineConfig;
use trellis_jdk::{Toolchain, ToolchainRegistry};
use trellis_project::{
    ArtifactCoordinate, Dependency, DependencyScope, JavaVersion, PathEntry, ProjectSnapshot,
};

pub fn coordinate(artifact: &str, version: &str) -> ArtifactCoordinate {
    ArtifactCoordinate::new("org.example", artifact, version)
}

pub fn compile_dep(artifact: &str, version: &str, file: impl Into<PathBuf>) -> Dependency {
    Dependency::resolved(coordinate(artifact, version), DependencyScope::Compile, file)
}

pub fn jdk17() -> Toolchain {
    Toolchain::new("jdk17", JavaVersion::JAVA_17, "/jdk17").with_system_modules(vec![
        PathEntry::archive("/jdk17/jmods/java.base.jmod"),
        PathEntry::archive("/jdk17/jmods/java.sql.jmod"),
    ])
}

pub fn jdk8() -> Toolchain {
    Toolchain::new("jdk8", JavaVersion::JAVA_8, "/jdk8").with_boot_entries(vec![
        PathEntry::archive("/jdk8/jre/lib/rt.jar"),
        PathEntry::archive("/jdk8/jre/lib/ext/jfxrt.jar"),
    ])
}

pub fn toolchains() -> ToolchainRegistry {
    let mut registry = ToolchainRegistry::new();
    registry.register(jdk17());
    registry.register(jdk8());
    registry
}

/// A config that never falls back to the user's home repository.
pub fn config(repo: &Path) -> EngineConfig {
    EngineConfig {
        local_repository: Some(repo.to_path_buf()),
        ..EngineConfig::default()
    }
}

pub fn context(snapshot: ProjectSnapshot, repo: &Path) -> ProjectContext {
    ProjectContext::builder(snapshot)
        .config(config(repo))
        .toolchains(toolchains())
        .build()
}

/// Create `name` under `repo` so resolved dependencies point at a real file.
pub fn artifact(repo: &Path, name: &str) -> PathBuf {
    let path = repo.join(name);
    std::fs::write(&path, b"").unwrap();
    path
}

pub fn paths(entries: &[PathEntry]) -> Vec<PathBuf> {
    entries.iter().map(|entry| entry.path.clone()).collect()
}

/// Wraps the default resolver and counts invocations.
#[derive(Default)]
pub struct CountingResolver {
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DependencyResolver for CountingResolver {
    fn resolve(&self, snapshot: &ProjectSnapshot, config: &ResolverConfig) -> ResolvedPath {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ArtifactResolver::new().resolve(snapshot, config)
    }
}

pub fn counting_context(
    snapshot: ProjectSnapshot,
    repo: &Path,
) -> (ProjectContext, Arc<CountingResolver>) {
    let resolver = Arc::new(CountingResolver::default());
    let context = ProjectContext::builder(snapshot)
        .config(config(repo))
        .toolchains(toolchains())
        .resolver(Arc::clone(&resolver) as Arc<dyn DependencyResolver>)
        .build();
    (context, resolver)
}
