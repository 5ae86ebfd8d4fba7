use trellis_project::{
    Dependency, DependencyScope, PathEntry, ProjectSnapshot, Resolution, SourceRootKind,
};

use crate::view::push_unique;

/// Which consumer a dependency path is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClasspathScope {
    Compile,
    Runtime,
    Processor,
}

/// Parameters of a dependency-path resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolverConfig {
    pub scope: ClasspathScope,
    pub root: SourceRootKind,
    /// Put the project's own output directories ahead of external artifacts.
    pub include_output_dir: bool,
}

impl ResolverConfig {
    pub fn new(scope: ClasspathScope, root: SourceRootKind) -> Self {
        let include_output_dir = match (scope, root) {
            (ClasspathScope::Compile, SourceRootKind::Main) => false,
            (ClasspathScope::Compile, SourceRootKind::Test) => true,
            (ClasspathScope::Runtime, _) => true,
            (ClasspathScope::Processor, _) => false,
        };
        Self {
            scope,
            root,
            include_output_dir,
        }
    }

    /// Whether a dependency declared with `scope` contributes to this path.
    pub fn accepts(&self, scope: DependencyScope) -> bool {
        use DependencyScope as S;
        if scope == S::Import {
            return false;
        }
        match (self.scope, self.root) {
            (ClasspathScope::Compile, SourceRootKind::Main) => {
                matches!(scope, S::Compile | S::Provided | S::System)
            }
            (ClasspathScope::Compile, SourceRootKind::Test) => {
                matches!(scope, S::Compile | S::Provided | S::System | S::Test)
            }
            (ClasspathScope::Runtime, SourceRootKind::Main) => {
                matches!(scope, S::Compile | S::Runtime | S::System)
            }
            (ClasspathScope::Runtime, SourceRootKind::Test) => {
                !matches!(scope, S::Provided | S::Processor)
            }
            (ClasspathScope::Processor, _) => scope == S::Processor,
        }
    }

    /// Output directories placed ahead of the dependencies, in precedence order.
    fn output_dirs<'s>(&self, snapshot: &'s ProjectSnapshot) -> Vec<&'s std::path::Path> {
        if !self.include_output_dir {
            return Vec::new();
        }
        let kinds: &[SourceRootKind] = match (self.scope, self.root) {
            (_, SourceRootKind::Main) => &[SourceRootKind::Main],
            // Test sources compile against main classes, not their own output.
            (ClasspathScope::Compile, SourceRootKind::Test) => &[SourceRootKind::Main],
            (_, SourceRootKind::Test) => &[SourceRootKind::Test, SourceRootKind::Main],
        };
        kinds
            .iter()
            .filter_map(|kind| snapshot.output_dir(*kind))
            .collect()
    }
}

/// Ordered dependency entries plus the completeness flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    pub entries: Vec<PathEntry>,
    pub complete: bool,
}

/// Computes a dependency path from a snapshot.
///
/// Implementations must be pure functions of their inputs and must not call back into the
/// view cache.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, snapshot: &ProjectSnapshot, config: &ResolverConfig) -> ResolvedPath;
}

/// Scope-filtered resolution over declared dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactResolver;

impl ArtifactResolver {
    pub fn new() -> Self {
        Self
    }
}

impl DependencyResolver for ArtifactResolver {
    fn resolve(&self, snapshot: &ProjectSnapshot, config: &ResolverConfig) -> ResolvedPath {
        let mut entries = Vec::new();
        let mut complete = true;

        for dir in config.output_dirs(snapshot) {
            push_unique(&mut entries, PathEntry::directory(dir));
        }

        let declared: Box<dyn Iterator<Item = &Dependency>> = match config.scope {
            ClasspathScope::Processor => Box::new(
                snapshot
                    .compiler
                    .processor_path
                    .iter()
                    .chain(snapshot.dependencies.iter().filter(|dep| config.accepts(dep.scope))),
            ),
            _ => Box::new(
                snapshot
                    .dependencies
                    .iter()
                    .filter(|dep| config.accepts(dep.scope)),
            ),
        };

        for dependency in declared {
            match &dependency.resolution {
                Resolution::Resolved { file } => {
                    if !file.exists() {
                        tracing::debug!(
                            target = "trellis.classpath",
                            coordinate = %dependency.coordinate,
                            file = %file.display(),
                            "resolved artifact is missing on disk"
                        );
                        complete = false;
                    }
                    push_unique(&mut entries, PathEntry::from_path(file.clone()));
                }
                Resolution::Unresolved => {
                    tracing::debug!(
                        target = "trellis.classpath",
                        coordinate = %dependency.coordinate,
                        "dependency is unresolved"
                    );
                    complete = false;
                }
                Resolution::Broken { reason } => {
                    tracing::debug!(
                        target = "trellis.classpath",
                        coordinate = %dependency.coordinate,
                        reason = %reason,
                        "dependency resolution is broken"
                    );
                    complete = false;
                }
            }
        }

        ResolvedPath { entries, complete }
    }
}
