use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use trellis_config::EngineConfig;
use trellis_jdk::ToolchainRegistry;
use trellis_project::{FileChange, ProjectSnapshot, SourceRootKind};

use crate::cache::ViewCache;
use crate::graph::GraphError;
use crate::identify::{ArtifactIndex, LocalHashIndex};
use crate::mutation::DescriptorPersistence;
use crate::overlay::EndorsedOverlay;
use crate::resolver::{ArtifactResolver, DependencyResolver};
use crate::router::ChangeRouter;
use crate::selector::{DescriptorProbe, FsDescriptorProbe, ModuleSelector};
use crate::snapshot::SnapshotCell;
use crate::subscription::Subscription;
use crate::view::{PathView, ViewKey, ViewKind};

pub(crate) struct ContextInner {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) snapshot: Arc<SnapshotCell>,
    pub(crate) toolchains: RwLock<Arc<ToolchainRegistry>>,
    pub(crate) resolver: Arc<dyn DependencyResolver>,
    pub(crate) cache: Arc<ViewCache>,
    pub(crate) selector: Arc<ModuleSelector>,
    pub(crate) overlay: Arc<EndorsedOverlay>,
    pub(crate) router: Arc<ChangeRouter>,
    pub(crate) persistence: Option<Arc<dyn DescriptorPersistence>>,
}

impl ContextInner {
    pub(crate) fn view(&self, key: ViewKey) -> Arc<PathView> {
        self.cache.get_or_compute(key, || self.compute(key))
    }
}

/// One open project: its snapshot, path views, and the machinery keeping them current.
///
/// Cheap to clone; clones share state. All methods may be called from any thread.
#[derive(Clone)]
pub struct ProjectContext {
    pub(crate) inner: Arc<ContextInner>,
}

/// A non-owning handle, for callbacks that must not keep the project alive.
#[derive(Clone)]
pub struct WeakProjectContext {
    inner: Weak<ContextInner>,
}

impl WeakProjectContext {
    pub fn upgrade(&self) -> Option<ProjectContext> {
        self.inner.upgrade().map(|inner| ProjectContext { inner })
    }
}

impl ProjectContext {
    pub fn new(snapshot: ProjectSnapshot, toolchains: ToolchainRegistry) -> Self {
        Self::builder(snapshot).toolchains(toolchains).build()
    }

    pub fn builder(snapshot: ProjectSnapshot) -> ProjectContextBuilder {
        ProjectContextBuilder::new(snapshot)
    }

    /// The current path for `kind` of the `root` sources.
    ///
    /// Computes on a miss; concurrent callers for the same view share one computation.
    pub fn view(&self, kind: ViewKind, root: SourceRootKind) -> Arc<PathView> {
        self.inner.view(ViewKey::new(kind, root))
    }

    pub fn view_for(&self, key: ViewKey) -> Arc<PathView> {
        self.inner.view(key)
    }

    /// Whether `view` is still the published value for `key`.
    pub fn is_current(&self, key: ViewKey, view: &PathView) -> bool {
        self.inner.cache.current_generation(key) == Some(view.generation())
    }

    /// Call `listener` whenever the view is invalidated.
    ///
    /// The listener carries no data; re-query with [`ProjectContext::view`]. Only views that
    /// have been computed since their last invalidation produce notifications.
    pub fn subscribe(
        &self,
        kind: ViewKind,
        root: SourceRootKind,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.inner
            .cache
            .subscribe(ViewKey::new(kind, root), listener)
    }

    /// Declare an extra derivation edge between two views.
    pub fn declare_view_dependency(
        &self,
        dependent: ViewKey,
        dependency: ViewKey,
    ) -> Result<(), GraphError> {
        self.inner.cache.add_dependency(dependent, dependency)
    }

    pub fn snapshot(&self) -> Arc<ProjectSnapshot> {
        self.inner.snapshot.current()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn toolchains(&self) -> Arc<ToolchainRegistry> {
        Arc::clone(&self.inner.toolchains.read())
    }

    pub fn local_index(&self) -> &Arc<LocalHashIndex> {
        self.inner.overlay.local_index()
    }

    pub fn router(&self) -> &ChangeRouter {
        &self.inner.router
    }

    /// Feed observed file-system changes. Returns the invalidated views.
    pub fn apply_file_changes(&self, changes: &[FileChange]) -> Vec<ViewKey> {
        self.inner.router.on_file_changes(changes)
    }

    /// Re-derive everything that depends on watched files, after the watcher dropped events.
    pub fn rescan(&self) -> Vec<ViewKey> {
        self.inner.router.on_rescan()
    }

    /// Directories whose direct children affect path views: source roots (for descriptors)
    /// and the endorsed override directory.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        let snapshot = self.snapshot();
        let mut paths: Vec<PathBuf> = snapshot
            .source_roots
            .iter()
            .map(|root| root.path.clone())
            .collect();
        paths.push(self.inner.config.endorsed_dir_for(&snapshot.root));
        paths.sort();
        paths.dedup();
        paths
    }

    /// Wait until background identification work has drained. Returns `false` on timeout.
    pub fn wait_for_background(&self, timeout: Duration) -> bool {
        self.inner.router.wait_idle(timeout)
    }

    pub fn downgrade(&self) -> WeakProjectContext {
        WeakProjectContext {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

pub struct ProjectContextBuilder {
    snapshot: ProjectSnapshot,
    config: EngineConfig,
    toolchains: ToolchainRegistry,
    resolver: Arc<dyn DependencyResolver>,
    probe: Box<dyn DescriptorProbe>,
    artifact_index: Option<Arc<dyn ArtifactIndex>>,
    local_index: Arc<LocalHashIndex>,
    persistence: Option<Arc<dyn DescriptorPersistence>>,
}

impl ProjectContextBuilder {
    pub fn new(snapshot: ProjectSnapshot) -> Self {
        Self {
            snapshot,
            config: EngineConfig::default(),
            toolchains: ToolchainRegistry::new(),
            resolver: Arc::new(ArtifactResolver::new()),
            probe: Box::new(FsDescriptorProbe),
            artifact_index: None,
            local_index: Arc::new(LocalHashIndex::new()),
            persistence: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn toolchains(mut self, toolchains: ToolchainRegistry) -> Self {
        self.toolchains = toolchains;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn descriptor_probe(mut self, probe: impl DescriptorProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Remote index consulted in the background for unidentified endorsed overrides.
    pub fn artifact_index(mut self, index: Arc<dyn ArtifactIndex>) -> Self {
        self.artifact_index = Some(index);
        self
    }

    pub fn local_index(mut self, index: Arc<LocalHashIndex>) -> Self {
        self.local_index = index;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn DescriptorPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn build(self) -> ProjectContext {
        let config = Arc::new(self.config);
        let snapshot = Arc::new(SnapshotCell::new(self.snapshot));
        let cache = Arc::new(ViewCache::default());
        let selector = Arc::new(ModuleSelector::new(
            config.descriptor_file_name.clone(),
            self.probe,
        ));
        let overlay = Arc::new(EndorsedOverlay::new(
            config.local_repository(),
            self.local_index,
        ));
        let router = Arc::new(ChangeRouter::new(
            Arc::clone(&config),
            Arc::clone(&snapshot),
            Arc::clone(&cache),
            Arc::clone(&selector),
            Arc::clone(&overlay),
            self.artifact_index,
        ));

        ProjectContext {
            inner: Arc::new(ContextInner {
                config,
                snapshot,
                toolchains: RwLock::new(Arc::new(self.toolchains)),
                resolver: self.resolver,
                cache,
                selector,
                overlay,
                router,
                persistence: self.persistence,
            }),
        }
    }
}
