use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use trellis_config::EngineConfig;
use trellis_project::{ArtifactCoordinate, FileChange, ProjectMutation};

use crate::background::BackgroundWorker;
use crate::cache::ViewCache;
use crate::identify::{ArtifactIndex, ContentHash};
use crate::overlay::EndorsedOverlay;
use crate::selector::ModuleSelector;
use crate::snapshot::SnapshotCell;
use crate::view::{ViewKey, ViewKind};

/// Views a mutation category may affect, before following derivation edges.
///
/// File changes depend on the project layout and are routed by [`ChangeRouter`].
pub fn affected_views(mutation: &ProjectMutation) -> Vec<ViewKey> {
    use ViewKind::*;
    let kinds: &[ViewKind] = match mutation {
        ProjectMutation::DependenciesChanged => &[LegacyCompile, LegacyRuntime, Processor],
        ProjectMutation::SourceRootsChanged => {
            &[Source, Compile, Runtime, Boot, ModulePath, ModuleRuntime]
        }
        ProjectMutation::ResourceRootsChanged => &[Source],
        ProjectMutation::OutputDirsChanged => &[LegacyCompile, LegacyRuntime],
        ProjectMutation::CompilerConfigChanged => &[
            LegacyBoot,
            ModuleBoot,
            Processor,
            Compile,
            Runtime,
            Boot,
            ModulePath,
            ModuleRuntime,
        ],
        ProjectMutation::ToolchainChanged => &[
            LegacyBoot,
            ModuleBoot,
            Compile,
            Runtime,
            Boot,
            ModulePath,
            ModuleRuntime,
        ],
        ProjectMutation::SnapshotReplaced => &ViewKind::ALL,
        ProjectMutation::File(_) => &[],
    };
    kinds.iter().copied().flat_map(ViewKey::both).collect()
}

/// Turns project mutations into targeted cache invalidation, and runs content-hash
/// lookups for endorsed overrides off the caller's thread.
pub struct ChangeRouter {
    config: Arc<EngineConfig>,
    snapshot: Arc<SnapshotCell>,
    cache: Arc<ViewCache>,
    selector: Arc<ModuleSelector>,
    overlay: Arc<EndorsedOverlay>,
    index: Option<Arc<dyn ArtifactIndex>>,
    /// Lookups already scheduled, per snapshot epoch.
    requested: Mutex<HashSet<(u64, ContentHash)>>,
    worker: BackgroundWorker,
}

impl ChangeRouter {
    pub(crate) fn new(
        config: Arc<EngineConfig>,
        snapshot: Arc<SnapshotCell>,
        cache: Arc<ViewCache>,
        selector: Arc<ModuleSelector>,
        overlay: Arc<EndorsedOverlay>,
        index: Option<Arc<dyn ArtifactIndex>>,
    ) -> Self {
        Self {
            config,
            snapshot,
            cache,
            selector,
            overlay,
            index,
            requested: Mutex::new(HashSet::new()),
            worker: BackgroundWorker::spawn("trellis-identify"),
        }
    }

    /// Invalidate what `mutation` may have changed. Returns the cleared views.
    pub fn on_project_mutation(&self, mutation: &ProjectMutation) -> Vec<ViewKey> {
        let keys = match mutation {
            ProjectMutation::File(change) => self.file_views(change),
            ProjectMutation::SourceRootsChanged | ProjectMutation::SnapshotReplaced => {
                self.selector.reset();
                affected_views(mutation)
            }
            _ => affected_views(mutation),
        };
        tracing::debug!(
            target = "trellis.classpath",
            mutation = ?mutation,
            views = keys.len(),
            "routing project mutation"
        );
        if keys.is_empty() {
            return Vec::new();
        }
        self.cache.invalidate_many(keys)
    }

    /// Route a batch of file events with a single invalidation pass.
    pub fn on_file_changes(&self, changes: &[FileChange]) -> Vec<ViewKey> {
        let mut keys = Vec::new();
        for change in changes {
            for key in self.file_views(change) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        if keys.is_empty() {
            return Vec::new();
        }
        self.cache.invalidate_many(keys)
    }

    /// The watcher lost events: forget cached descriptor probes and re-read the
    /// endorsed directory on next access.
    pub fn on_rescan(&self) -> Vec<ViewKey> {
        tracing::debug!(target = "trellis.classpath", "file watcher requested a rescan");
        self.selector.reset();
        let keys = ViewKind::SELECTOR_BACKED
            .into_iter()
            .chain([ViewKind::Endorsed])
            .flat_map(ViewKey::both);
        self.cache.invalidate_many(keys)
    }

    fn file_views(&self, change: &FileChange) -> Vec<ViewKey> {
        let snapshot = self.snapshot.current();
        let mut keys = self.selector.on_file_change(&snapshot, change.path());

        let endorsed_dir = self.config.endorsed_dir_for(&snapshot.root);
        if change.path().starts_with(&endorsed_dir) {
            keys.extend(ViewKey::both(ViewKind::Endorsed));
        }
        keys
    }

    /// Queue repository lookups for overrides that could not be identified locally.
    ///
    /// Never blocks; results are published later and only if no reload happened meanwhile.
    pub(crate) fn schedule_identification(
        self: &Arc<Self>,
        unidentified: Vec<(PathBuf, ContentHash)>,
    ) {
        let Some(index) = self.index.as_ref() else {
            return;
        };
        if !self.config.background_lookups {
            return;
        }

        let epoch = self.snapshot.epoch();
        let fresh: Vec<(PathBuf, ContentHash)> = {
            let mut requested = self.requested.lock();
            requested.retain(|(requested_epoch, _)| *requested_epoch == epoch);
            unidentified
                .into_iter()
                .filter(|(_, hash)| requested.insert((epoch, hash.clone())))
                .collect()
        };

        for (file, hash) in fresh {
            let router = Arc::downgrade(self);
            let index = Arc::clone(index);
            tracing::debug!(
                target = "trellis.classpath",
                path = %file.display(),
                hash = %hash,
                "scheduling artifact index lookup"
            );
            self.worker.submit(move || {
                let outcome = index.lookup_by_content_hash(&file, &hash);
                let Some(router) = router.upgrade() else {
                    return;
                };
                match outcome {
                    Ok(Some(coordinate)) => router.publish_identification(epoch, hash, coordinate),
                    Ok(None) => tracing::debug!(
                        target = "trellis.classpath",
                        path = %file.display(),
                        "override not found in the artifact index"
                    ),
                    Err(err) => tracing::warn!(
                        target = "trellis.classpath",
                        path = %file.display(),
                        error = %err,
                        "artifact index lookup failed; override stays unidentified"
                    ),
                }
            });
        }
    }

    fn publish_identification(
        &self,
        epoch: u64,
        hash: ContentHash,
        coordinate: ArtifactCoordinate,
    ) {
        let changed = self
            .snapshot
            .publish_if_current(epoch, || self.overlay.record(hash, coordinate));
        match changed {
            Some(true) => {
                self.cache.invalidate_many(ViewKey::both(ViewKind::Endorsed));
            }
            Some(false) => {}
            None => tracing::debug!(
                target = "trellis.classpath",
                epoch,
                "discarding identification for a superseded snapshot"
            ),
        }
    }

    /// Wait for queued lookups to finish. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.worker.wait_idle(timeout)
    }
}
