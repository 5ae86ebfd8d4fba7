use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use trellis_project::{ProjectError, ProjectSnapshot};

/// The current project snapshot plus a reload epoch.
///
/// The epoch only moves on whole-snapshot replacement; background work tagged with an older
/// epoch must not publish.
pub(crate) struct SnapshotCell {
    current: RwLock<Arc<ProjectSnapshot>>,
    epoch: AtomicU64,
}

impl SnapshotCell {
    pub(crate) fn new(snapshot: ProjectSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn current(&self) -> Arc<ProjectSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Derive the next snapshot from the current one and swap it in.
    pub(crate) fn update(
        &self,
        next: impl FnOnce(&ProjectSnapshot) -> Result<ProjectSnapshot, ProjectError>,
    ) -> Result<Arc<ProjectSnapshot>, ProjectError> {
        let mut current = self.current.write();
        let snapshot = Arc::new(next(&current)?);
        *current = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// Swap in a reloaded snapshot and start a new epoch.
    pub(crate) fn replace(&self, snapshot: ProjectSnapshot) -> Arc<ProjectSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut current = self.current.write();
        *current = Arc::clone(&snapshot);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        snapshot
    }

    /// Run `publish` only if `epoch` is still current, holding off replacement meanwhile.
    pub(crate) fn publish_if_current<R>(&self, epoch: u64, publish: impl FnOnce() -> R) -> Option<R> {
        let _current = self.current.read();
        (self.epoch() == epoch).then(publish)
    }
}
