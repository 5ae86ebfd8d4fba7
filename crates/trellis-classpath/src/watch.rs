//! OS file watching feeding [`ProjectContext::apply_file_changes`].
//!
//! The engine itself is watcher-agnostic: any source of [`FileChange`]s can drive it. The
//! Notify-based driver lives behind the `watch-notify` feature so library users that bring
//! their own file events don't take on platform watcher dependencies.
//!
//! [`ProjectContext::apply_file_changes`]: crate::ProjectContext::apply_file_changes
//! [`FileChange`]: trellis_project::FileChange

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[cfg(feature = "watch-notify")]
pub use notify_driver::{changes_from_event, NotifyDriver};

/// Where each requested watch path is actually watched.
///
/// Paths that don't exist yet are anchored at their nearest existing ancestor inside the
/// project root, or at the root itself. Events at an anchor that touch a requested path's
/// ancestry mean the plan must be recomputed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchPlan {
    anchors: BTreeMap<PathBuf, PathBuf>,
}

impl WatchPlan {
    pub fn new(requested: &[PathBuf], root: &Path) -> Self {
        let anchors = requested
            .iter()
            .map(|path| (path.clone(), anchor_for(path, root)))
            .collect();
        Self { anchors }
    }

    /// Directories to register with the OS watcher, non-recursively.
    pub fn watched_dirs(&self) -> BTreeSet<&Path> {
        self.anchors.values().map(PathBuf::as_path).collect()
    }

    /// Requested paths that exist and are watched themselves.
    pub fn direct(&self) -> impl Iterator<Item = &Path> {
        self.anchors
            .iter()
            .filter(|(requested, anchor)| requested == anchor)
            .map(|(requested, _)| requested.as_path())
    }

    /// An event at `path` concerns one of the requested paths.
    pub fn is_relevant(&self, path: &Path) -> bool {
        self.anchors.keys().any(|requested| path.starts_with(requested))
    }

    /// An event at `path` may change where requested paths are anchored.
    pub fn affects_layout(&self, path: &Path) -> bool {
        self.anchors.keys().any(|requested| requested.starts_with(path))
    }
}

fn anchor_for(path: &Path, root: &Path) -> PathBuf {
    path.ancestors()
        .take_while(|ancestor| ancestor.starts_with(root))
        .find(|ancestor| ancestor.is_dir())
        .unwrap_or(root)
        .to_path_buf()
}

#[cfg(feature = "watch-notify")]
mod notify_driver {
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::thread::JoinHandle;

    use crossbeam_channel::{unbounded, Receiver, Sender};
    use notify::event::{ModifyKind, RenameMode};
    use notify::{EventKind, RecursiveMode, Watcher};
    use trellis_project::{FileChange, SourceRootKind};

    use super::WatchPlan;
    use crate::context::{ProjectContext, WeakProjectContext};
    use crate::subscription::Subscription;
    use crate::view::ViewKind;

    enum Message {
        Event(notify::Result<notify::Event>),
        /// Source roots or the project root may have moved.
        Layout,
        Stop,
    }

    /// Keeps a native watcher on the watch paths of one project.
    ///
    /// Missing paths are watched through their nearest existing ancestor and picked up
    /// once they appear. Watches follow source-root changes and snapshot reloads. Holds
    /// only a weak handle to the project; dropping the driver stops watching.
    pub struct NotifyDriver {
        tx: Sender<Message>,
        thread: Option<JoinHandle<()>>,
        _layout: Vec<Subscription>,
    }

    impl NotifyDriver {
        pub fn start(context: &ProjectContext) -> notify::Result<Self> {
            let (tx, rx) = unbounded();
            let events = tx.clone();
            let watcher =
                notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                    let _ = events.send(Message::Event(res));
                })?;

            let mut watches = Watches {
                watcher,
                plan: WatchPlan::default(),
            };
            watches.sync(context)?;

            // Source views are cleared exactly when the roots or the snapshot change.
            let layout = SourceRootKind::ALL
                .into_iter()
                .map(|root| {
                    let tx = tx.clone();
                    let subscription = context.subscribe(ViewKind::Source, root, move || {
                        let _ = tx.send(Message::Layout);
                    });
                    context.view(ViewKind::Source, root);
                    subscription
                })
                .collect();

            let weak = context.downgrade();
            let thread = std::thread::Builder::new()
                .name("trellis-watch".into())
                .spawn(move || run(rx, weak, watches))
                .map_err(notify::Error::io)?;

            Ok(Self {
                tx,
                thread: Some(thread),
                _layout: layout,
            })
        }
    }

    impl Drop for NotifyDriver {
        fn drop(&mut self) {
            let _ = self.tx.send(Message::Stop);
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    tracing::debug!(target = "trellis.classpath", "file watcher thread panicked");
                }
            }
        }
    }

    struct Watches {
        watcher: notify::RecommendedWatcher,
        plan: WatchPlan,
    }

    impl Watches {
        /// Re-anchor watches to the project's current watch paths.
        ///
        /// Returns whether a requested path became directly watched; events inside it may
        /// have been missed while it was anchored elsewhere.
        fn sync(&mut self, context: &ProjectContext) -> notify::Result<bool> {
            let plan = WatchPlan::new(&context.watch_paths(), &context.snapshot().root);
            if plan == self.plan {
                return Ok(false);
            }

            let old: BTreeSet<PathBuf> =
                self.plan.watched_dirs().into_iter().map(PathBuf::from).collect();
            let new: BTreeSet<PathBuf> =
                plan.watched_dirs().into_iter().map(PathBuf::from).collect();
            for dir in old.difference(&new) {
                if let Err(err) = self.watcher.unwatch(dir) {
                    tracing::debug!(
                        target = "trellis.classpath",
                        path = %dir.display(),
                        error = %err,
                        "failed to drop watch"
                    );
                }
            }
            for dir in new.difference(&old) {
                if !dir.is_dir() {
                    tracing::debug!(
                        target = "trellis.classpath",
                        path = %dir.display(),
                        "project root is missing; not watching"
                    );
                    continue;
                }
                self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
            }

            let was_direct: BTreeSet<PathBuf> = self.plan.direct().map(PathBuf::from).collect();
            let appeared = plan.direct().any(|path| !was_direct.contains(path));
            tracing::debug!(
                target = "trellis.classpath",
                watched = new.len(),
                "updated file watches"
            );
            self.plan = plan;
            Ok(appeared)
        }

        fn resync(&mut self, context: &ProjectContext) {
            match self.sync(context) {
                Ok(true) => {
                    context.rescan();
                }
                Ok(false) => {}
                Err(err) => tracing::warn!(
                    target = "trellis.classpath",
                    error = %err,
                    "failed to update file watches"
                ),
            }
        }
    }

    fn run(rx: Receiver<Message>, weak: WeakProjectContext, mut watches: Watches) {
        for message in rx {
            let Some(context) = weak.upgrade() else {
                return;
            };
            match message {
                Message::Stop => return,
                Message::Layout => {
                    for root in SourceRootKind::ALL {
                        context.view(ViewKind::Source, root);
                    }
                    watches.resync(&context);
                }
                Message::Event(Ok(event)) if requests_rescan(&event) => {
                    context.rescan();
                }
                Message::Event(Ok(event)) => {
                    let changes: Vec<FileChange> = changes_from_event(&event)
                        .into_iter()
                        .filter(|change| watches.plan.is_relevant(change.path()))
                        .collect();
                    if !changes.is_empty() {
                        context.apply_file_changes(&changes);
                    }
                    if event
                        .paths
                        .iter()
                        .any(|path| watches.plan.affects_layout(path))
                    {
                        watches.resync(&context);
                    }
                }
                Message::Event(Err(err)) => tracing::warn!(
                    target = "trellis.classpath",
                    error = %err,
                    "file watcher error"
                ),
            }
        }
    }

    fn requests_rescan(event: &notify::Event) -> bool {
        matches!(event.attrs.flag(), Some(notify::event::Flag::Rescan))
            || (matches!(event.kind, EventKind::Other) && event.paths.is_empty())
    }

    /// Normalize a raw Notify event into engine file changes.
    ///
    /// Renames become a delete of the old path and a create of the new one.
    pub fn changes_from_event(event: &notify::Event) -> Vec<FileChange> {
        let paths = event.paths.iter();
        match event.kind {
            EventKind::Create(_) => paths.map(FileChange::created).collect(),
            EventKind::Remove(_) => paths.map(FileChange::deleted).collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                paths.map(FileChange::deleted).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.map(FileChange::created).collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                vec![
                    FileChange::deleted(&event.paths[0]),
                    FileChange::created(&event.paths[1]),
                ]
            }
            EventKind::Modify(_) => paths.map(FileChange::modified).collect(),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }

}
