use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use trellis_project::{JavaVersion, ProjectSnapshot, SourceRootKind};

use crate::view::{ViewKey, ViewKind};

/// Whether a module descriptor is present for a source root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorState {
    NoDescriptor,
    HasDescriptor,
}

/// The representation a selector-backed view currently uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorMode {
    Legacy,
    Module,
    /// A descriptor exists but the source level or the toolchain can't build modules.
    LegacyFallback,
}

/// Version gate for module-aware builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleGate {
    /// Effective source level: the configured one, else the toolchain's version.
    pub source: Option<JavaVersion>,
    /// The active toolchain reaches the threshold and ships system modules.
    pub toolchain_supports_modules: bool,
    pub threshold: JavaVersion,
}

impl ModuleGate {
    pub fn passes(&self) -> bool {
        self.toolchain_supports_modules
            && self
                .source
                .is_some_and(|source| source.supports_modules(self.threshold))
    }
}

/// File-system check for a module descriptor.
pub trait DescriptorProbe: Send + Sync {
    fn exists(&self, path: &Path) -> io::Result<bool>;
}

/// Probe backed by `std::fs::metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDescriptorProbe;

impl DescriptorProbe for FsDescriptorProbe {
    fn exists(&self, path: &Path) -> io::Result<bool> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Per-(view, source root) descriptor state.
///
/// A state is derived on first access and kept until a file event touches one of the
/// descriptor paths it was derived from, or the source roots change.
pub struct ModuleSelector {
    descriptor_file_name: String,
    probe: Box<dyn DescriptorProbe>,
    states: RwLock<HashMap<ViewKey, SelectorState>>,
    /// Bumped (under the `states` write lock) whenever states are forgotten.
    epoch: AtomicU64,
}

impl ModuleSelector {
    pub fn new(descriptor_file_name: impl Into<String>, probe: Box<dyn DescriptorProbe>) -> Self {
        Self {
            descriptor_file_name: descriptor_file_name.into(),
            probe,
            states: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn descriptor_file_name(&self) -> &str {
        &self.descriptor_file_name
    }

    /// Candidate descriptor locations of the `kind` source roots.
    pub fn descriptor_paths(&self, snapshot: &ProjectSnapshot, kind: SourceRootKind) -> Vec<PathBuf> {
        snapshot
            .source_roots_of(kind)
            .into_iter()
            .map(|root| root.path.join(&self.descriptor_file_name))
            .collect()
    }

    /// Descriptor state of `key`, probing the file system only when no state is cached.
    pub fn state(&self, key: ViewKey, snapshot: &ProjectSnapshot) -> SelectorState {
        if let Some(state) = self.states.read().get(&key) {
            return *state;
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let state = self.probe_root(snapshot, key.root);
        let mut states = self.states.write();
        if self.epoch.load(Ordering::Acquire) != epoch {
            // A descriptor event arrived while probing; don't cache a possibly stale answer.
            return state;
        }
        *states.entry(key).or_insert(state)
    }

    /// Pick the representation for `key` under `gate`.
    pub fn mode(&self, key: ViewKey, snapshot: &ProjectSnapshot, gate: &ModuleGate) -> SelectorMode {
        match self.state(key, snapshot) {
            SelectorState::NoDescriptor => SelectorMode::Legacy,
            SelectorState::HasDescriptor if gate.passes() => SelectorMode::Module,
            SelectorState::HasDescriptor => {
                tracing::warn!(
                    target = "trellis.classpath",
                    view = %key,
                    source = ?gate.source.map(|version| version.0),
                    threshold = gate.threshold.0,
                    toolchain_supports_modules = gate.toolchain_supports_modules,
                    "module descriptor present but modules are unsupported; using the legacy classpath"
                );
                SelectorMode::LegacyFallback
            }
        }
    }

    fn probe_root(&self, snapshot: &ProjectSnapshot, kind: SourceRootKind) -> SelectorState {
        let kinds: &[SourceRootKind] = match kind {
            SourceRootKind::Main => &[SourceRootKind::Main],
            // Tests patched into the main module count as modular too.
            SourceRootKind::Test => &[SourceRootKind::Test, SourceRootKind::Main],
        };

        let found = kinds
            .iter()
            .flat_map(|kind| self.descriptor_paths(snapshot, *kind))
            .any(|path| match self.probe.exists(&path) {
                Ok(exists) => exists,
                Err(err) => {
                    tracing::warn!(
                        target = "trellis.classpath",
                        path = %path.display(),
                        error = %err,
                        "failed to probe module descriptor; assuming none"
                    );
                    false
                }
            });

        tracing::debug!(
            target = "trellis.classpath",
            root = ?kind,
            has_descriptor = found,
            "probed module descriptor"
        );
        if found {
            SelectorState::HasDescriptor
        } else {
            SelectorState::NoDescriptor
        }
    }

    /// Forget the states derived from `path`, if it is a descriptor location.
    ///
    /// Returns the selector-backed keys whose representation may have changed.
    pub fn on_file_change(&self, snapshot: &ProjectSnapshot, path: &Path) -> Vec<ViewKey> {
        let roots: &[SourceRootKind] = if self
            .descriptor_paths(snapshot, SourceRootKind::Main)
            .iter()
            .any(|candidate| candidate == path)
        {
            &SourceRootKind::ALL
        } else if self
            .descriptor_paths(snapshot, SourceRootKind::Test)
            .iter()
            .any(|candidate| candidate == path)
        {
            &[SourceRootKind::Test]
        } else {
            return Vec::new();
        };

        let keys: Vec<ViewKey> = roots
            .iter()
            .flat_map(|root| {
                ViewKind::SELECTOR_BACKED
                    .into_iter()
                    .map(move |kind| ViewKey::new(kind, *root))
            })
            .collect();

        let mut states = self.states.write();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        for key in &keys {
            states.remove(key);
        }
        keys
    }

    /// Forget every derived state.
    pub fn reset(&self) {
        let mut states = self.states.write();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        states.clear();
    }
}
