//! How each view is built from the snapshot and its constituent views.

use std::sync::Arc;

use trellis_jdk::{strip_default, PlatformResolver, ResolvedPlatform};
use trellis_project::{DependencyScope, PathEntry, ProjectSnapshot, SourceRootKind};

use crate::context::ContextInner;
use crate::modules::{parse_module_declaration, ModuleComposition, ModuleDeclaration};
use crate::resolver::{ClasspathScope, ResolverConfig};
use crate::selector::{ModuleGate, SelectorMode, SelectorState};
use crate::view::{push_unique, PathView, ViewKey, ViewKind};

impl ContextInner {
    pub(crate) fn compute(&self, key: ViewKey) -> PathView {
        let snapshot = self.snapshot.current();
        match key.kind {
            ViewKind::Source => source_view(&snapshot, key.root),
            ViewKind::LegacyCompile => {
                self.legacy_classpath(&snapshot, ClasspathScope::Compile, key.root)
            }
            ViewKind::LegacyRuntime => {
                self.legacy_classpath(&snapshot, ClasspathScope::Runtime, key.root)
            }
            ViewKind::LegacyBoot => self.legacy_boot(&snapshot, key.root),
            ViewKind::ModuleBoot => self.module_boot(&snapshot),
            ViewKind::Processor => self.processor_path(&snapshot, key.root),
            ViewKind::Endorsed => self.endorsed(&snapshot),
            ViewKind::Compile
            | ViewKind::Runtime
            | ViewKind::Boot
            | ViewKind::ModulePath
            | ViewKind::ModuleRuntime => self.selector_backed(&snapshot, key),
        }
    }

    fn platform(&self, snapshot: &ProjectSnapshot) -> ResolvedPlatform {
        let registry = Arc::clone(&self.toolchains.read());
        PlatformResolver::new(&registry).resolve(snapshot.toolchain.as_deref())
    }

    fn module_gate(&self, snapshot: &ProjectSnapshot, platform: &ResolvedPlatform) -> ModuleGate {
        let threshold = self.config.module_release;
        ModuleGate {
            source: snapshot.compiler.source.or_else(|| platform.version()),
            toolchain_supports_modules: platform.supports_modules(threshold),
            threshold,
        }
    }

    fn legacy_classpath(
        &self,
        snapshot: &ProjectSnapshot,
        scope: ClasspathScope,
        root: SourceRootKind,
    ) -> PathView {
        let resolved = self
            .resolver
            .resolve(snapshot, &ResolverConfig::new(scope, root));
        let boot = self.view(ViewKey::new(ViewKind::LegacyBoot, root));

        let mut entries = resolved.entries;
        if let Some(extension) = boot.extension_library() {
            push_unique(&mut entries, extension.clone());
        }
        PathView::new(entries)
            .with_complete(resolved.complete)
            .with_extension_library(boot.extension_library().cloned())
    }

    fn legacy_boot(&self, snapshot: &ProjectSnapshot, root: SourceRootKind) -> PathView {
        let platform = self.platform(snapshot);
        let overrides: Vec<PathEntry> = snapshot
            .compiler
            .boot_classpath_paths()
            .into_iter()
            .map(PathEntry::from_path)
            .collect();
        let stripped = strip_default(
            &overrides,
            &platform.boot_entries,
            self.config.extension_library.as_deref(),
        );
        let endorsed = self.view(ViewKey::new(ViewKind::Endorsed, root));

        let mut entries = Vec::new();
        for entry in platform
            .boot_entries
            .iter()
            .chain(&stripped.entries)
            .chain(endorsed.entries())
        {
            push_unique(&mut entries, entry.clone());
        }

        PathView::new(entries)
            .with_complete(endorsed.is_complete())
            .with_degraded(platform.degraded)
            .with_extension_library(stripped.extension_library)
    }

    fn module_boot(&self, snapshot: &ProjectSnapshot) -> PathView {
        let platform = self.platform(snapshot);
        let entries = if self.module_gate(snapshot, &platform).passes() {
            platform.system_modules.clone()
        } else {
            Vec::new()
        };
        PathView::new(entries).with_degraded(platform.degraded)
    }

    fn processor_path(&self, snapshot: &ProjectSnapshot, root: SourceRootKind) -> PathView {
        let declared = !snapshot.compiler.processor_path.is_empty()
            || snapshot
                .dependencies
                .iter()
                .any(|dep| dep.scope == DependencyScope::Processor);
        if !declared {
            // Without explicit declarations processors are discovered on the compile path.
            let compile = self.view(ViewKey::new(ViewKind::LegacyCompile, root));
            return PathView::derived_from(&compile);
        }

        let resolved = self
            .resolver
            .resolve(snapshot, &ResolverConfig::new(ClasspathScope::Processor, root));
        PathView::new(resolved.entries).with_complete(resolved.complete)
    }

    fn endorsed(&self, snapshot: &ProjectSnapshot) -> PathView {
        let dir = self.config.endorsed_dir_for(&snapshot.root);
        let scratch = self.config.scratch_dir_for(&snapshot.root);
        let resolution = self.overlay.resolve(&dir, &scratch);
        let entries = resolution.path_entries();
        if !resolution.unidentified.is_empty() {
            self.router.schedule_identification(resolution.unidentified);
        }
        // Unidentified overrides are still usable entries; the view stays complete.
        PathView::new(entries)
    }

    fn selector_backed(&self, snapshot: &ProjectSnapshot, key: ViewKey) -> PathView {
        let platform = self.platform(snapshot);
        let gate = self.module_gate(snapshot, &platform);
        let mode = self.selector.mode(key, snapshot, &gate);

        let legacy_kind = match key.kind {
            ViewKind::Boot => {
                let source = match mode {
                    SelectorMode::Module => ViewKind::ModuleBoot,
                    SelectorMode::Legacy | SelectorMode::LegacyFallback => ViewKind::LegacyBoot,
                };
                let view = self.view(ViewKey::new(source, key.root));
                return PathView::derived_from(&view)
                    .with_degraded(view.is_degraded() || mode == SelectorMode::LegacyFallback);
            }
            ViewKind::Compile | ViewKind::ModulePath => ViewKind::LegacyCompile,
            _ => ViewKind::LegacyRuntime,
        };
        let wants_module_path = matches!(key.kind, ViewKind::ModulePath | ViewKind::ModuleRuntime);
        let legacy = self.view(ViewKey::new(legacy_kind, key.root));

        match (mode, wants_module_path) {
            (SelectorMode::Legacy, false) => PathView::derived_from(&legacy),
            (SelectorMode::Legacy, true) => PathView::default(),
            // Never an unexplained empty module path: flag it.
            (SelectorMode::LegacyFallback, false) => {
                PathView::derived_from(&legacy).with_degraded(true)
            }
            (SelectorMode::LegacyFallback, true) => PathView::default().with_degraded(true),
            (SelectorMode::Module, _) => {
                let base = self.module_base(snapshot, key, &legacy);
                let descriptor = self.module_declaration(snapshot, key.root);
                let composed = ModuleComposition {
                    base: &base,
                    system_modules: &platform.system_modules,
                    legacy: legacy.entries(),
                    descriptor: descriptor.as_ref(),
                }
                .compose();
                let entries = if wants_module_path {
                    composed.module_path
                } else {
                    composed.classpath
                };
                PathView::new(entries)
                    .with_complete(legacy.is_complete())
                    .with_extension_library(legacy.extension_library().cloned())
            }
        }
    }

    /// The declaration in the `root` source roots; test roots fall back to the main one.
    fn module_declaration(
        &self,
        snapshot: &ProjectSnapshot,
        root: SourceRootKind,
    ) -> Option<ModuleDeclaration> {
        let kinds: &[SourceRootKind] = match root {
            SourceRootKind::Main => &[SourceRootKind::Main],
            SourceRootKind::Test => &[SourceRootKind::Test, SourceRootKind::Main],
        };
        for path in kinds
            .iter()
            .flat_map(|kind| self.selector.descriptor_paths(snapshot, *kind))
        {
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(err) => {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::debug!(
                            target = "trellis.classpath",
                            path = %path.display(),
                            error = %err,
                            "failed to read module descriptor"
                        );
                    }
                    continue;
                }
            };
            let declaration = parse_module_declaration(&source);
            if declaration.is_none() {
                tracing::debug!(
                    target = "trellis.classpath",
                    path = %path.display(),
                    "unparseable module descriptor; keeping every module candidate"
                );
            }
            return declaration;
        }
        None
    }

    /// Project output directories that are modules in their own right.
    fn module_base(
        &self,
        snapshot: &ProjectSnapshot,
        key: ViewKey,
        legacy: &PathView,
    ) -> Vec<PathEntry> {
        SourceRootKind::ALL
            .into_iter()
            .filter(|kind| *kind == SourceRootKind::Main || key.root == SourceRootKind::Test)
            .filter(|kind| {
                self.selector.state(ViewKey::new(key.kind, *kind), snapshot)
                    == SelectorState::HasDescriptor
            })
            .filter_map(|kind| snapshot.output_dir(kind))
            .filter(|dir| legacy.contains(dir))
            .map(PathEntry::directory)
            .collect()
    }
}

fn source_view(snapshot: &ProjectSnapshot, root: SourceRootKind) -> PathView {
    let mut entries = Vec::new();
    for source in snapshot.source_roots_of(root) {
        push_unique(&mut entries, PathEntry::directory(&source.path));
    }
    for resource in snapshot.resource_roots.iter().filter(|r| r.kind == root) {
        push_unique(&mut entries, PathEntry::directory(&resource.path));
    }
    PathView::new(entries)
}
