use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use trellis_project::{JavaVersion, PathEntry};

use crate::{Toolchain, ToolchainRegistry};

/// Boot-path inputs derived from the selected toolchain.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPlatform {
    pub toolchain: Option<Arc<Toolchain>>,
    pub boot_entries: Vec<PathEntry>,
    pub system_modules: Vec<PathEntry>,
    /// The configured toolchain was missing and a fallback (or nothing) was used.
    pub degraded: bool,
}

impl ResolvedPlatform {
    pub fn version(&self) -> Option<JavaVersion> {
        self.toolchain.as_ref().map(|toolchain| toolchain.version)
    }

    pub fn supports_modules(&self, threshold: JavaVersion) -> bool {
        self.toolchain
            .as_ref()
            .is_some_and(|toolchain| toolchain.supports_modules(threshold))
    }
}

/// Resolves boot/platform entries for a toolchain identifier.
#[derive(Debug, Clone, Copy)]
pub struct PlatformResolver<'a> {
    registry: &'a ToolchainRegistry,
}

impl<'a> PlatformResolver<'a> {
    pub fn new(registry: &'a ToolchainRegistry) -> Self {
        Self { registry }
    }

    /// Resolve the platform for `toolchain`, falling back to the default toolchain.
    ///
    /// A missing toolchain is not an error: the result is marked degraded and carries the
    /// best-effort boot path.
    pub fn resolve(&self, toolchain: Option<&str>) -> ResolvedPlatform {
        let selection = self.registry.select(toolchain);
        match selection.toolchain {
            Some(toolchain) => ResolvedPlatform {
                boot_entries: toolchain.boot_entries.clone(),
                system_modules: toolchain.system_modules.clone(),
                toolchain: Some(toolchain),
                degraded: selection.degraded,
            },
            None => {
                tracing::warn!(
                    target = "trellis.jdk",
                    requested = toolchain.unwrap_or("<default>"),
                    "no toolchain registered; boot path is empty"
                );
                ResolvedPlatform {
                    degraded: true,
                    ..ResolvedPlatform::default()
                }
            }
        }
    }
}

/// Explicit boot-classpath overrides with the platform baseline removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrippedBoot {
    /// Override entries not already provided by the platform, in their original order.
    pub entries: Vec<PathEntry>,
    /// The platform extension library, when present in either input.
    pub extension_library: Option<PathEntry>,
}

impl StrippedBoot {
    pub fn has_extension_library(&self) -> bool {
        self.extension_library.is_some()
    }
}

/// Remove every override entry that the default boot set already contains.
///
/// Entries are compared by exact path equality. The extension library (matched by path
/// suffix, e.g. `ext/jfxrt.jar`) is never returned as an entry; its presence in either list
/// is surfaced through [`StrippedBoot::extension_library`] so callers can add it once.
pub fn strip_default(
    overrides: &[PathEntry],
    defaults: &[PathEntry],
    extension_library: Option<&Path>,
) -> StrippedBoot {
    let is_extension = |entry: &PathEntry| {
        extension_library.is_some_and(|suffix| entry.path.ends_with(suffix))
    };

    let baseline: HashSet<&Path> = defaults.iter().map(|entry| entry.path.as_path()).collect();

    let extension = overrides
        .iter()
        .chain(defaults.iter())
        .find(|entry| is_extension(entry))
        .cloned();

    let entries = overrides
        .iter()
        .filter(|entry| !baseline.contains(entry.path.as_path()))
        .filter(|entry| !is_extension(entry))
        .cloned()
        .collect();

    StrippedBoot {
        entries,
        extension_library: extension,
    }
}
