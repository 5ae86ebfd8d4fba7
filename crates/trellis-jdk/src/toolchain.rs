use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use trellis_project::{JavaVersion, PathEntry};

#[derive(Debug, Error)]
pub enum JdkError {
    #[error("could not discover a JDK installation (tried JAVA_HOME and `java` on PATH)")]
    NotFound,

    #[error("JDK home `{home}` has no `release` file")]
    MissingRelease { home: PathBuf },

    #[error("JDK home `{home}` declares an unrecognized version `{text}`")]
    UnknownVersion { home: PathBuf, text: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A Java platform the project can compile against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub id: String,
    pub version: JavaVersion,
    pub home: PathBuf,
    /// Legacy boot classpath entries (`rt.jar`, `ext/*.jar`, ...).
    pub boot_entries: Vec<PathEntry>,
    /// Platform modules (`jmods/*.jmod`); empty for pre-module platforms.
    pub system_modules: Vec<PathEntry>,
}

impl Toolchain {
    pub fn new(id: impl Into<String>, version: JavaVersion, home: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            version,
            home: home.into(),
            boot_entries: Vec::new(),
            system_modules: Vec::new(),
        }
    }

    pub fn with_boot_entries(mut self, entries: Vec<PathEntry>) -> Self {
        self.boot_entries = entries;
        self
    }

    pub fn with_system_modules(mut self, modules: Vec<PathEntry>) -> Self {
        self.system_modules = modules;
        self
    }

    /// Build a toolchain from an installed JDK home.
    ///
    /// The version comes from the `release` file. Boot entries are the jars under
    /// `jre/lib` (or `lib`) and their `ext/` subdirectory; system modules are `jmods/*.jmod`.
    /// Modular JDKs without legacy jars use their system modules as the boot path.
    pub fn from_home(id: impl Into<String>, home: impl AsRef<Path>) -> Result<Self, JdkError> {
        let home = home.as_ref().to_path_buf();
        let version = read_release_version(&home)?;

        let lib_dir = if home.join("jre/lib").is_dir() {
            home.join("jre/lib")
        } else {
            home.join("lib")
        };
        let mut boot_entries = list_archives(&lib_dir, "jar");
        boot_entries.extend(list_archives(&lib_dir.join("ext"), "jar"));
        let system_modules = list_archives(&home.join("jmods"), "jmod");

        if boot_entries.is_empty() {
            boot_entries = system_modules.clone();
        }

        Ok(Self {
            id: id.into(),
            version,
            home,
            boot_entries,
            system_modules,
        })
    }

    pub fn supports_modules(&self, threshold: JavaVersion) -> bool {
        self.version.supports_modules(threshold) && !self.system_modules.is_empty()
    }
}

fn read_release_version(home: &Path) -> Result<JavaVersion, JdkError> {
    let release = home.join("release");
    let text = match std::fs::read_to_string(&release) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(JdkError::MissingRelease {
                home: home.to_path_buf(),
            })
        }
        Err(err) => return Err(err.into()),
    };

    let value = text
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "JAVA_VERSION").then(|| value.trim().to_string())
        })
        .ok_or_else(|| JdkError::UnknownVersion {
            home: home.to_path_buf(),
            text: String::new(),
        })?;

    JavaVersion::parse(&value).ok_or_else(|| JdkError::UnknownVersion {
        home: home.to_path_buf(),
        text: value,
    })
}

/// The JDK home of the first `java` launcher in a `PATH`-style list.
fn home_of_launcher_on(path: &std::ffi::OsStr) -> Option<PathBuf> {
    let exe_name = if cfg!(windows) { "java.exe" } else { "java" };
    let launcher = std::env::split_paths(path)
        .map(|dir| dir.join(exe_name))
        .find(|candidate| candidate.is_file())?;
    // `/usr/bin/java` is usually a chain of links into `<home>/bin/java`.
    let launcher = launcher.canonicalize().ok()?;
    Some(launcher.parent()?.parent()?.to_path_buf())
}

/// The directory holding the `release` file: `dir` itself or, for a pre-9 `jre`, its parent.
fn jdk_root(dir: PathBuf) -> Option<PathBuf> {
    dir.ancestors()
        .take(2)
        .find(|candidate| candidate.join("release").is_file())
        .map(Path::to_path_buf)
}

fn list_archives(dir: &Path, extension: &str) -> Vec<PathEntry> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();
    paths.sort();
    paths.into_iter().map(PathEntry::archive).collect()
}

/// Outcome of selecting a toolchain for a project.
#[derive(Debug, Clone)]
pub struct ToolchainSelection {
    /// The selected toolchain, `None` when not even a default is registered.
    pub toolchain: Option<Arc<Toolchain>>,
    /// `true` when the requested toolchain was unavailable and a fallback was used.
    pub degraded: bool,
}

/// The set of toolchains known to the engine.
#[derive(Debug, Clone, Default)]
pub struct ToolchainRegistry {
    toolchains: BTreeMap<String, Arc<Toolchain>>,
    default_id: Option<String>,
}

impl ToolchainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the installed JDKs named by the environment.
    ///
    /// `JAVA_HOME` and the `java` launcher on `PATH` (symlinks resolved) are both
    /// registered when they differ; `JAVA_HOME` is the default. Ids are `jdk<feature>`, with
    /// a numeric suffix when two JDKs share a feature release.
    pub fn discover_default() -> Result<Self, JdkError> {
        Self::discover_from_env(|key| std::env::var_os(key))
    }

    fn discover_from_env(env: impl Fn(&str) -> Option<OsString>) -> Result<Self, JdkError> {
        let mut homes: Vec<PathBuf> = Vec::new();
        let candidates = [
            env("JAVA_HOME").map(PathBuf::from),
            env("PATH").and_then(|path| home_of_launcher_on(&path)),
        ];
        for home in candidates.into_iter().flatten().filter_map(jdk_root) {
            if !homes.contains(&home) {
                homes.push(home);
            }
        }

        let mut registry = Self::new();
        let mut first_error = None;
        for home in homes {
            match Toolchain::from_home("", &home) {
                Ok(mut toolchain) => {
                    toolchain.id = registry.unused_id(toolchain.version);
                    tracing::debug!(
                        target = "trellis.jdk",
                        id = %toolchain.id,
                        home = %home.display(),
                        "discovered JDK"
                    );
                    registry.register(toolchain);
                }
                Err(err) => {
                    tracing::warn!(
                        target = "trellis.jdk",
                        home = %home.display(),
                        error = %err,
                        "ignoring unusable JDK"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        if registry.toolchains.is_empty() {
            return Err(first_error.unwrap_or(JdkError::NotFound));
        }
        Ok(registry)
    }

    fn unused_id(&self, version: JavaVersion) -> String {
        let base = format!("jdk{}", version.0);
        std::iter::once(base.clone())
            .chain((2..).map(|n| format!("{base}-{n}")))
            .find(|id| !self.toolchains.contains_key(id))
            .unwrap_or(base)
    }

    /// Register a toolchain. The first registered toolchain becomes the default.
    pub fn register(&mut self, toolchain: Toolchain) {
        if self.default_id.is_none() {
            self.default_id = Some(toolchain.id.clone());
        }
        self.toolchains
            .insert(toolchain.id.clone(), Arc::new(toolchain));
    }

    pub fn set_default(&mut self, id: impl Into<String>) {
        self.default_id = Some(id.into());
    }

    pub fn get(&self, id: &str) -> Option<Arc<Toolchain>> {
        self.toolchains.get(id).cloned()
    }

    pub fn default_toolchain(&self) -> Option<Arc<Toolchain>> {
        self.default_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.toolchains.keys().map(String::as_str)
    }

    /// Resolve the configured toolchain identifier.
    ///
    /// `None` selects the default toolchain. Unknown identifiers fall back to the default
    /// and the selection is marked degraded.
    pub fn select(&self, requested: Option<&str>) -> ToolchainSelection {
        match requested {
            None => {
                let toolchain = self.default_toolchain();
                ToolchainSelection {
                    degraded: toolchain.is_none(),
                    toolchain,
                }
            }
            Some(id) => match self.get(id) {
                Some(toolchain) => ToolchainSelection {
                    toolchain: Some(toolchain),
                    degraded: false,
                },
                None => {
                    tracing::warn!(
                        target = "trellis.jdk",
                        requested = id,
                        fallback = self.default_id.as_deref().unwrap_or("<none>"),
                        "configured toolchain not found; falling back to the default toolchain"
                    );
                    ToolchainSelection {
                        toolchain: self.default_toolchain(),
                        degraded: true,
                    }
                }
            },
        }
    }
}
