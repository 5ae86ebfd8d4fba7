//! Writes to the project model, each followed by targeted invalidation.

use std::error::Error as StdError;

use thiserror::Error;
use trellis_jdk::ToolchainRegistry;
use trellis_project::{
    ArtifactCoordinate, CompilerConfig, Dependency, OutputDir, ProjectError, ProjectMutation,
    ProjectSnapshot, Resolution, ResourceRoot, SourceRoot,
};

use crate::context::ProjectContext;
use crate::view::ViewKey;

/// Failure to write a mutation back to the project descriptor.
#[derive(Debug, Error)]
#[error("failed to persist project descriptor: {message}")]
pub struct PersistError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl PersistError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Writes the in-memory model back to the build descriptor after a mutation.
pub trait DescriptorPersistence: Send + Sync {
    fn persist(
        &self,
        snapshot: &ProjectSnapshot,
        mutation: &ProjectMutation,
    ) -> Result<(), PersistError>;
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("dependency `{0}` is not declared")]
    UnknownDependency(ArtifactCoordinate),

    #[error(transparent)]
    Project(ProjectError),

    /// The in-memory change was applied and views were invalidated, but the descriptor
    /// on disk was not updated.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl From<ProjectError> for MutationError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::UnknownDependency(coordinate) => Self::UnknownDependency(coordinate),
            other => Self::Project(other),
        }
    }
}

impl ProjectContext {
    /// Add a dependency, replacing an existing declaration of the same coordinate.
    pub fn declare_dependency(&self, dependency: Dependency) -> Result<Vec<ViewKey>, MutationError> {
        self.mutate(ProjectMutation::DependenciesChanged, |snapshot| {
            Ok(snapshot.with_dependency(dependency))
        })
    }

    pub fn remove_dependency(
        &self,
        coordinate: &ArtifactCoordinate,
    ) -> Result<Vec<ViewKey>, MutationError> {
        self.mutate(ProjectMutation::DependenciesChanged, |snapshot| {
            snapshot.without_dependency(coordinate)
        })
    }

    /// Record a new resolution state (e.g. after a download) for a declared dependency.
    pub fn update_dependency(
        &self,
        coordinate: &ArtifactCoordinate,
        resolution: Resolution,
    ) -> Result<Vec<ViewKey>, MutationError> {
        self.mutate(ProjectMutation::DependenciesChanged, |snapshot| {
            let mut dependency = snapshot
                .dependency(coordinate)
                .cloned()
                .ok_or_else(|| ProjectError::UnknownDependency(coordinate.clone()))?;
            dependency.resolution = resolution;
            Ok(snapshot.with_dependency(dependency))
        })
    }

    pub fn set_toolchain(&self, toolchain: Option<String>) -> Result<Vec<ViewKey>, MutationError> {
        self.mutate(ProjectMutation::ToolchainChanged, |snapshot| {
            Ok(snapshot.with_toolchain(toolchain))
        })
    }

    pub fn set_source_roots(&self, roots: Vec<SourceRoot>) -> Result<Vec<ViewKey>, MutationError> {
        self.mutate(ProjectMutation::SourceRootsChanged, |snapshot| {
            Ok(snapshot.with_source_roots(roots))
        })
    }

    pub fn set_resource_roots(
        &self,
        roots: Vec<ResourceRoot>,
    ) -> Result<Vec<ViewKey>, MutationError> {
        self.mutate(ProjectMutation::ResourceRootsChanged, |snapshot| {
            Ok(snapshot.with_resource_roots(roots))
        })
    }

    pub fn set_output_dirs(&self, dirs: Vec<OutputDir>) -> Result<Vec<ViewKey>, MutationError> {
        self.mutate(ProjectMutation::OutputDirsChanged, |snapshot| {
            Ok(snapshot.with_output_dirs(dirs))
        })
    }

    pub fn set_compiler_config(
        &self,
        compiler: CompilerConfig,
    ) -> Result<Vec<ViewKey>, MutationError> {
        self.mutate(ProjectMutation::CompilerConfigChanged, |snapshot| {
            Ok(snapshot.with_compiler(compiler))
        })
    }

    /// Swap in a reloaded project model.
    ///
    /// Starts a new epoch: background results computed against the previous model are
    /// discarded. Nothing is persisted, since the new model came from the descriptor.
    pub fn replace_snapshot(&self, snapshot: ProjectSnapshot) -> Vec<ViewKey> {
        self.inner.snapshot.replace(snapshot);
        tracing::debug!(
            target = "trellis.project",
            epoch = self.inner.snapshot.epoch(),
            "project snapshot replaced"
        );
        self.inner
            .router
            .on_project_mutation(&ProjectMutation::SnapshotReplaced)
    }

    /// Swap the set of known toolchains, e.g. after the user registers a new JDK.
    pub fn set_toolchains(&self, toolchains: ToolchainRegistry) -> Vec<ViewKey> {
        *self.inner.toolchains.write() = std::sync::Arc::new(toolchains);
        self.inner
            .router
            .on_project_mutation(&ProjectMutation::ToolchainChanged)
    }

    fn mutate(
        &self,
        mutation: ProjectMutation,
        next: impl FnOnce(&ProjectSnapshot) -> Result<ProjectSnapshot, ProjectError>,
    ) -> Result<Vec<ViewKey>, MutationError> {
        let snapshot = self.inner.snapshot.update(next)?;
        let invalidated = self.inner.router.on_project_mutation(&mutation);

        if let Some(persistence) = &self.inner.persistence {
            // The in-memory model stays authoritative; a failed write is reported, not undone.
            if let Err(err) = persistence.persist(&snapshot, &mutation) {
                tracing::warn!(
                    target = "trellis.project",
                    mutation = ?mutation,
                    error = %err,
                    "failed to persist project mutation"
                );
                return Err(MutationError::Persist(err));
            }
        }
        Ok(invalidated)
    }
}
