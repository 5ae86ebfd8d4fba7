use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectError {
    #[error("invalid artifact coordinate `{text}`: expected `group:artifact:version[:classifier]`")]
    InvalidCoordinate { text: String },

    #[error("unknown dependency scope `{0}`")]
    UnknownScope(String),

    #[error("dependency `{0}` is not declared")]
    UnknownDependency(ArtifactCoordinate),
}

/// Maven-style artifact identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
}

impl ArtifactCoordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    /// File name of the artifact's jar in a Maven-layout repository.
    pub fn jar_file_name(&self) -> String {
        match self.classifier.as_deref() {
            Some(classifier) => format!(
                "{}-{}-{}.jar",
                self.artifact_id, self.version, classifier
            ),
            None => format!("{}-{}.jar", self.artifact_id, self.version),
        }
    }

    /// Location of the artifact's jar inside a Maven-layout repository.
    ///
    /// Returns `None` for versions that still contain unresolved property placeholders.
    pub fn repository_path(&self, repository: &Path) -> Option<PathBuf> {
        if self.version.contains("${") {
            return None;
        }

        let group_path = self.group_id.replace('.', "/");
        Some(
            repository
                .join(group_path)
                .join(&self.artifact_id)
                .join(&self.version)
                .join(self.jar_file_name()),
        )
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}

impl FromStr for ArtifactCoordinate {
    type Err = ProjectError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || ProjectError::InvalidCoordinate {
            text: text.to_string(),
        };

        let parts: Vec<&str> = text.trim().split(':').map(str::trim).collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(invalid());
        }

        match parts.as_slice() {
            [group, artifact, version] => Ok(Self::new(*group, *artifact, *version)),
            [group, artifact, version, classifier] => {
                Ok(Self::new(*group, *artifact, *version).with_classifier(*classifier))
            }
            _ => Err(invalid()),
        }
    }
}

/// Applicability tag of a declared dependency.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DependencyScope {
    #[default]
    Compile,
    Provided,
    Runtime,
    Test,
    System,
    Import,
    Processor,
}

impl DependencyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            DependencyScope::Compile => "compile",
            DependencyScope::Provided => "provided",
            DependencyScope::Runtime => "runtime",
            DependencyScope::Test => "test",
            DependencyScope::System => "system",
            DependencyScope::Import => "import",
            DependencyScope::Processor => "processor",
        }
    }
}

impl FromStr for DependencyScope {
    type Err = ProjectError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        // Maven treats a missing `<scope>` as `compile`.
        match text.trim().to_ascii_lowercase().as_str() {
            "" | "compile" => Ok(DependencyScope::Compile),
            "provided" => Ok(DependencyScope::Provided),
            "runtime" => Ok(DependencyScope::Runtime),
            "test" => Ok(DependencyScope::Test),
            "system" => Ok(DependencyScope::System),
            "import" => Ok(DependencyScope::Import),
            "processor" => Ok(DependencyScope::Processor),
            _ => Err(ProjectError::UnknownScope(text.to_string())),
        }
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
