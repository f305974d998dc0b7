//! Error types shared by the registry, the validator and the render pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the core can report to its caller.
#[derive(Debug, Error)]
pub enum Error {
    /// No package with that name in the current snapshot.
    #[error("template '{name}' not found")]
    TemplateNotFound { name: String },

    /// The package's shape file could not be read or parsed.
    #[error("invalid shape definition {}: {reason}", .path.display())]
    InvalidShapeDefinition { path: PathBuf, reason: String },

    /// A mandatory package file is missing.
    #[error("template package '{name}' is incomplete: missing {missing}")]
    IncompleteTemplatePackage { name: String, missing: String },

    /// The markup source does not compile.
    #[error("template '{name}' has invalid markup: {reason}")]
    InvalidMarkup { name: String, reason: String },

    /// The templates root cannot be read.
    #[error("template registry unavailable at {}: {source}", .root.display())]
    RegistryUnavailable {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload does not satisfy the template's shape.
    #[error("payload validation failed: {0}")]
    ValidationError(ValidationErrors),

    /// The markup or stylesheet references a file the package does not ship.
    #[error("template '{template}' references missing asset '{reference}'")]
    AssetNotFound { template: String, reference: String },

    /// Markup expansion or PDF conversion failed.
    #[error("rendering template '{template}' failed: {reason}")]
    RenderFailed { template: String, reason: String },

    /// The service configuration could not be loaded.
    #[error("invalid configuration {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

/// Stable discriminant a transport layer can map to response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TemplateNotFound,
    InvalidShapeDefinition,
    IncompleteTemplatePackage,
    InvalidMarkup,
    RegistryUnavailable,
    ValidationError,
    AssetNotFound,
    RenderFailed,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TemplateNotFound { .. } => ErrorKind::TemplateNotFound,
            Error::InvalidShapeDefinition { .. } => ErrorKind::InvalidShapeDefinition,
            Error::IncompleteTemplatePackage { .. } => ErrorKind::IncompleteTemplatePackage,
            Error::InvalidMarkup { .. } => ErrorKind::InvalidMarkup,
            Error::RegistryUnavailable { .. } => ErrorKind::RegistryUnavailable,
            Error::ValidationError(_) => ErrorKind::ValidationError,
            Error::AssetNotFound { .. } => ErrorKind::AssetNotFound,
            Error::RenderFailed { .. } => ErrorKind::RenderFailed,
            Error::Config { .. } => ErrorKind::Config,
        }
    }

    /// HTTP-style status a transport would answer with.
    pub fn status_hint(&self) -> u16 {
        match self.kind() {
            ErrorKind::TemplateNotFound => 404,
            ErrorKind::ValidationError => 400,
            _ => 500,
        }
    }

    /// Field-level detail, present only for validation failures.
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            Error::ValidationError(errors) => Some(errors.as_slice()),
            _ => None,
        }
    }
}

/// One violated rule, addressed by its path in the payload
/// (`speakers[1].name`; empty for the payload root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

/// Ordered, non-empty list of field errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub(crate) fn new(errors: Vec<FieldError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self(errors)
    }

    pub fn as_slice(&self) -> &[FieldError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First error reported for exactly `path`.
    pub fn for_path(&self, path: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.path == path)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
