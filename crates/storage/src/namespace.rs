use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NamespaceError {
    #[error("namespace cannot be empty")]
    Empty,

    #[error("namespace cannot contain '/': {0}")]
    ContainsSlash(String),
}

/// Deployment scope for every collection, so several deployments can share
/// one store without seeing each other's data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub const DEFAULT: &'static str = "default-app-id";

    /// # Errors
    ///
    /// Returns `NamespaceError` if the value is blank or contains `/`.
    pub fn new(value: impl Into<String>) -> Result<Self, NamespaceError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NamespaceError::Empty);
        }
        if trimmed.contains('/') {
            return Err(NamespaceError::ContainsSlash(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the shared question collection.
    #[must_use]
    pub fn questions_path(&self) -> String {
        format!("artifacts/{}/public/data/questions", self.0)
    }

    /// Path of one user's verification document.
    #[must_use]
    pub fn profile_path(&self, user_id: &str) -> String {
        format!("artifacts/{}/public/data/user_profiles/{user_id}", self.0)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
