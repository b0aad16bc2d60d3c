//! Shared error types for the services crate.

use thiserror::Error;

use crosspoint_core::model::{QuestionError, ScoreError};
use storage::repository::StorageError;

use crate::config::ConfigError;

/// Failures reported by an identity provider.
///
/// Each provider-specific reason is its own variant so the user can be told
/// what to fix.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("identity provider is misconfigured: {0}")]
    ProviderMisconfigured(String),
    #[error("anonymous sign-in is disabled for this project")]
    AnonymousAuthDisabled,
    #[error("this origin is not authorized to use the identity provider")]
    UnauthorizedOrigin,
    #[error("the current environment is not supported by the identity provider")]
    UnsupportedEnvironment,
    #[error("the supplied sign-in token is invalid")]
    InvalidToken,
    #[error("identity provider unreachable: {0}")]
    Network(String),
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),
}

impl IdentityError {
    /// Message suitable for the fatal-error screen.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            IdentityError::ProviderMisconfigured(detail) => format!(
                "Sign-in is misconfigured ({detail}). Check the API key and project settings."
            ),
            IdentityError::AnonymousAuthDisabled => {
                "Anonymous sign-in is disabled. Enable it in the identity provider console."
                    .to_string()
            }
            IdentityError::UnauthorizedOrigin => {
                "This site is not an authorized domain. Add it to the provider's authorized domains."
                    .to_string()
            }
            IdentityError::UnsupportedEnvironment => {
                "This environment cannot keep a sign-in session. Enable storage or use another browser."
                    .to_string()
            }
            IdentityError::InvalidToken => {
                "The sign-in token is invalid or expired. Request a new one.".to_string()
            }
            IdentityError::Network(detail) => {
                format!("Could not reach the sign-in service ({detail}).")
            }
            IdentityError::Rejected(detail) => format!("Sign-in failed: {detail}."),
        }
    }
}

/// Errors that stop the session and replace the whole UI.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum FatalError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl FatalError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            FatalError::Config(err) => format!("Configuration error: {err}"),
            FatalError::Identity(err) => err.user_message(),
        }
    }
}

/// Errors emitted by the quiz state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("no quiz exists for category {0}")]
    UnknownCategory(String),
    #[error("select an option before submitting")]
    NoSelection,
    #[error("the current question is not accepting answers")]
    NotAnswering,
    #[error("no answer has been revealed yet")]
    NotRevealed,
    #[error("quiz already finished")]
    Finished,
    #[error("no quiz is in progress")]
    NoActiveQuiz,
}

/// Errors emitted by `VerificationService`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerificationError {
    #[error("no signed-in user to verify")]
    Unauthenticated,
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `FeedService` and the posting flow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PostError {
    #[error("sign in before posting")]
    Unauthenticated,
    #[error("a question is already being posted")]
    InFlight,
    #[error(transparent)]
    Invalid(#[from] QuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors returned by `SessionController` operations.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ControllerError {
    #[error("session is not ready: {0}")]
    NotReady(&'static str),
    #[error(transparent)]
    Fatal(#[from] FatalError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Post(#[from] PostError),
}
