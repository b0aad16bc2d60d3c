#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod feed_service;
pub mod identity;
pub mod quiz;
pub mod verification_service;

pub use crosspoint_core::Clock;

pub use config::{AppConfig, ConfigError, ConfigKey};
pub use controller::{QuizProgress, Screen, SessionController, View};
pub use error::{
    ControllerError, FatalError, IdentityError, PostError, QuizError, VerificationError,
};
pub use feed_service::FeedService;
pub use identity::{IdentityProvider, LocalIdentityProvider, RestIdentityProvider};
pub use verification_service::{QuizVerdict, VerificationService};
