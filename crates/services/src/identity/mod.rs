//! Identity providers and the shared "current user" state they publish.

mod local;
mod rest;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use crosspoint_core::model::Identity;
use storage::{Listener, Listeners, Subscription};

use crate::error::IdentityError;

pub use local::LocalIdentityProvider;
pub use rest::{RestIdentityProvider, classify_error};

/// Source of the signed-in user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `IdentityError` when the provider refuses anonymous sessions or
    /// cannot be reached.
    async fn sign_in_anonymously(&self) -> Result<Identity, IdentityError>;

    /// # Errors
    ///
    /// Returns `IdentityError::InvalidToken` for a rejected token, or another
    /// variant for provider failures.
    async fn sign_in_with_token(&self, token: &str) -> Result<Identity, IdentityError>;

    async fn sign_out(&self);

    fn current(&self) -> Option<Identity>;

    /// Watch identity changes. The current value is delivered before this
    /// returns.
    fn watch(&self, listener: Listener<Option<Identity>>) -> Subscription;
}

/// Current identity plus its watchers. Providers embed one of these.
#[derive(Clone, Default)]
pub(crate) struct IdentityState {
    current: Arc<Mutex<Option<Identity>>>,
    watchers: Listeners<(), Option<Identity>>,
}

impl IdentityState {
    pub(crate) fn current(&self) -> Option<Identity> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set(&self, identity: Option<Identity>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = identity.clone();
        for listener in self.watchers.for_key(&()) {
            listener.deliver(identity.clone());
        }
    }

    pub(crate) fn watch(&self, listener: Listener<Option<Identity>>) -> Subscription {
        let (listener, subscription) = self.watchers.register((), listener);
        listener.deliver(self.current());
        subscription
    }
}
