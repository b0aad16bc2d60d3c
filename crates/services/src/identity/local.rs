use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use crosspoint_core::model::{Identity, UserId};
use rand::Rng;
use rand::distr::Alphanumeric;
use storage::{Listener, Subscription};

use super::{IdentityProvider, IdentityState};
use crate::error::IdentityError;

const ANONYMOUS_UID_LEN: usize = 28;

#[derive(Debug, Clone)]
struct TokenGrant {
    user_id: UserId,
    display_name: Option<String>,
}

/// Offline identity provider.
///
/// Anonymous sign-in mints a random uid; token sign-in resolves against a
/// table registered up front.
#[derive(Clone)]
pub struct LocalIdentityProvider {
    state: IdentityState,
    tokens: Arc<Mutex<HashMap<String, TokenGrant>>>,
    allow_anonymous: bool,
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: IdentityState::default(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
            allow_anonymous: true,
        }
    }

    /// A provider that refuses anonymous sessions.
    #[must_use]
    pub fn without_anonymous() -> Self {
        Self {
            allow_anonymous: false,
            ..Self::new()
        }
    }

    /// Accept `token` as a sign-in for `user_id`.
    pub fn register_token(
        &self,
        token: impl Into<String>,
        user_id: UserId,
        display_name: Option<&str>,
    ) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                token.into(),
                TokenGrant {
                    user_id,
                    display_name: display_name.map(ToString::to_string),
                },
            );
    }
}

fn anonymous_uid() -> Result<UserId, IdentityError> {
    let raw: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(ANONYMOUS_UID_LEN)
        .map(char::from)
        .collect();
    UserId::new(raw).map_err(|e| IdentityError::Rejected(e.to_string()))
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_in_anonymously(&self) -> Result<Identity, IdentityError> {
        if !self.allow_anonymous {
            return Err(IdentityError::AnonymousAuthDisabled);
        }
        let identity = Identity::new(anonymous_uid()?, None, true);
        tracing::info!(user_id = %identity.user_id(), "signed in anonymously (local)");
        self.state.set(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<Identity, IdentityError> {
        let grant = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)?;
        let identity = Identity::new(grant.user_id, grant.display_name.as_deref(), false);
        tracing::info!(user_id = %identity.user_id(), "signed in with token (local)");
        self.state.set(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) {
        self.state.set(None);
    }

    fn current(&self) -> Option<Identity> {
        self.state.current()
    }

    fn watch(&self, listener: Listener<Option<Identity>>) -> Subscription {
        self.state.watch(listener)
    }
}
