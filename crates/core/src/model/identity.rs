use serde::{Deserialize, Serialize};

use crate::model::UserId;

const SYNTHESIZED_PREFIX_LEN: usize = 6;

/// The signed-in user as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    user_id: UserId,
    display_name: String,
    anonymous: bool,
}

impl Identity {
    /// Build an identity, falling back to a name derived from the subject id
    /// when the provider has none.
    #[must_use]
    pub fn new(user_id: UserId, provider_name: Option<&str>, anonymous: bool) -> Self {
        let display_name = provider_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| synthesize_display_name(&user_id), ToString::to_string);
        Self {
            user_id,
            display_name,
            anonymous,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

/// `User-` followed by the first six characters of the subject id.
#[must_use]
pub fn synthesize_display_name(user_id: &UserId) -> String {
    let prefix: String = user_id
        .as_str()
        .chars()
        .take(SYNTHESIZED_PREFIX_LEN)
        .collect();
    format!("User-{prefix}")
}
