use async_trait::async_trait;
use crosspoint_core::model::{Identity, UserId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use storage::{Listener, Subscription};
use url::Url;

use super::{IdentityProvider, IdentityState};
use crate::config::AppConfig;
use crate::error::IdentityError;

/// Identity provider backed by the hosted accounts REST API.
#[derive(Clone)]
pub struct RestIdentityProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
    state: IdentityState,
}

impl RestIdentityProvider {
    #[must_use]
    pub fn new(endpoint: Url, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key: api_key.into(),
            state: IdentityState::default(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.identity_endpoint.clone(),
            config.provider.api_key.clone(),
        )
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/accounts:{method}",
            self.endpoint.as_str().trim_end_matches('/')
        )
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> Result<R, IdentityError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .map(|envelope| envelope.error.message)
                .unwrap_or_default();
            tracing::warn!(%status, method, %message, "identity request rejected");
            return Err(classify_error(status, &message));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| IdentityError::Rejected(format!("malformed response: {e}")))
    }

    async fn lookup(&self, id_token: &str) -> Result<AccountInfo, IdentityError> {
        let body: LookupResponse = self
            .call("lookup", &LookupRequest { id_token })
            .await?;
        body.users
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::Rejected("account lookup returned no user".into()))
    }
}

/// Map a provider error response to the reason shown to the user.
#[must_use]
pub fn classify_error(status: StatusCode, message: &str) -> IdentityError {
    let code = message
        .split([' ', ':'])
        .next()
        .unwrap_or_default()
        .trim();
    match code {
        "OPERATION_NOT_ALLOWED" | "ADMIN_ONLY_OPERATION" => IdentityError::AnonymousAuthDisabled,
        "INVALID_CUSTOM_TOKEN" | "CREDENTIAL_MISMATCH" | "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" => {
            IdentityError::InvalidToken
        }
        "CONFIGURATION_NOT_FOUND" | "PROJECT_NOT_FOUND" | "INVALID_API_KEY" => {
            IdentityError::ProviderMisconfigured(code.to_string())
        }
        "UNAUTHORIZED_DOMAIN" => IdentityError::UnauthorizedOrigin,
        "OPERATION_NOT_SUPPORTED_IN_THIS_ENVIRONMENT" => IdentityError::UnsupportedEnvironment,
        _ if message.starts_with("API key not valid") => {
            IdentityError::ProviderMisconfigured("invalid API key".into())
        }
        _ if message.contains("referer") || status == StatusCode::FORBIDDEN => {
            IdentityError::UnauthorizedOrigin
        }
        _ if message.is_empty() => IdentityError::Rejected(format!("HTTP {status}")),
        _ => IdentityError::Rejected(message.to_string()),
    }
}

fn user_id(raw: String) -> Result<UserId, IdentityError> {
    UserId::new(raw).map_err(|e| IdentityError::Rejected(e.to_string()))
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in_anonymously(&self) -> Result<Identity, IdentityError> {
        let body: SignInResponse = self
            .call(
                "signUp",
                &SignUpRequest {
                    return_secure_token: true,
                },
            )
            .await?;
        let uid = body
            .local_id
            .ok_or_else(|| IdentityError::Rejected("sign-up returned no user id".into()))?;
        let identity = Identity::new(user_id(uid)?, None, true);
        tracing::info!(user_id = %identity.user_id(), "signed in anonymously");
        self.state.set(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in_with_token(&self, token: &str) -> Result<Identity, IdentityError> {
        let body: SignInResponse = self
            .call(
                "signInWithCustomToken",
                &CustomTokenRequest {
                    token,
                    return_secure_token: true,
                },
            )
            .await?;
        let account = self.lookup(&body.id_token).await?;
        let identity = Identity::new(
            user_id(account.local_id)?,
            account.display_name.as_deref(),
            false,
        );
        tracing::info!(user_id = %identity.user_id(), "signed in with token");
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

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpRequest {
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    local_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}
