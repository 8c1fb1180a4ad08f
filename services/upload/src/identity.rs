use crate::config::IdentityConfig;
use crate::error::IdentityError;
use crate::models::Principal;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Resolves access tokens to principals
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Principal the token belongs to, `None` when the token is not (or no longer) valid
    async fn current_principal(&self, access_token: &str)
        -> Result<Option<Principal>, IdentityError>;

    /// Revoke the session behind the token
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;
}

/// Supabase GoTrue client
pub struct SupabaseIdentity {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
}

impl SupabaseIdentity {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    #[instrument(skip_all)]
    async fn current_principal(
        &self,
        access_token: &str,
    ) -> Result<Option<Principal>, IdentityError> {
        let response = self
            .client
            .get(self.endpoint("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let user: GoTrueUser = response.json().await?;
            debug!(user_id = %user.id, "Resolved principal");
            Ok(Some(Principal::new(user.id, user.email)))
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Ok(None)
        } else {
            Err(IdentityError::Unexpected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    #[instrument(skip_all)]
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let response = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        // An already expired session is as signed out as it gets
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(IdentityError::Unexpected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}
