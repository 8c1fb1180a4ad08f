use crate::config::InferenceConfig;
use crate::error::GatewayError;
use crate::models::ParsedRecipe;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Converts a stored upload into a structured recipe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// `Ok(None)` when the gateway answered but produced no recipe
    async fn parse(
        &self,
        upload_id: Uuid,
        file_url: &str,
    ) -> Result<Option<ParsedRecipe>, GatewayError>;
}

#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    upload_id: Uuid,
    file_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    recipe: Option<serde_json::Value>,
}

impl ParseResponse {
    /// The recipe, if the gateway sent one shaped like a recipe
    fn into_recipe(self) -> Option<ParsedRecipe> {
        self.recipe.as_ref().and_then(ParsedRecipe::from_value)
    }
}

/// HTTP client for the parser service's `POST /parse`
pub struct HttpInferenceGateway {
    endpoint: String,
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpInferenceGateway {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout: config.timeout(),
        }
    }

    fn parse_url(&self) -> String {
        format!("{}/parse", self.endpoint)
    }
}

#[async_trait]
impl InferenceGateway for HttpInferenceGateway {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn parse(
        &self,
        upload_id: Uuid,
        file_url: &str,
    ) -> Result<Option<ParsedRecipe>, GatewayError> {
        let mut request = self
            .client
            .post(self.parse_url())
            .json(&ParseRequest { upload_id, file_url });

        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(GatewayError::Status(response.status().as_u16()));
        }

        let body: ParseResponse = response.json().await?;
        let recipe = body.into_recipe();
        debug!(has_recipe = recipe.is_some(), "Gateway responded");

        Ok(recipe)
    }
}
