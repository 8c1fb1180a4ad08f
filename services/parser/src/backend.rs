use crate::recipe::ParsedRecipe;
use async_trait::async_trait;
use thiserror::Error;

/// Failure that prevents a backend from producing any answer
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to fetch file from storage: status {0}")]
    Download(u16),

    #[error("Could not determine MIME type for {0}")]
    UnsupportedMedia(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model returned {status}: {body}")]
    Model { status: u16, body: String },
}

/// Turns a stored upload into a recipe
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipeParser: Send + Sync {
    /// `Ok(None)` when the media was read but no recipe could be extracted
    async fn parse(&self, file_url: &str) -> Result<Option<ParsedRecipe>, ParseError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Answers every request with the same recipe
pub struct StubParser;

#[async_trait]
impl RecipeParser for StubParser {
    async fn parse(&self, _file_url: &str) -> Result<Option<ParsedRecipe>, ParseError> {
        Ok(Some(ParsedRecipe::avocado_toast()))
    }

    fn name(&self) -> &str {
        "stub"
    }
}
