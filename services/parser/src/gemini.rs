//! Gemini multimodal backend.

use crate::backend::{ParseError, RecipeParser};
use crate::config::GeminiConfig;
use crate::recipe::ParsedRecipe;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

const PROMPT: &str = r#"You are an AI chef analyzing an image or video of a meal.
Given ONLY the provided media, generate a recipe object in valid JSON matching this schema:

{
  "title": string,
  "ingredients": [ { "name": string, "amount": string } ],
  "instructions": string,
  "description": string
}

"title" is a clear meal title (invent one if none is shown). "ingredients" lists
every ingredient with an estimated quantity. "instructions" holds step-by-step
instructions as a single string. "description" is a 1-2 sentence summary with
ingredient highlights and possible substitutions.

Return ONLY the JSON, no markdown or extra text. If anything is missing from the
media, use your best guess and always include all four fields."#;

/// MIME type for a stored path, from its extension
pub fn guess_mime_type(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mpeg" | "mpg" => "video/mpeg",
        _ => return None,
    };
    Some(mime)
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Downloads the stored media and asks Gemini for a recipe
pub struct GeminiParser {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiParser {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn storage_url(&self, file_url: &str) -> String {
        format!(
            "{}/{}",
            self.config.storage_base_url.trim_end_matches('/'),
            file_url.trim_start_matches('/')
        )
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn download(&self, file_url: &str) -> Result<Vec<u8>, ParseError> {
        let response = self
            .client
            .get(self.storage_url(file_url))
            .timeout(self.config.request_timeout())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ParseError::Download(response.status().as_u16()));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn generate(&self, mime_type: &str, media: &[u8]) -> Result<String, ParseError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: PROMPT },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type,
                            data: STANDARD.encode(media),
                        },
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .timeout(self.config.request_timeout())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ParseError::Model { status, body });
        }

        let body: GenerateContentResponse = response.json().await?;
        Ok(body.text())
    }
}

#[async_trait]
impl RecipeParser for GeminiParser {
    #[instrument(skip(self), fields(model = %self.config.model))]
    async fn parse(&self, file_url: &str) -> Result<Option<ParsedRecipe>, ParseError> {
        let mime_type = guess_mime_type(file_url)
            .ok_or_else(|| ParseError::UnsupportedMedia(file_url.to_string()))?;

        let media = self.download(file_url).await?;
        debug!(size_bytes = media.len(), mime_type, "Downloaded media");

        let text = self.generate(mime_type, &media).await?;
        debug!(raw = %text, "Model output");

        let recipe = ParsedRecipe::from_model_output(&text);
        if recipe.is_none() {
            warn!("Model output was not a JSON object");
        }
        Ok(recipe)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn config() -> GeminiConfig {
        GeminiConfig {
            api_key: "key".to_string(),
            model: "gemini-test".to_string(),
            api_base: "https://generativelanguage.googleapis.com/".to_string(),
            storage_base_url: "https://abc.supabase.co/storage/v1/object/uploads/".to_string(),
            request_timeout_secs: 10,
        }
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("public/avocado.jpg"), Some("image/jpeg"));
        assert_eq!(guess_mime_type("public/AVOCADO.JPEG"), Some("image/jpeg"));
        assert_eq!(guess_mime_type("public/clip.mov"), Some("video/quicktime"));
        assert_eq!(guess_mime_type("public/notes.txt"), None);
        assert_eq!(guess_mime_type("public/noext"), None);
    }

    #[test]
    fn test_urls() {
        let parser = GeminiParser::new(config());
        assert_eq!(
            parser.storage_url("public/avocado.jpg"),
            "https://abc.supabase.co/storage/v1/object/uploads/public/avocado.jpg"
        );
        assert_eq!(
            parser.generate_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "prompt" },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: "AAAA".to_string(),
                        },
                    },
                ],
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "prompt");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["data"], "AAAA");
    }

    #[test]
    fn test_response_text() {
        let json = r#"{
            "candidates": [{
                "content": { "parts": [{"text": "{\"title\": "}, {"text": "\"Soup\"}"}] }
            }]
        }"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), r#"{"title": "Soup"}"#);

        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), "");
    }

    #[tokio::test]
    async fn test_unsupported_media_fails_before_download() {
        let parser = GeminiParser::new(config());
        let err = assert_err!(parser.parse("public/readme.txt").await);
        assert!(matches!(err, ParseError::UnsupportedMedia(_)));
    }
}
