//! Rows and payloads shared by the stores, the gateway client and the views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Origin tag written on every upload made through the orchestrator
pub const DIRECT_UPLOAD_SOURCE: &str = "direct_upload";

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque identity provider id
    pub id: String,
    /// Display email
    pub email: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: id.into(),
            email,
        }
    }
}

/// Kind of media an upload holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Anything that does not advertise an image MIME type is treated as video
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image") {
            MediaKind::Image
        } else {
            MediaKind::Video
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// A file picked by the user
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Original file name
    pub name: String,
    /// MIME type reported by the client
    pub content_type: String,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_mime(&self.content_type)
    }
}

/// Stored upload row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Upload {
    pub id: Uuid,
    pub user_id: String,
    /// `image` or `video`
    pub upload_type: String,
    /// Storage path of the object, not its public URL
    pub file_url: String,
    pub source: String,
    pub processed: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Upload row before the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpload {
    pub user_id: String,
    pub upload_type: MediaKind,
    pub file_url: String,
    pub source: String,
    pub processed: bool,
    pub description: Option<String>,
}

impl NewUpload {
    /// Build the row for a freshly stored file
    pub fn direct(user_id: &str, file: &MediaFile, storage_path: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            upload_type: file.kind(),
            file_url: storage_path.to_string(),
            source: DIRECT_UPLOAD_SOURCE.to_string(),
            processed: false,
            description: Some(file.name.clone()),
        }
    }
}

/// Stored recipe row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub upload_id: Option<Uuid>,
    pub user_id: String,
    pub title: String,
    /// Kept as raw JSON; older rows hold plain string lists
    pub ingredients: serde_json::Value,
    pub instructions: String,
    pub ai_summary: String,
    pub created_at: DateTime<Utc>,
}

/// Recipe row before the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub upload_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub ingredients: serde_json::Value,
    pub instructions: String,
    pub ai_summary: String,
}

impl NewRecipe {
    pub fn from_parsed(upload_id: Uuid, user_id: &str, parsed: &ParsedRecipe) -> Self {
        Self {
            upload_id,
            user_id: user_id.to_string(),
            title: parsed.title.clone(),
            ingredients: parsed.ingredients.clone(),
            instructions: parsed.instructions.clone(),
            ai_summary: parsed.description.clone().unwrap_or_default(),
        }
    }
}

/// Title used when the gateway's recipe does not name the dish
pub const FALLBACK_TITLE: &str = "Recipe";

/// Recipe payload returned by the inference gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRecipe {
    pub title: String,
    pub ingredients: serde_json::Value,
    pub instructions: String,
    /// Short summary, present only with model-backed parsers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParsedRecipe {
    /// Read a recipe from the gateway's loosely typed payload.
    ///
    /// Null or missing fields take defaults, step lists are joined one step
    /// per line and `steps` stands in for `instructions`. Returns `None`
    /// unless the payload is a JSON object.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let fields = value.as_object()?;

        let title = fields
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(FALLBACK_TITLE)
            .to_string();

        let ingredients = fields
            .get("ingredients")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));

        let instructions = ["instructions", "steps"]
            .iter()
            .filter_map(|key| fields.get(*key).filter(|v| !v.is_null()))
            .map(instructions_text)
            .next()
            .unwrap_or_default();

        let description = fields
            .get("description")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        Some(Self {
            title,
            ingredients,
            instructions,
            description,
        })
    }
}

fn instructions_text(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::String(s) => s.clone(),
        Value::Array(steps) => steps
            .iter()
            .map(|step| match step {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime(""), MediaKind::Video);
    }

    #[test]
    fn test_new_upload_direct() {
        let file = MediaFile::new("avocado.jpg", "image/jpeg", vec![1, 2, 3]);
        let row = NewUpload::direct("U1", &file, "public/avocado.jpg");

        assert_eq!(row.user_id, "U1");
        assert_eq!(row.upload_type, MediaKind::Image);
        assert_eq!(row.file_url, "public/avocado.jpg");
        assert_eq!(row.source, "direct_upload");
        assert!(!row.processed);
        assert_eq!(row.description.as_deref(), Some("avocado.jpg"));
    }

    #[test]
    fn test_parsed_recipe_tolerates_missing_fields() {
        let parsed = ParsedRecipe::from_value(&json!({ "title": "Soup" })).unwrap();
        assert_eq!(parsed.title, "Soup");
        assert_eq!(parsed.ingredients, json!([]));
        assert_eq!(parsed.instructions, "");
        assert!(parsed.description.is_none());

        let parsed = ParsedRecipe::from_value(&json!({})).unwrap();
        assert_eq!(parsed.title, "Recipe");
    }

    #[test]
    fn test_parsed_recipe_null_and_step_lists() {
        let parsed = ParsedRecipe::from_value(&json!({
            "title": "Soup",
            "ingredients": null,
            "instructions": null
        }))
        .unwrap();
        assert_eq!(parsed.ingredients, json!([]));
        assert_eq!(parsed.instructions, "");

        let parsed = ParsedRecipe::from_value(&json!({
            "title": "Pasta",
            "ingredients": [],
            "instructions": ["Boil water", "Add pasta"]
        }))
        .unwrap();
        assert_eq!(parsed.instructions, "Boil water\nAdd pasta");

        let parsed = ParsedRecipe::from_value(&json!({"steps": ["Chop", "Fry"]})).unwrap();
        assert_eq!(parsed.instructions, "Chop\nFry");
    }

    #[test]
    fn test_parsed_recipe_requires_object() {
        assert!(ParsedRecipe::from_value(&json!("Soup")).is_none());
        assert!(ParsedRecipe::from_value(&json!(["Soup"])).is_none());
        assert!(ParsedRecipe::from_value(&serde_json::Value::Null).is_none());
    }

    #[test]
    fn test_new_recipe_summary_from_description() {
        let parsed = ParsedRecipe {
            title: "Pasta".to_string(),
            ingredients: json!([]),
            instructions: "Boil.".to_string(),
            description: Some("Quick pasta.".to_string()),
        };
        let row = NewRecipe::from_parsed(Uuid::new_v4(), "U1", &parsed);
        assert_eq!(row.ai_summary, "Quick pasta.");

        let parsed = ParsedRecipe {
            description: None,
            ..parsed
        };
        let row = NewRecipe::from_parsed(Uuid::new_v4(), "U1", &parsed);
        assert_eq!(row.ai_summary, "");
    }
}
