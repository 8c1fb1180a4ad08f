use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Title used when the model does not name the dish
pub const FALLBACK_TITLE: &str = "Recipe";

/// Structured recipe returned from `/parse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecipe {
    pub title: String,
    /// List of `{name, amount}` objects, passed through as produced
    pub ingredients: Value,
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParsedRecipe {
    /// The fixed recipe served by the stub backend
    pub fn avocado_toast() -> Self {
        Self {
            title: "Avocado Toast".to_string(),
            ingredients: json!([
                { "name": "avocado", "amount": "1" },
                { "name": "bread", "amount": "2 slices" }
            ]),
            instructions: "Mash avocado, spread on toast, enjoy.".to_string(),
            description: None,
        }
    }

    /// Build a recipe from loosely structured model output.
    ///
    /// Missing or empty fields fall back to defaults; `steps` stands in for
    /// `instructions`. Returns `None` unless the output is a JSON object.
    pub fn from_model_output(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(strip_code_fence(text)).ok()?;
        let fields = value.as_object()?;

        let title = non_empty_text(fields, "title").unwrap_or_else(|| FALLBACK_TITLE.to_string());

        let ingredients = fields
            .get("ingredients")
            .filter(|v| is_truthy(v))
            .cloned()
            .unwrap_or_else(|| json!([]));

        let instructions = ["instructions", "steps"]
            .iter()
            .filter_map(|key| fields.get(*key).filter(|v| is_truthy(v)))
            .map(instructions_text)
            .next()
            .unwrap_or_default();

        Some(Self {
            title,
            ingredients,
            instructions,
            description: non_empty_text(fields, "description"),
        })
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```)
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn non_empty_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

/// Step lists are joined one step per line
fn instructions_text(value: &Value) -> String {
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
