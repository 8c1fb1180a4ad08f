//! Presentation of recipes, shared by the upload result and the gallery.

use crate::error::StoreError;
use crate::metadata_store::MetadataStore;
use crate::models::{ParsedRecipe, Recipe};
use crate::session::Session;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Recipe ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub title: String,
    /// One display line per list item
    pub ingredients: Vec<String>,
    pub instructions: String,
    /// `instructions` split on embedded line breaks
    pub instruction_lines: Vec<String>,
}

impl RecipeView {
    pub fn from_parsed(recipe: &ParsedRecipe) -> Self {
        Self::build(None, &recipe.title, &recipe.ingredients, &recipe.instructions)
    }

    pub fn from_row(recipe: &Recipe) -> Self {
        Self::build(
            Some(recipe.id),
            &recipe.title,
            &recipe.ingredients,
            &recipe.instructions,
        )
    }

    fn build(id: Option<Uuid>, title: &str, ingredients: &Value, instructions: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            ingredients: render_ingredients(ingredients),
            instructions: instructions.to_string(),
            instruction_lines: instructions.lines().map(str::to_string).collect(),
        }
    }
}

/// Render an ingredient list into display lines.
///
/// Strings render bare, `{name, amount}` objects as `name (amount)` or `name`,
/// and a value that is not a list renders as its JSON text.
pub fn render_ingredients(ingredients: &Value) -> Vec<String> {
    match ingredients {
        Value::Array(items) => items.iter().map(render_ingredient).collect(),
        other => vec![other.to_string()],
    }
}

fn render_ingredient(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(fields) => {
            let name = fields.get("name").map(display_text).unwrap_or_default();
            match fields.get("amount").filter(|a| is_present(a)) {
                Some(amount) => format!("{} ({})", name, display_text(amount)),
                None => name,
            }
        }
        other => other.to_string(),
    }
}

/// Text of a scalar without JSON quoting
fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Empty strings, zero, false and null count as no amount
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Recipes of the session's principal, newest first. Anonymous sessions see nothing.
pub async fn load_gallery(
    store: &dyn MetadataStore,
    session: &Session,
) -> Result<Vec<RecipeView>, StoreError> {
    let Some(principal) = session.principal() else {
        return Ok(Vec::new());
    };

    let recipes = store.list_recipes(&principal.id).await?;
    Ok(recipes.iter().map(RecipeView::from_row).collect())
}

/// Greeting shown on the dashboard
pub fn welcome_message(session: &Session) -> String {
    match session.principal().and_then(|p| p.email.as_deref()) {
        Some(email) => format!("Welcome, {}", email),
        None => "Welcome".to_string(),
    }
}
