//! Cheap Food Parser Service
//!
//! Inference gateway behind `POST /parse`. Takes the storage path of an
//! uploaded meal photo or clip and answers with a structured recipe:
//!
//! ```text
//! {"upload_id": "...", "file_url": "public/avocado.jpg"}
//!     ──▶ {"recipe": {"title", "ingredients": [{"name", "amount"}], "instructions"}}
//! ```
//!
//! An empty object means the media was read but no recipe came out of it; a
//! non-2xx status means the media or the model could not be reached. The
//! service never writes recipe rows; the caller persists what it receives.

pub mod api;
pub mod backend;
pub mod config;
pub mod gemini;
pub mod recipe;

pub use backend::{ParseError, RecipeParser, StubParser};
pub use config::Config;
pub use gemini::GeminiParser;
pub use recipe::ParsedRecipe;
