//! Cheap Food Upload Service
//!
//! Turns a meal photo into a stored recipe. A signed-in user posts a file; the
//! service writes it to object storage, records an upload row, asks the parser
//! service for a recipe and records the recipe row. Each step reports a status
//! the client can show as-is.
//!
//! ## Architecture
//!
//! ```text
//!  client ──▶ Upload API ──▶ Orchestrator ──▶ Object Store (S3 / memory)
//!                 │              │
//!                 │              ├──────────▶ Metadata Store (PostgreSQL / memory)
//!                 │              │                 uploads, recipes
//!                 │              └──────────▶ Inference Gateway (POST /parse)
//!                 │
//!                 └──▶ Identity Provider (bearer token -> principal)
//! ```
//!
//! The session is resolved once per request and passed explicitly to the
//! orchestrator and the views.

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod inference;
pub mod metadata_store;
pub mod models;
pub mod object_store;
pub mod orchestrator;
pub mod session;
pub mod views;

pub use config::Config;
pub use error::{GatewayError, IdentityError, StoreError, UploadError};
pub use identity::{IdentityProvider, SupabaseIdentity};
pub use inference::{HttpInferenceGateway, InferenceGateway};
pub use metadata_store::{MemoryMetadataStore, MetadataStore, PgMetadataStore};
pub use models::{MediaFile, MediaKind, ParsedRecipe, Principal, Recipe, Upload};
pub use object_store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use orchestrator::{UploadOrchestrator, UploadOutcome, UploadStatus};
pub use session::{AuthNavigator, AuthSession, AuthState, Session, View};
pub use views::{render_ingredients, RecipeView};
