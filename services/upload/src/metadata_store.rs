use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{NewRecipe, NewUpload, Recipe, Upload};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Relational store for upload and recipe rows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert an upload row and return it as stored
    async fn insert_upload(&self, upload: &NewUpload) -> Result<Upload, StoreError>;

    /// Insert a recipe row and return it as stored
    async fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe, StoreError>;

    /// Uploads owned by `user_id`, newest first
    async fn list_uploads(&self, user_id: &str) -> Result<Vec<Upload>, StoreError>;

    /// Recipes owned by `user_id`, newest first
    async fn list_recipes(&self, user_id: &str) -> Result<Vec<Recipe>, StoreError>;

    /// Whether the store is reachable
    async fn ping(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    #[instrument(
        skip(self, upload),
        fields(user_id = %upload.user_id, file_url = %upload.file_url)
    )]
    async fn insert_upload(&self, upload: &NewUpload) -> Result<Upload, StoreError> {
        let row = sqlx::query_as::<_, Upload>(
            r#"
            INSERT INTO uploads (
                user_id, upload_type, file_url, source, processed, description
            ) VALUES (
                $1, $2, $3, $4, $5, $6
            )
            RETURNING id, user_id, upload_type, file_url, source,
                      processed, description, created_at
            "#,
        )
        .bind(&upload.user_id)
        .bind(upload.upload_type.as_str())
        .bind(&upload.file_url)
        .bind(&upload.source)
        .bind(upload.processed)
        .bind(&upload.description)
        .fetch_one(&self.pool)
        .await?;

        debug!(upload_id = %row.id, "Upload row inserted");
        Ok(row)
    }

    #[instrument(
        skip(self, recipe),
        fields(upload_id = %recipe.upload_id, user_id = %recipe.user_id)
    )]
    async fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe, StoreError> {
        let row = sqlx::query_as::<_, Recipe>(
            r#"
            INSERT INTO recipes (
                upload_id, user_id, title, ingredients, instructions, ai_summary
            ) VALUES (
                $1, $2, $3, $4, $5, $6
            )
            RETURNING id, upload_id, user_id, title, ingredients,
                      instructions, ai_summary, created_at
            "#,
        )
        .bind(recipe.upload_id)
        .bind(&recipe.user_id)
        .bind(&recipe.title)
        .bind(&recipe.ingredients)
        .bind(&recipe.instructions)
        .bind(&recipe.ai_summary)
        .fetch_one(&self.pool)
        .await?;

        debug!(recipe_id = %row.id, "Recipe row inserted");
        Ok(row)
    }

    async fn list_uploads(&self, user_id: &str) -> Result<Vec<Upload>, StoreError> {
        let rows = sqlx::query_as::<_, Upload>(
            r#"
            SELECT id, user_id, upload_type, file_url, source,
                   processed, description, created_at
            FROM uploads
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_recipes(&self, user_id: &str) -> Result<Vec<Recipe>, StoreError> {
        let rows = sqlx::query_as::<_, Recipe>(
            r#"
            SELECT id, upload_id, user_id, title, ingredients,
                   instructions, ai_summary, created_at
            FROM recipes
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local metadata store, used when no database is configured
#[derive(Default)]
pub struct MemoryMetadataStore {
    uploads: RwLock<Vec<Upload>>,
    recipes: RwLock<Vec<Recipe>>,
}

fn poisoned() -> StoreError {
    StoreError::Backend("metadata store lock poisoned".to_string())
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload row, in insertion order
    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.read().map(|u| u.clone()).unwrap_or_default()
    }

    /// Every recipe row, in insertion order
    pub fn recipes(&self) -> Vec<Recipe> {
        self.recipes.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_upload(&self, upload: &NewUpload) -> Result<Upload, StoreError> {
        let row = Upload {
            id: Uuid::new_v4(),
            user_id: upload.user_id.clone(),
            upload_type: upload.upload_type.as_str().to_string(),
            file_url: upload.file_url.clone(),
            source: upload.source.clone(),
            processed: upload.processed,
            description: upload.description.clone(),
            created_at: Utc::now(),
        };
        self.uploads.write().map_err(|_| poisoned())?.push(row.clone());
        Ok(row)
    }

    async fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe, StoreError> {
        let row = Recipe {
            id: Uuid::new_v4(),
            upload_id: Some(recipe.upload_id),
            user_id: recipe.user_id.clone(),
            title: recipe.title.clone(),
            ingredients: recipe.ingredients.clone(),
            instructions: recipe.instructions.clone(),
            ai_summary: recipe.ai_summary.clone(),
            created_at: Utc::now(),
        };
        self.recipes.write().map_err(|_| poisoned())?.push(row.clone());
        Ok(row)
    }

    async fn list_uploads(&self, user_id: &str) -> Result<Vec<Upload>, StoreError> {
        // Insertion order is creation order; reverse it for newest first
        let uploads = self.uploads.read().map_err(|_| poisoned())?;
        Ok(uploads
            .iter()
            .rev()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_recipes(&self, user_id: &str) -> Result<Vec<Recipe>, StoreError> {
        let recipes = self.recipes.read().map_err(|_| poisoned())?;
        Ok(recipes
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
