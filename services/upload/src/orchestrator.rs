//! Upload-and-parse orchestration.
//!
//! One invocation walks a file through four external calls, strictly in order:
//!
//! ```text
//! object store put ──▶ public URL ──▶ session check ──▶ uploads insert
//!                                                           │
//!            recipes insert ◀── inference gateway ◀─────────┘
//! ```
//!
//! Every failure is terminal for the invocation and becomes a status message.
//! Nothing written by an earlier step is rolled back.

use crate::error::UploadError;
use crate::inference::InferenceGateway;
use crate::metadata_store::MetadataStore;
use crate::models::{MediaFile, NewRecipe, NewUpload, Upload};
use crate::object_store::{object_path, ObjectStore};
use crate::session::Session;
use crate::views::RecipeView;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// User-visible progress of one upload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Parsing,
    Generated,
    Failed(UploadError),
}

impl UploadStatus {
    /// Status text, `None` while idle
    pub fn message(&self) -> Option<String> {
        match self {
            UploadStatus::Idle => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Generated | UploadStatus::Failed(_))
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Idle => Ok(()),
            UploadStatus::Uploading => f.write_str("Uploading file..."),
            UploadStatus::Parsing => f.write_str("File uploaded. Parsing with AI..."),
            UploadStatus::Generated => f.write_str("Recipe generated!"),
            UploadStatus::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl Serialize for UploadStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Everything an invocation produced, including partial results of failed runs
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadOutcome {
    pub status: UploadStatus,
    /// Public URL of the stored object, set as soon as the write succeeds
    pub image_url: Option<String>,
    pub upload: Option<Upload>,
    pub recipe_id: Option<Uuid>,
    pub recipe: Option<RecipeView>,
}

/// Drives a single upload through storage, metadata and inference
pub struct UploadOrchestrator {
    object_store: Arc<dyn ObjectStore>,
    metadata_store: Arc<dyn MetadataStore>,
    gateway: Arc<dyn InferenceGateway>,
}

impl UploadOrchestrator {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        metadata_store: Arc<dyn MetadataStore>,
        gateway: Arc<dyn InferenceGateway>,
    ) -> Self {
        Self {
            object_store,
            metadata_store,
            gateway,
        }
    }

    /// Store, record and parse one file.
    ///
    /// `status` receives every transition, in order. A missing file is a
    /// no-op. The call never fails; the terminal status carries any error.
    #[instrument(
        skip_all,
        fields(
            file = file.as_ref().map(|f| f.name.as_str()).unwrap_or_default(),
            user_id = session.principal().map(|p| p.id.as_str()).unwrap_or_default()
        )
    )]
    pub async fn submit_upload(
        &self,
        session: &Session,
        file: Option<MediaFile>,
        status: &mpsc::UnboundedSender<UploadStatus>,
    ) -> UploadOutcome {
        let Some(file) = file else {
            return UploadOutcome::default();
        };

        let mut outcome = UploadOutcome::default();
        publish(status, UploadStatus::Uploading);

        let terminal = match self.run(session, &file, status, &mut outcome).await {
            Ok(()) => {
                metrics::counter!("recipes.created").increment(1);
                UploadStatus::Generated
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "Upload did not complete");
                metrics::counter!("uploads.failed", "reason" => e.code()).increment(1);
                UploadStatus::Failed(e)
            }
        };

        publish(status, terminal.clone());
        outcome.status = terminal;
        outcome
    }

    async fn run(
        &self,
        session: &Session,
        file: &MediaFile,
        status: &mpsc::UnboundedSender<UploadStatus>,
        outcome: &mut UploadOutcome,
    ) -> Result<(), UploadError> {
        // 1. Object write
        let stored = self
            .object_store
            .put(&object_path(&file.name), &file.content_type, &file.data)
            .await
            .map_err(|e| UploadError::Storage(e.to_string()))?;

        // 2. Public reference
        outcome.image_url = Some(self.object_store.public_url(&stored.path));

        // 3. Principal. The object above stays stored when this fails.
        let principal = session.principal().ok_or(UploadError::NotAuthenticated)?;

        // 4. Upload row
        let upload = self
            .metadata_store
            .insert_upload(&NewUpload::direct(&principal.id, file, &stored.path))
            .await
            .map_err(|e| UploadError::Metadata(e.to_string()))?;

        info!(upload_id = %upload.id, file_url = %upload.file_url, "Upload recorded");
        metrics::counter!("uploads.created").increment(1);
        outcome.upload = Some(upload.clone());

        // 5. Inference
        publish(status, UploadStatus::Parsing);
        let parsed = match self.gateway.parse(upload.id, &upload.file_url).await {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return Err(UploadError::ParseFailed),
            Err(e) => {
                warn!(error = %e, upload_id = %upload.id, "Inference gateway call failed");
                return Err(UploadError::ParserUnavailable);
            }
        };

        // 6. Recipe row
        let recipe = self
            .metadata_store
            .insert_recipe(&NewRecipe::from_parsed(upload.id, &principal.id, &parsed))
            .await
            .map_err(|e| UploadError::Metadata(e.to_string()))?;

        info!(recipe_id = %recipe.id, upload_id = %upload.id, "Recipe recorded");
        outcome.recipe_id = Some(recipe.id);
        outcome.recipe = Some(RecipeView::from_parsed(&parsed));

        Ok(())
    }
}

fn publish(status: &mpsc::UnboundedSender<UploadStatus>, next: UploadStatus) {
    info!(status = %next, "Upload status");
    // Nobody listening is fine; the outcome still carries the terminal status
    let _ = status.send(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, StoreError};
    use crate::inference::MockInferenceGateway;
    use crate::metadata_store::{MemoryMetadataStore, MockMetadataStore};
    use crate::models::{ParsedRecipe, Principal};
    use crate::object_store::{MemoryObjectStore, MockObjectStore};
    use chrono::Utc;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn avocado_file() -> MediaFile {
        MediaFile::new("avocado.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF])
    }

    fn avocado_toast() -> ParsedRecipe {
        ParsedRecipe {
            title: "Avocado Toast".to_string(),
            ingredients: json!([
                {"name": "avocado", "amount": "1"},
                {"name": "bread", "amount": "2 slices"}
            ]),
            instructions: "Mash avocado, spread on toast, enjoy.".to_string(),
            description: None,
        }
    }

    fn u1() -> Session {
        Session::authenticated(Principal::new("U1", Some("u1@example.com".to_string())))
    }

    fn backend_error(message: &str) -> StoreError {
        StoreError::Backend(message.to_string())
    }

    /// Every status published so far
    fn drain(rx: &mut mpsc::UnboundedReceiver<UploadStatus>) -> Vec<UploadStatus> {
        let mut seen = Vec::new();
        while let Ok(status) = rx.try_recv() {
            seen.push(status);
        }
        seen
    }

    struct Harness {
        objects: Arc<MemoryObjectStore>,
        rows: Arc<MemoryMetadataStore>,
        orchestrator: UploadOrchestrator,
    }

    fn harness(gateway: MockInferenceGateway) -> Harness {
        let objects = Arc::new(MemoryObjectStore::new("http://files.local/uploads"));
        let rows = Arc::new(MemoryMetadataStore::new());
        let orchestrator =
            UploadOrchestrator::new(objects.clone(), rows.clone(), Arc::new(gateway));
        Harness {
            objects,
            rows,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_avocado_scenario() {
        let mut gateway = MockInferenceGateway::new();
        gateway
            .expect_parse()
            .withf(|_, file_url| file_url == "public/avocado.jpg")
            .times(1)
            .returning(|_, _| Ok(Some(avocado_toast())));
        let h = harness(gateway);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = h
            .orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;

        assert_eq!(outcome.status, UploadStatus::Generated);
        assert_eq!(outcome.status.to_string(), "Recipe generated!");
        assert_eq!(
            drain(&mut rx),
            vec![
                UploadStatus::Uploading,
                UploadStatus::Parsing,
                UploadStatus::Generated
            ]
        );
        assert_eq!(
            outcome.image_url.as_deref(),
            Some("http://files.local/uploads/public/avocado.jpg")
        );
        assert!(h.objects.get("public/avocado.jpg").is_some());

        let uploads = h.rows.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].user_id, "U1");
        assert_eq!(uploads[0].upload_type, "image");
        assert_eq!(uploads[0].file_url, "public/avocado.jpg");
        assert_eq!(uploads[0].source, "direct_upload");
        assert_eq!(uploads[0].description.as_deref(), Some("avocado.jpg"));
        assert!(!uploads[0].processed);

        let recipes = h.rows.recipes();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].upload_id, Some(uploads[0].id));
        assert_eq!(recipes[0].user_id, "U1");
        assert_eq!(recipes[0].title, "Avocado Toast");
        assert_eq!(recipes[0].ingredients, avocado_toast().ingredients);
        assert_eq!(
            recipes[0].instructions,
            "Mash avocado, spread on toast, enjoy."
        );
        assert_eq!(recipes[0].ai_summary, "");
        assert_eq!(outcome.recipe_id, Some(recipes[0].id));

        let view = outcome.recipe.unwrap();
        assert_eq!(view.ingredients, vec!["avocado (1)", "bread (2 slices)"]);
    }

    #[tokio::test]
    async fn test_anonymous_session_orphans_object() {
        let mut gateway = MockInferenceGateway::new();
        gateway.expect_parse().never();
        let h = harness(gateway);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = h
            .orchestrator
            .submit_upload(&Session::anonymous(), Some(avocado_file()), &tx)
            .await;

        assert_eq!(
            outcome.status.to_string(),
            "You must be logged in to upload files."
        );
        assert_eq!(
            drain(&mut rx),
            vec![
                UploadStatus::Uploading,
                UploadStatus::Failed(UploadError::NotAuthenticated)
            ]
        );
        assert!(h.rows.uploads().is_empty());
        assert!(h.rows.recipes().is_empty());
        assert_eq!(h.objects.len(), 1);
        assert!(outcome.image_url.is_some());
    }

    #[tokio::test]
    async fn test_storage_failure_writes_no_rows() {
        let mut objects = MockObjectStore::new();
        objects
            .expect_put()
            .returning(|_, _, _| Err(backend_error("The resource already exists")));
        objects.expect_public_url().never();
        let mut rows = MockMetadataStore::new();
        rows.expect_insert_upload().never();
        rows.expect_insert_recipe().never();
        let mut gateway = MockInferenceGateway::new();
        gateway.expect_parse().never();

        let orchestrator =
            UploadOrchestrator::new(Arc::new(objects), Arc::new(rows), Arc::new(gateway));
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;

        assert_eq!(
            outcome.status.to_string(),
            "Upload error: The resource already exists"
        );
        assert!(outcome.image_url.is_none());
        assert!(outcome.upload.is_none());
    }

    #[tokio::test]
    async fn test_metadata_failure_skips_inference() {
        let objects = Arc::new(MemoryObjectStore::new("http://files.local"));
        let mut rows = MockMetadataStore::new();
        rows.expect_insert_upload()
            .returning(|_| Err(backend_error("permission denied for table uploads")));
        rows.expect_insert_recipe().never();
        let mut gateway = MockInferenceGateway::new();
        gateway.expect_parse().never();

        let orchestrator =
            UploadOrchestrator::new(objects.clone(), Arc::new(rows), Arc::new(gateway));
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;

        assert_eq!(
            outcome.status.to_string(),
            "Metadata error: permission denied for table uploads"
        );
        // No compensation: the stored object stays
        assert_eq!(objects.len(), 1);
    }

    #[tokio::test]
    async fn test_recipe_insert_failure_after_parse() {
        let mut rows = MockMetadataStore::new();
        rows.expect_insert_upload().times(1).returning(|row| {
            Ok(Upload {
                id: Uuid::new_v4(),
                user_id: row.user_id.clone(),
                upload_type: row.upload_type.as_str().to_string(),
                file_url: row.file_url.clone(),
                source: row.source.clone(),
                processed: row.processed,
                description: row.description.clone(),
                created_at: Utc::now(),
            })
        });
        rows.expect_insert_recipe()
            .times(1)
            .returning(|_| Err(backend_error("null value in column \"title\"")));
        let mut gateway = MockInferenceGateway::new();
        gateway
            .expect_parse()
            .times(1)
            .returning(|_, _| Ok(Some(avocado_toast())));

        let orchestrator = UploadOrchestrator::new(
            Arc::new(MemoryObjectStore::new("http://files.local")),
            Arc::new(rows),
            Arc::new(gateway),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;

        assert_eq!(
            outcome.status.to_string(),
            "Metadata error: null value in column \"title\""
        );
        assert!(outcome.upload.is_some());
        assert!(outcome.recipe.is_none());
        assert!(outcome.recipe_id.is_none());
        assert_eq!(drain(&mut rx).last(), Some(&outcome.status));
    }

    #[tokio::test]
    async fn test_gateway_without_recipe() {
        let mut gateway = MockInferenceGateway::new();
        gateway.expect_parse().times(1).returning(|_, _| Ok(None));
        let h = harness(gateway);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = h
            .orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;

        assert_eq!(outcome.status.to_string(), "Parsing failed.");
        assert_eq!(h.rows.uploads().len(), 1);
        assert!(h.rows.recipes().is_empty());
        assert!(outcome.recipe.is_none());
        assert!(outcome.upload.is_some());
    }

    #[tokio::test]
    async fn test_gateway_transport_error() {
        let mut gateway = MockInferenceGateway::new();
        gateway
            .expect_parse()
            .times(1)
            .returning(|_, _| Err(GatewayError::Status(502)));
        let h = harness(gateway);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = h
            .orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;

        assert_eq!(outcome.status.to_string(), "Error calling backend AI parser.");
        assert_eq!(h.rows.uploads().len(), 1);
        assert!(h.rows.recipes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_noop() {
        let mut gateway = MockInferenceGateway::new();
        gateway.expect_parse().never();
        let h = harness(gateway);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = h.orchestrator.submit_upload(&u1(), None, &tx).await;

        assert_eq!(outcome.status, UploadStatus::Idle);
        assert!(outcome.status.message().is_none());
        assert!(drain(&mut rx).is_empty());
        assert!(h.objects.is_empty());
        assert!(h.rows.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_parsing_status_published_before_gateway_call() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let mut gateway = MockInferenceGateway::new();
        gateway.expect_parse().times(1).returning(move |_, _| {
            // Statuses already published when the gateway is called
            while let Ok(status) = rx.try_recv() {
                let _ = seen_tx.send(status);
            }
            Ok(Some(avocado_toast()))
        });
        let h = harness(gateway);

        let outcome = h
            .orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;

        assert!(outcome.status.is_terminal());
        assert_eq!(
            drain(&mut seen_rx),
            vec![UploadStatus::Uploading, UploadStatus::Parsing]
        );
    }

    #[tokio::test]
    async fn test_repeat_submission_creates_new_rows() {
        let mut gateway = MockInferenceGateway::new();
        gateway
            .expect_parse()
            .times(2)
            .returning(|_, _| Ok(Some(avocado_toast())));
        let h = harness(gateway);
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = h
            .orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;
        let second = h
            .orchestrator
            .submit_upload(&u1(), Some(avocado_file()), &tx)
            .await;

        assert_ne!(
            first.upload.as_ref().map(|u| u.id),
            second.upload.as_ref().map(|u| u.id)
        );
        assert_eq!(h.rows.uploads().len(), 2);
        assert_eq!(h.rows.recipes().len(), 2);
        assert_eq!(h.objects.len(), 1);
        assert_ok!(h.rows.list_recipes("U1").await);
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(UploadStatus::Uploading.to_string(), "Uploading file...");
        assert_eq!(
            UploadStatus::Parsing.to_string(),
            "File uploaded. Parsing with AI..."
        );
        assert_eq!(
            serde_json::to_value(UploadStatus::Failed(UploadError::ParseFailed)).unwrap(),
            json!("Parsing failed.")
        );
        assert!(!UploadStatus::Parsing.is_terminal());
    }
}
