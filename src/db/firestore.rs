// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing the token and activity stores.
//!
//! Layout:
//! - `tokens/{athlete_id}`: token record plus user preferences
//! - `activities/{athlete_id}_{activity_id}`: activity projection

use crate::db::{
    activity_doc_id, collections, ActivityStore, FieldMap, StoreError, TokenStore,
};
use crate::models::{ActivityRecord, TokenRecord};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::FirestoreWritePrecondition;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Backend(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client; every operation returns an error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client
            .as_ref()
            .ok_or_else(|| StoreError::Backend("Database not connected (offline mode)".to_string()))
    }
}

/// Translate Firestore failures into the store taxonomy.
fn store_error(key: &str, err: FirestoreError) -> StoreError {
    match err {
        FirestoreError::DataConflictError(_) => StoreError::AlreadyExists(key.to_string()),
        FirestoreError::DataNotFoundError(_) => StoreError::NotFound(key.to_string()),
        // Transaction contention on the document.
        FirestoreError::DatabaseError(e) if e.public.code == "Aborted" => {
            StoreError::Conflict(format!("{}: {}", key, e.details))
        }
        FirestoreError::DeserializeError(e) => {
            StoreError::InvalidRecord(format!("{}: {}", key, e))
        }
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl TokenStore for FirestoreDb {
    async fn get(&self, athlete_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        let record: Option<TokenRecord> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TOKENS)
            .obj()
            .one(athlete_id)
            .await
            .map_err(|e| store_error(athlete_id, e))?;

        record.map(TokenRecord::validate).transpose()
    }

    async fn put_partial(&self, athlete_id: &str, fields: &FieldMap) -> Result<(), StoreError> {
        // Update with a field mask creates the document when missing and
        // leaves unlisted fields untouched.
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields.keys())
            .in_col(collections::TOKENS)
            .document_id(athlete_id)
            .object(fields)
            .execute()
            .await
            .map_err(|e| store_error(athlete_id, e))?;
        Ok(())
    }

    async fn update_existing(&self, athlete_id: &str, fields: &FieldMap) -> Result<(), StoreError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields.keys())
            .in_col(collections::TOKENS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(athlete_id)
            .object(fields)
            .execute()
            .await
            .map_err(|e| store_error(athlete_id, e))?;
        Ok(())
    }

    async fn delete(&self, athlete_id: &str) -> Result<(), StoreError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::TOKENS)
            .document_id(athlete_id)
            .execute()
            .await
            .map_err(|e| store_error(athlete_id, e))?;
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for FirestoreDb {
    async fn get_by_owner(&self, athlete_id: &str) -> Result<Vec<ActivityRecord>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(|q| q.for_all([q.field("athlete_id").eq(athlete_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| store_error(athlete_id, e))
    }

    async fn get_one(
        &self,
        athlete_id: &str,
        activity_id: &str,
    ) -> Result<Option<ActivityRecord>, StoreError> {
        let doc_id = activity_doc_id(athlete_id, activity_id);
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(&doc_id)
            .await
            .map_err(|e| store_error(&doc_id, e))
    }

    async fn put_if_absent(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        let doc_id = activity_doc_id(&record.athlete_id, &record.activity_id);

        // Create fails with ALREADY_EXISTS when the document is present.
        let _: ActivityRecord = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::ACTIVITIES)
            .document_id(&doc_id)
            .object(record)
            .execute()
            .await
            .map_err(|e| store_error(&doc_id, e))?;
        Ok(())
    }

    async fn update_partial(
        &self,
        athlete_id: &str,
        activity_id: &str,
        fields: &FieldMap,
    ) -> Result<(), StoreError> {
        let doc_id = activity_doc_id(athlete_id, activity_id);

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields.keys())
            .in_col(collections::ACTIVITIES)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(&doc_id)
            .object(fields)
            .execute()
            .await
            .map_err(|e| store_error(&doc_id, e))?;
        Ok(())
    }

    async fn delete(&self, athlete_id: &str, activity_id: &str) -> Result<(), StoreError> {
        let doc_id = activity_doc_id(athlete_id, activity_id);
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::ACTIVITIES)
            .document_id(&doc_id)
            .execute()
            .await
            .map_err(|e| store_error(&doc_id, e))?;
        Ok(())
    }
}
