//! Document trait for typed records
//!
//! Application types implement [`Document`] to get CRUD through a
//! [`ConnectionHandle`] with automatic BSON conversion and optional schema
//! checks on every write.

use crate::connection::ConnectionHandle;
use crate::query::Filter;
use crate::validation::{RecordValidator, Schema};
use crate::{Record, Result};
use async_trait::async_trait;
use bson::oid::ObjectId;
use docstore_common::DocStoreError;
use serde::{de::DeserializeOwned, Serialize};

/// Core trait for typed documents
///
/// Implementing types must be Serialize + DeserializeOwned to enable automatic
/// BSON conversion.
///
/// # Example
///
/// ```ignore
/// use serde::{Deserialize, Serialize};
/// use docstore_mongodb::Document;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     id: Option<ObjectId>,
///     email: String,
///     name: String,
/// }
///
/// impl Document for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
#[async_trait]
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Sized {
    /// Get the collection name for this document type
    fn collection_name() -> &'static str;

    /// Shape every write of this type must satisfy
    fn schema() -> Option<Schema> {
        None
    }

    /// Get the document's ObjectId (if it has one)
    fn get_id(&self) -> Option<ObjectId> {
        None
    }

    /// Set the document's ObjectId
    fn set_id(&mut self, _id: ObjectId) {
        // Override this if your document has an _id field
    }

    /// Convert document to a record
    fn to_record(&self) -> Result<Record> {
        bson::to_document(self).map_err(|e| DocStoreError::Serialization(e.to_string()))
    }

    /// Create document from a record
    fn from_record(record: Record) -> Result<Self> {
        bson::from_document(record).map_err(|e| DocStoreError::Deserialization(e.to_string()))
    }

    /// Convert to a record and check it against [`schema`](Self::schema)
    fn validated_record(&self) -> Result<Record> {
        let record = self.to_record()?;
        if let Some(schema) = Self::schema() {
            schema.validate(&record)?;
        }
        Ok(record)
    }

    /// Register [`schema`](Self::schema) on the handle so untyped writes to
    /// this collection are checked too
    fn register(handle: &mut ConnectionHandle) -> Result<()> {
        match Self::schema() {
            Some(schema) => handle.set_validator(Self::collection_name(), schema),
            None => Ok(()),
        }
    }

    /// Insert this document and store the assigned id on it
    async fn insert(&mut self, handle: &ConnectionHandle) -> Result<ObjectId> {
        let record = self.validated_record()?;
        let inserted = handle.insert(Self::collection_name(), record).await?;

        let id = inserted
            .as_object_id()
            .ok_or_else(|| DocStoreError::Database("Inserted id is not an ObjectId".to_string()))?;
        self.set_id(id);
        Ok(id)
    }

    /// Insert when the document has no id yet, otherwise write it under its
    /// id, recreating the record if it was deleted in the meantime
    async fn save(&mut self, handle: &ConnectionHandle) -> Result<ObjectId> {
        let Some(id) = self.get_id() else {
            return self.insert(handle).await;
        };

        let record = self.validated_record()?;
        handle
            .upsert_by_id(Self::collection_name(), id.into(), record)
            .await?;
        Ok(id)
    }

    /// Find all documents matching the filter
    async fn find(handle: &ConnectionHandle, filter: Filter) -> Result<Vec<Self>> {
        let records = handle.find(Self::collection_name(), filter)?.to_list().await?;
        records.into_iter().map(Self::from_record).collect()
    }

    /// Find a single document matching the filter
    async fn find_one(handle: &ConnectionHandle, filter: Filter) -> Result<Option<Self>> {
        match handle.find_one(Self::collection_name(), filter).await? {
            Some(record) => Ok(Some(Self::from_record(record)?)),
            None => Ok(None),
        }
    }

    /// Find a document by its ObjectId
    async fn find_by_id(handle: &ConnectionHandle, id: ObjectId) -> Result<Option<Self>> {
        Self::find_one(handle, Filter::by_id(id)).await
    }

    /// Delete this document; returns true if it existed
    ///
    /// Requires the document to have an _id set
    async fn delete(&self, handle: &ConnectionHandle) -> Result<bool> {
        let id = self
            .get_id()
            .ok_or_else(|| DocStoreError::Validation("Document has no _id".to_string()))?;

        let deleted = handle.delete(Self::collection_name(), Filter::by_id(id)).await?;
        Ok(deleted > 0)
    }

    /// Count documents matching the filter
    async fn count(handle: &ConnectionHandle, filter: Filter) -> Result<u64> {
        handle.count(Self::collection_name(), filter).await
    }
}
