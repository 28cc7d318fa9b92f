//! Record-level operations on a [`ConnectionHandle`]
//!
//! These translate application records into driver calls against a named
//! collection. Validation (names, record shape, registered validator) runs
//! before anything goes over the wire.

use crate::connection::ConnectionHandle;
use crate::query::{Filter, FindQuery};
use crate::validation::{validate_field_name, UPDATE_OPERATORS};
use crate::{Record, RecordId, Result};
use bson::doc;
use docstore_common::DocStoreError;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, instrument};

impl ConnectionHandle {
    /// Persist one new record and return its id.
    ///
    /// # Errors
    ///
    /// `DocStoreError::Validation` if the record is empty, has an operator as a
    /// key, or is rejected by the collection's validator.
    #[instrument(skip(self, record))]
    pub async fn insert(&self, collection: &str, record: Record) -> Result<RecordId> {
        let coll = self.collection(collection)?;
        self.check_record(collection, &record)?;

        let result = coll.insert_one(record).await?;
        debug!(id = %result.inserted_id, "Inserted record");
        Ok(result.inserted_id)
    }

    /// Persist several records, returning their ids in input order.
    ///
    /// All records are checked before any is written.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn insert_many(&self, collection: &str, records: Vec<Record>) -> Result<Vec<RecordId>> {
        let coll = self.collection(collection)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        for record in &records {
            self.check_record(collection, record)?;
        }

        let result = coll.insert_many(records).await?;
        let mut ids: Vec<(usize, RecordId)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        debug!(inserted = ids.len(), "Inserted records");
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    /// Lazily select the records matching `query`.
    ///
    /// Nothing is sent to the server until the returned [`Records`] is consumed.
    pub fn find(&self, collection: &str, query: impl Into<FindQuery>) -> Result<Records<'_>> {
        let query = query.into();
        // Fail fast on a closed handle or a bad name/filter
        self.collection(collection)?;
        query.get_filter().to_validated_document()?;

        Ok(Records {
            handle: self,
            collection: collection.to_string(),
            query,
        })
    }

    /// First record matching `filter`, if any
    #[instrument(skip(self, filter))]
    pub async fn find_one(&self, collection: &str, filter: impl Into<Filter>) -> Result<Option<Record>> {
        let coll = self.collection(collection)?;
        let filter = filter.into().to_validated_document()?;

        let record = coll.find_one(filter).await?;
        Ok(record)
    }

    /// Apply `patch` to every record matching `filter`; returns how many changed.
    ///
    /// A plain patch (`{"title": "new"}`) is applied with `$set`. A patch made
    /// only of update operators (`{"$inc": {"views": 1}}`) is sent as-is.
    #[instrument(skip(self, filter, patch))]
    pub async fn update(&self, collection: &str, filter: impl Into<Filter>, patch: Record) -> Result<u64> {
        let coll = self.collection(collection)?;
        let filter = filter.into().to_validated_document()?;
        let update = build_update(patch)?;

        if let Some(validator) = self.validator(collection) {
            if let Ok(set) = update.get_document("$set") {
                validator.validate_patch(set)?;
            }
        }

        let result = coll.update_many(filter, update).await?;
        debug!(
            matched = result.matched_count,
            modified = result.modified_count,
            "Updated records"
        );
        Ok(result.modified_count)
    }

    /// Write `record` as the whole content of the record with `id`, creating
    /// it if no such record exists. Returns true if a new record was created.
    #[instrument(skip(self, record))]
    pub(crate) async fn upsert_by_id(&self, collection: &str, id: RecordId, record: Record) -> Result<bool> {
        let coll = self.collection(collection)?;
        self.check_record(collection, &record)?;

        let result = coll
            .replace_one(doc! { "_id": id }, record)
            .upsert(true)
            .await?;
        let created = result.upserted_id.is_some();
        debug!(
            matched = result.matched_count,
            created = created,
            "Upserted record"
        );
        Ok(created)
    }

    /// Delete every record matching `filter`; returns how many were removed.
    #[instrument(skip(self, filter))]
    pub async fn delete(&self, collection: &str, filter: impl Into<Filter>) -> Result<u64> {
        let coll = self.collection(collection)?;
        let filter = filter.into().to_validated_document()?;

        let result = coll.delete_many(filter).await?;
        debug!(deleted = result.deleted_count, "Deleted records");
        Ok(result.deleted_count)
    }

    /// Count the records matching `filter`
    pub async fn count(&self, collection: &str, filter: impl Into<Filter>) -> Result<u64> {
        let coll = self.collection(collection)?;
        let filter = filter.into().to_validated_document()?;

        let count = coll.count_documents(filter).await?;
        Ok(count)
    }

    fn check_record(&self, collection: &str, record: &Record) -> Result<()> {
        if record.is_empty() {
            return Err(DocStoreError::Validation(
                "Record must contain at least one field".to_string(),
            ));
        }
        for key in record.keys() {
            validate_field_name(key)?;
        }
        if let Some(validator) = self.validator(collection) {
            validator.validate(record)?;
        }
        Ok(())
    }
}

/// Turn a patch into an update document
fn build_update(patch: Record) -> Result<Record> {
    if patch.is_empty() {
        return Err(DocStoreError::Validation("Patch cannot be empty".to_string()));
    }

    let operators = patch.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        for key in patch.keys() {
            validate_field_name(key)?;
        }
        return Ok(doc! { "$set": patch });
    }
    if operators != patch.len() {
        return Err(DocStoreError::Validation(
            "Patch cannot mix update operators and plain fields".to_string(),
        ));
    }

    for key in patch.keys() {
        if !UPDATE_OPERATORS.contains(&key.as_str()) {
            return Err(DocStoreError::Validation(format!(
                "'{}' is not a supported update operator",
                key
            )));
        }
    }
    Ok(patch)
}

/// Lazy, restartable result of [`ConnectionHandle::find`]
///
/// Each call to [`stream`](Records::stream) re-runs the query from the start.
/// The sequence borrows the handle, so the handle cannot be closed while it
/// is alive.
pub struct Records<'h> {
    handle: &'h ConnectionHandle,
    collection: String,
    query: FindQuery,
}

impl std::fmt::Debug for Records<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Records")
            .field("collection", &self.collection)
            .field("query", &self.query)
            .finish()
    }
}

impl<'h> Records<'h> {
    /// Collection the query runs against
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn query(&self) -> &FindQuery {
        &self.query
    }

    /// Run the query and stream matching records in server batches
    pub async fn stream(&self) -> Result<BoxStream<'h, Result<Record>>> {
        let coll = self.handle.collection(&self.collection)?;
        let filter = self.query.get_filter().to_validated_document()?;

        let mut action = coll.find(filter);
        if let Some(sort) = self.query.get_sort() {
            action = action.sort(sort.clone());
        }
        if let Some(skip) = self.query.get_skip() {
            action = action.skip(skip);
        }
        if let Some(limit) = self.query.get_limit() {
            action = action.limit(limit);
        }

        let cursor = action.await?;
        Ok(cursor.map_err(DocStoreError::from).boxed())
    }

    /// Run the query and collect every matching record
    pub async fn to_list(&self) -> Result<Vec<Record>> {
        self.stream().await?.try_collect().await
    }

    /// Run the query and return only the first record
    pub async fn first(&self) -> Result<Option<Record>> {
        let mut stream = self.limited(1).stream().await?;
        stream.try_next().await
    }

    /// Same query with its limit tightened to at most `limit`
    fn limited(&self, limit: i64) -> Records<'h> {
        // A limit of zero (or less) is no limit on the server
        let limit = self
            .query
            .get_limit()
            .filter(|own| *own > 0)
            .map_or(limit, |own| own.min(limit));
        Records {
            handle: self.handle,
            collection: self.collection.clone(),
            query: self.query.clone().limit(limit),
        }
    }

    /// Count matching records on the server (sort/skip/limit are ignored)
    pub async fn count(&self) -> Result<u64> {
        self.handle
            .count(&self.collection, self.query.get_filter().clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    #[test]
    fn test_build_update_wraps_plain_patch() {
        let update = build_update(doc! { "title": "A Better Post Title" }).unwrap();
        assert_eq!(update, doc! { "$set": { "title": "A Better Post Title" } });
    }

    #[test]
    fn test_build_update_passes_operators() {
        let patch = doc! { "$inc": { "views": 1 }, "$set": { "seen": true } };
        assert_eq!(build_update(patch.clone()).unwrap(), patch);
    }

    #[test]
    fn test_build_update_rejects_empty() {
        assert!(matches!(
            build_update(Record::new()),
            Err(DocStoreError::Validation(_))
        ));
    }

    #[test]
    fn test_build_update_rejects_mixed() {
        let patch = doc! { "$set": { "a": 1 }, "b": 2 };
        let err = build_update(patch).unwrap_err();
        assert!(err.to_string().contains("mix"));
    }

    #[test]
    fn test_build_update_rejects_query_operator() {
        let patch = doc! { "$where": "1" };
        assert!(build_update(patch).is_err());
    }

    #[test]
    fn test_build_update_keeps_null_values() {
        let update = build_update(doc! { "subtitle": Bson::Null }).unwrap();
        assert_eq!(update.get_document("$set").unwrap().get("subtitle"), Some(&Bson::Null));
    }

    #[test]
    fn test_first_limits_query_to_one() {
        let handle = ConnectionHandle::closed("docstore_test");
        let records = handle_records(&handle, FindQuery::new(Filter::new()));
        assert_eq!(records.limited(1).query().get_limit(), Some(1));

        let capped = handle_records(&handle, FindQuery::new(Filter::new()).limit(5));
        assert_eq!(capped.limited(1).query().get_limit(), Some(1));
        assert_eq!(capped.query().get_limit(), Some(5));
    }

    #[tokio::test]
    async fn test_upsert_on_closed_handle_fails() {
        let handle = ConnectionHandle::closed("docstore_test");
        let result = handle
            .upsert_by_id("posts", Bson::Int32(1), doc! { "title": "t" })
            .await;
        assert!(matches!(result, Err(DocStoreError::ClosedHandle)));
    }

    fn handle_records(handle: &ConnectionHandle, query: FindQuery) -> Records<'_> {
        Records {
            handle,
            collection: "posts".to_string(),
            query,
        }
    }
}
