//! Filters and find queries
//!
//! [`Filter`] builds equality and range predicates on field names.
//! [`FindQuery`] adds sort / skip / limit on top of a filter. Field names and
//! operators are checked when the filter is executed, not while it is built.

use crate::validation::{validate_field_name, validate_query, LOGICAL_OPERATORS};
use crate::Result;
use bson::{Bson, Document as BsonDocument};

/// Predicate over the records of a collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    doc: BsonDocument,
}

impl Filter {
    /// Filter matching every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching the record with the given `_id`
    pub fn by_id(id: impl Into<Bson>) -> Self {
        Self::new().eq("_id", id)
    }

    /// `field == value`
    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.doc.insert(field, value.into());
        self
    }

    /// `field != value`
    pub fn ne(self, field: &str, value: impl Into<Bson>) -> Self {
        self.with_operator(field, "$ne", value.into())
    }

    /// `field > value`
    pub fn gt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.with_operator(field, "$gt", value.into())
    }

    /// `field >= value`
    pub fn gte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.with_operator(field, "$gte", value.into())
    }

    /// `field < value`
    pub fn lt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.with_operator(field, "$lt", value.into())
    }

    /// `field <= value`
    pub fn lte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.with_operator(field, "$lte", value.into())
    }

    /// `field` equals one of `values`
    pub fn in_values<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.with_operator(field, "$in", Bson::Array(values))
    }

    // Bounds on the same field merge: gte(18).lt(65) -> {"$gte": 18, "$lt": 65}
    fn with_operator(mut self, field: &str, op: &str, value: Bson) -> Self {
        let merge = matches!(
            self.doc.get(field),
            Some(Bson::Document(ops)) if ops.keys().all(|k| k.starts_with('$'))
        );

        if merge {
            if let Some(Bson::Document(ops)) = self.doc.get_mut(field) {
                ops.insert(op, value);
            }
            return self;
        }

        let mut ops = BsonDocument::new();
        ops.insert(op, value);
        self.doc.insert(field, ops);
        self
    }

    /// True if the filter matches every record
    pub fn is_empty(&self) -> bool {
        self.doc.is_empty()
    }

    /// The raw filter document, unchecked
    pub fn as_document(&self) -> &BsonDocument {
        &self.doc
    }

    /// Check field names and operators, returning the document to send
    pub fn to_validated_document(&self) -> Result<BsonDocument> {
        for key in self.doc.keys() {
            if !LOGICAL_OPERATORS.contains(&key.as_str()) {
                validate_field_name(key)?;
            }
        }
        validate_query(&Bson::Document(self.doc.clone()))?;
        Ok(self.doc.clone())
    }
}

impl From<BsonDocument> for Filter {
    fn from(doc: BsonDocument) -> Self {
        Self { doc }
    }
}

/// Filter plus result shaping for `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    filter: Filter,
    sort: Option<BsonDocument>,
    skip: Option<u64>,
    limit: Option<i64>,
}

impl FindQuery {
    pub fn new(filter: impl Into<Filter>) -> Self {
        Self {
            filter: filter.into(),
            ..Self::default()
        }
    }

    /// Set the sort order
    pub fn sort(mut self, sort: BsonDocument) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the number of records to skip
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the maximum number of records to return
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn get_filter(&self) -> &Filter {
        &self.filter
    }

    pub fn get_sort(&self) -> Option<&BsonDocument> {
        self.sort.as_ref()
    }

    pub fn get_skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn get_limit(&self) -> Option<i64> {
        self.limit
    }
}

impl From<Filter> for FindQuery {
    fn from(filter: Filter) -> Self {
        Self::new(filter)
    }
}

impl From<BsonDocument> for FindQuery {
    fn from(doc: BsonDocument) -> Self {
        Self::new(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;
    use docstore_common::DocStoreError;

    #[test]
    fn test_filter_new_is_empty() {
        let filter = Filter::new();
        assert!(filter.is_empty());
        assert_eq!(filter.to_validated_document().unwrap(), doc! {});
    }

    #[test]
    fn test_filter_equality() {
        let filter = Filter::new().eq("name", "Ada").eq("active", true);
        assert_eq!(filter.as_document(), &doc! { "name": "Ada", "active": true });
    }

    #[test]
    fn test_filter_by_id() {
        let id = ObjectId::new();
        assert_eq!(Filter::by_id(id).as_document(), &doc! { "_id": id });
    }

    #[test]
    fn test_filter_range_merges_bounds() {
        let filter = Filter::new().gte("age", 18).lt("age", 65);
        assert_eq!(
            filter.as_document(),
            &doc! { "age": { "$gte": 18, "$lt": 65 } }
        );
    }

    #[test]
    fn test_filter_operator_replaces_equality() {
        let filter = Filter::new().eq("age", 30).gt("age", 18);
        assert_eq!(filter.as_document(), &doc! { "age": { "$gt": 18 } });
    }

    #[test]
    fn test_filter_in_values() {
        let filter = Filter::new().in_values("author", ["Scott", "Bill"]);
        assert_eq!(
            filter.as_document(),
            &doc! { "author": { "$in": ["Scott", "Bill"] } }
        );
    }

    #[test]
    fn test_filter_rejects_operator_field() {
        let filter = Filter::from(doc! { "$where": "sleep(1000)" });
        assert!(matches!(
            filter.to_validated_document(),
            Err(DocStoreError::Validation(_))
        ));
    }

    #[test]
    fn test_filter_allows_logical_operators() {
        let filter = Filter::from(doc! {
            "$or": [ { "author": "Scott" }, { "author": "Bill" } ]
        });
        assert!(filter.to_validated_document().is_ok());
    }

    #[test]
    fn test_find_query_chaining() {
        let query = FindQuery::new(Filter::new().eq("active", true))
            .sort(doc! { "name": 1 })
            .skip(5)
            .limit(10);

        assert_eq!(query.get_filter().as_document(), &doc! { "active": true });
        assert_eq!(query.get_sort(), Some(&doc! { "name": 1 }));
        assert_eq!(query.get_skip(), Some(5));
        assert_eq!(query.get_limit(), Some(10));
    }

    #[test]
    fn test_find_query_from_document() {
        let query: FindQuery = doc! { "name": "Ada" }.into();
        assert!(query.get_sort().is_none());
        assert!(query.get_skip().is_none());
        assert!(query.get_limit().is_none());
    }
}
