//! Blog post model used by the demonstration

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use docstore_mongodb::{BsonTypeDescriptor, Document, Schema, StringConstraints};
use serde::{Deserialize, Serialize};

/// A blog post stored in the `post` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub content: String,
    pub author: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub published: DateTime<Utc>,
}

impl Post {
    /// New unsaved post, published now
    pub fn new(title: impl Into<String>, content: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            author: author.into(),
            published: Utc::now(),
        }
    }
}

impl Document for Post {
    fn collection_name() -> &'static str {
        "post"
    }

    fn schema() -> Option<Schema> {
        let non_empty = |max: Option<usize>| BsonTypeDescriptor::String {
            constraints: StringConstraints {
                min_length: Some(1),
                max_length: max,
            },
        };

        Some(
            Schema::new()
                .required("title", non_empty(Some(200)))
                .required("content", non_empty(None))
                .required("author", non_empty(Some(50)))
                .required("published", BsonTypeDescriptor::DateTime),
        )
    }

    fn get_id(&self) -> Option<ObjectId> {
        self.id
    }

    fn set_id(&mut self, id: ObjectId) {
        self.id = Some(id);
    }
}
