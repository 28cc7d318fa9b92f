//! Document store facade over MongoDB
//!
//! This crate hides the driver behind a small, explicit API:
//!
//! - [`ConnectionHandle::connect`] opens and verifies a connection
//! - `insert` / `find` / `update` / `delete` work on named collections
//! - [`ConnectionHandle::close`] releases it; later calls fail with
//!   [`DocStoreError::ClosedHandle`]
//!
//! Records are plain BSON documents. Typed models implement [`Document`],
//! and collections can carry a [`Schema`] that every write is checked against.
//!
//! ```ignore
//! let mut handle = ConnectionHandle::connect(&FacadeConfig::from_env()?).await?;
//! let id = handle.insert("people", doc! { "name": "Ada" }).await?;
//! let people = handle.find("people", Filter::by_id(id))?.to_list().await?;
//! handle.close().await?;
//! ```

pub mod config;
pub mod connection;
pub mod document;
pub mod query;
pub mod store;
pub mod validation;

/// A persisted entity: field names mapped to scalar or nested values
pub type Record = bson::Document;

/// Identifier assigned to an inserted record (its `_id`)
pub type RecordId = bson::Bson;

pub use config::{Credentials, FacadeConfig, RetryConfig};
pub use connection::{with_connection, ConnectionHandle};
pub use docstore_common::{DocStoreError, Result};
pub use document::Document;
pub use query::{Filter, FindQuery};
pub use store::Records;
pub use validation::{
    validate_field, validate_field_name, validate_query, BsonTypeDescriptor, FieldSpec,
    NumericConstraints, RecordValidator, Schema, StringConstraints, ValidatedCollectionName,
};
