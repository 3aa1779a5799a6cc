//! Diesel row types for the `documents` table.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::{Map, Value};

use crate::domain::ports::RecordStoreError;
use crate::domain::record::{Collection, Document};

use super::schema::documents;

#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = documents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(super) struct DocumentRow {
    pub id: String,
    pub data: Value,
}

impl DocumentRow {
    pub fn into_document(self) -> Result<Document, RecordStoreError> {
        let id = self.id;
        Document::from_value(id, self.data).map_err(|err| RecordStoreError::query(err.to_string()))
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub(super) struct NewDocumentRow {
    pub collection: &'static str,
    pub id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewDocumentRow {
    pub fn new(collection: Collection, id: String, fields: Map<String, Value>, now: DateTime<Utc>) -> Self {
        Self {
            collection: collection.as_str(),
            id,
            data: Value::Object(fields),
            created_at: now,
            updated_at: now,
        }
    }
}
