//! Document model for the authoritative record store.
//!
//! Every entity lives in a named [`Collection`] as a JSON object keyed by a
//! document id. Mutations are expressed as [`FieldUpdate`] lists so adapters
//! can apply them atomically; the application logic for those updates lives
//! here so every adapter shares one definition of `ArrayUnion`, `Increment`
//! and friends.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

/// Named collection inside the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Restaurants,
    Users,
    /// Uniqueness claims mapping an external auth uid to a username.
    UserUids,
    Lists,
    Reviews,
    Achievements,
}

impl Collection {
    /// Every collection, in a stable order.
    pub const ALL: [Collection; 6] = [
        Self::Restaurants,
        Self::Users,
        Self::UserUids,
        Self::Lists,
        Self::Reviews,
        Self::Achievements,
    ];

    /// Stable storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restaurants => "restaurants",
            Self::Users => "users",
            Self::UserUids => "user_uids",
            Self::Lists => "lists",
            Self::Reviews => "reviews",
            Self::Achievements => "achievements",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while converting between documents and typed entities.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document {id} is not a JSON object")]
    NotAnObject { id: String },
    #[error("document {id} could not be decoded: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("document {id} could not be encoded: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<DocumentError> for super::Error {
    fn from(err: DocumentError) -> Self {
        super::Error::internal(err.to_string())
    }
}

/// A JSON object stored under `id` within a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    fields: Map<String, Value>,
}

impl Document {
    /// Wrap an existing field map.
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a document from an arbitrary JSON value, which must be an object.
    pub fn from_value(id: impl Into<String>, value: Value) -> Result<Self, DocumentError> {
        let id = id.into();
        match value {
            Value::Object(fields) => Ok(Self { id, fields }),
            _ => Err(DocumentError::NotAnObject { id }),
        }
    }

    /// Serialise `value` into a document.
    pub fn encode<T: Serialize>(id: impl Into<String>, value: &T) -> Result<Self, DocumentError> {
        let id = id.into();
        let json = serde_json::to_value(value).map_err(|source| DocumentError::Encode {
            id: id.clone(),
            source,
        })?;
        Self::from_value(id, json)
    }

    /// Deserialise the fields into `T`, injecting the document id under
    /// `id_field` so entities can carry their own identity.
    pub fn decode_with_id<T: DeserializeOwned>(&self, id_field: &str) -> Result<T, DocumentError> {
        let mut fields = self.fields.clone();
        fields.insert(id_field.to_owned(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|source| DocumentError::Decode {
            id: self.id.clone(),
            source,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    pub fn into_parts(self) -> (String, Map<String, Value>) {
        (self.id, self.fields)
    }

    /// Resolve a (possibly nested) field.
    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        lookup(&self.fields, path)
    }
}

/// Dotted path addressing a nested field, e.g. `points.general`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Split `raw` on dots.
    pub fn new(raw: &str) -> Self {
        Self(raw.split('.').map(str::to_owned).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, path: &FieldPath) -> Option<&'a Value> {
    let (last, parents) = path.segments().split_last()?;
    let mut current = fields;
    for segment in parents {
        current = current.get(segment)?.as_object()?;
    }
    current.get(last)
}

/// A single atomic mutation applied to one document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Replace the value at the path, creating parent objects as needed.
    Set(FieldPath, Value),
    /// Delete the field if present.
    Remove(FieldPath),
    /// Add `delta` to a numeric field; a missing field counts as zero.
    Increment(FieldPath, i64),
    /// Append each value not already present, preserving insertion order.
    ArrayUnion(FieldPath, Vec<Value>),
    /// Drop every occurrence of the given values.
    ArrayRemove(FieldPath, Vec<Value>),
    /// Write the store's current time as an RFC 3339 string.
    ServerTimestamp(FieldPath),
}

impl FieldUpdate {
    pub fn path(&self) -> &FieldPath {
        match self {
            Self::Set(path, _)
            | Self::Remove(path)
            | Self::Increment(path, _)
            | Self::ArrayUnion(path, _)
            | Self::ArrayRemove(path, _)
            | Self::ServerTimestamp(path) => path,
        }
    }
}

/// Condition checked against the current document inside the same atomic
/// step as the update it guards.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The array at the path contains the value.
    ArrayContains(FieldPath, Value),
    /// The array at the path is missing or does not contain the value.
    ArrayExcludes(FieldPath, Value),
}

impl Precondition {
    /// Evaluate the precondition against a document's fields.
    pub fn holds(&self, fields: &Map<String, Value>) -> bool {
        match self {
            Self::ArrayContains(path, value) => array_contains(lookup(fields, path), value),
            Self::ArrayExcludes(path, value) => !array_contains(lookup(fields, path), value),
        }
    }
}

fn array_contains(field: Option<&Value>, value: &Value) -> bool {
    field
        .and_then(Value::as_array)
        .is_some_and(|items| items.iter().any(|item| values_equal(item, value)))
}

/// Comparison operator for [`FieldFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    ArrayContains,
}

/// `field op value` predicate evaluated by [`RecordStore::find`].
///
/// Ordering operators compare numbers numerically and strings lexically;
/// values of different JSON types never match.
///
/// [`RecordStore::find`]: crate::domain::ports::RecordStore::find
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub path: FieldPath,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    pub fn new(path: impl Into<FieldPath>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    /// Convenience constructor for equality filters.
    pub fn equals(path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::new(path, FilterOp::Eq, value)
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, document: &Document) -> bool {
        let Some(field) = document.get(&self.path) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => values_equal(field, &self.value),
            FilterOp::Lt => compare_values(field, &self.value) == Some(Ordering::Less),
            FilterOp::Le => matches!(
                compare_values(field, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Gt => compare_values(field, &self.value) == Some(Ordering::Greater),
            FilterOp::Ge => matches!(
                compare_values(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::ArrayContains => array_contains(Some(field), &self.value),
        }
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

/// One operation inside an all-or-nothing batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a new document; fails with `AlreadyExists` if the id is taken.
    Create(Collection, Document),
    /// Insert or replace a document.
    Set(Collection, Document),
    /// Apply updates to an existing document.
    Update {
        collection: Collection,
        id: String,
        updates: Vec<FieldUpdate>,
        precondition: Option<Precondition>,
    },
    /// Remove a document; missing documents are ignored.
    Delete(Collection, String),
}

/// Reasons an update list cannot be applied to a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("field path {path} is empty")]
    EmptyPath { path: String },
    #[error("field {path} is not an object")]
    NotAnObject { path: String },
    #[error("field {path} is not an integer")]
    NotAnInteger { path: String },
    #[error("field {path} is not an array")]
    NotAnArray { path: String },
    #[error("increment of {path} overflows")]
    Overflow { path: String },
}

/// Format used for server-side timestamps.
pub fn server_timestamp(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Apply `updates` in order. On error the map may be partially modified, so
/// adapters apply updates to a scratch copy and commit only on success.
pub fn apply_updates(
    fields: &mut Map<String, Value>,
    updates: &[FieldUpdate],
    now: DateTime<Utc>,
) -> Result<(), UpdateError> {
    for update in updates {
        apply_update(fields, update, now)?;
    }
    Ok(())
}

fn apply_update(
    fields: &mut Map<String, Value>,
    update: &FieldUpdate,
    now: DateTime<Utc>,
) -> Result<(), UpdateError> {
    let path = update.path();
    let (parent, key) = parent_slot(fields, path)?;
    match update {
        FieldUpdate::Set(_, value) => {
            parent.insert(key, value.clone());
        }
        FieldUpdate::ServerTimestamp(_) => {
            parent.insert(key, server_timestamp(now));
        }
        FieldUpdate::Remove(_) => {
            parent.remove(&key);
        }
        FieldUpdate::Increment(_, delta) => {
            let current = match parent.get(&key) {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| UpdateError::NotAnInteger {
                    path: path.to_string(),
                })?,
            };
            let next = current
                .checked_add(*delta)
                .ok_or_else(|| UpdateError::Overflow {
                    path: path.to_string(),
                })?;
            parent.insert(key, Value::Number(Number::from(next)));
        }
        FieldUpdate::ArrayUnion(_, values) => {
            let items = array_slot(parent, key, path)?;
            for value in values {
                if !items.iter().any(|item| values_equal(item, value)) {
                    items.push(value.clone());
                }
            }
        }
        FieldUpdate::ArrayRemove(_, values) => {
            if parent.contains_key(&key) {
                let items = array_slot(parent, key, path)?;
                items.retain(|item| !values.iter().any(|value| values_equal(item, value)));
            }
        }
    }
    Ok(())
}

fn array_slot<'a>(
    parent: &'a mut Map<String, Value>,
    key: String,
    path: &FieldPath,
) -> Result<&'a mut Vec<Value>, UpdateError> {
    let slot = parent.entry(key).or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut().ok_or_else(|| UpdateError::NotAnArray {
        path: path.to_string(),
    })
}

/// Walk to the object holding the last path segment, creating intermediate
/// objects on the way.
fn parent_slot<'a>(
    fields: &'a mut Map<String, Value>,
    path: &FieldPath,
) -> Result<(&'a mut Map<String, Value>, String), UpdateError> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Err(UpdateError::EmptyPath {
            path: path.to_string(),
        });
    };
    if path.segments().iter().any(String::is_empty) {
        return Err(UpdateError::EmptyPath {
            path: path.to_string(),
        });
    }
    let mut current = fields;
    for segment in parents {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = slot.as_object_mut().ok_or_else(|| UpdateError::NotAnObject {
            path: path.to_string(),
        })?;
    }
    Ok((current, last.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[rstest]
    fn set_creates_nested_objects(now: DateTime<Utc>) {
        let mut doc = fields(json!({}));
        apply_updates(
            &mut doc,
            &[FieldUpdate::Set("points.general".into(), json!(5))],
            now,
        )
        .expect("set applies");
        assert_eq!(Value::Object(doc), json!({"points": {"general": 5}}));
    }

    #[rstest]
    fn increment_treats_missing_as_zero(now: DateTime<Utc>) {
        let mut doc = fields(json!({"numLikes": 2}));
        apply_updates(
            &mut doc,
            &[
                FieldUpdate::Increment("numLikes".into(), -1),
                FieldUpdate::Increment("points.review".into(), 10),
            ],
            now,
        )
        .expect("increments apply");
        assert_eq!(
            Value::Object(doc),
            json!({"numLikes": 1, "points": {"review": 10}})
        );
    }

    #[rstest]
    fn increment_rejects_non_integers(now: DateTime<Utc>) {
        let mut doc = fields(json!({"name": "x"}));
        let err = apply_updates(&mut doc, &[FieldUpdate::Increment("name".into(), 1)], now)
            .expect_err("strings cannot be incremented");
        assert!(matches!(err, UpdateError::NotAnInteger { .. }));
    }

    #[rstest]
    fn array_union_is_idempotent_and_ordered(now: DateTime<Utc>) {
        let mut doc = fields(json!({"restaurants": ["p1"]}));
        let union = FieldUpdate::ArrayUnion("restaurants".into(), vec![json!("p2"), json!("p1")]);
        apply_updates(&mut doc, &[union.clone(), union], now).expect("union applies");
        assert_eq!(doc.get("restaurants"), Some(&json!(["p1", "p2"])));
    }

    #[rstest]
    fn array_remove_ignores_missing_fields(now: DateTime<Utc>) {
        let mut doc = fields(json!({"favoritedBy": ["alice", "bob"]}));
        apply_updates(
            &mut doc,
            &[
                FieldUpdate::ArrayRemove("favoritedBy".into(), vec![json!("alice")]),
                FieldUpdate::ArrayRemove("missing".into(), vec![json!("x")]),
            ],
            now,
        )
        .expect("remove applies");
        assert_eq!(Value::Object(doc), json!({"favoritedBy": ["bob"]}));
    }

    #[rstest]
    fn server_timestamp_uses_rfc3339(now: DateTime<Utc>) {
        let mut doc = fields(json!({}));
        apply_updates(
            &mut doc,
            &[FieldUpdate::ServerTimestamp("updatedAt".into())],
            now,
        )
        .expect("timestamp applies");
        assert_eq!(doc.get("updatedAt"), Some(&json!("2026-03-01T12:00:00.000Z")));
    }

    #[rstest]
    #[case(Precondition::ArrayContains("likes".into(), json!("a")), true)]
    #[case(Precondition::ArrayContains("likes".into(), json!("z")), false)]
    #[case(Precondition::ArrayExcludes("likes".into(), json!("z")), true)]
    #[case(Precondition::ArrayExcludes("missing".into(), json!("a")), true)]
    #[case(Precondition::ArrayExcludes("likes".into(), json!("a")), false)]
    fn preconditions_inspect_arrays(#[case] precondition: Precondition, #[case] expected: bool) {
        let doc = fields(json!({"likes": ["a", "b"]}));
        assert_eq!(precondition.holds(&doc), expected);
    }

    #[rstest]
    #[case(FieldFilter::equals("uid", "u1"), true)]
    #[case(FieldFilter::equals("rating", 4.0), true)]
    #[case(FieldFilter::new("rating", FilterOp::Gt, 3.5), true)]
    #[case(FieldFilter::new("rating", FilterOp::Lt, 4), false)]
    #[case(FieldFilter::new("rating", FilterOp::Le, 4), true)]
    #[case(FieldFilter::new("rating", FilterOp::Ge, "4"), false)]
    #[case(FieldFilter::new("types", FilterOp::ArrayContains, "thai"), true)]
    #[case(FieldFilter::equals("points.general", 10), true)]
    #[case(FieldFilter::equals("missing", 1), false)]
    fn filters_compare_by_type(#[case] filter: FieldFilter, #[case] expected: bool) {
        let doc = Document::from_value(
            "d1",
            json!({"uid": "u1", "rating": 4, "types": ["thai"], "points": {"general": 10}}),
        )
        .expect("object document");
        assert_eq!(filter.matches(&doc), expected);
    }

    #[rstest]
    fn decode_with_id_injects_identity() {
        #[derive(serde::Deserialize)]
        struct Named {
            id: String,
            name: String,
        }
        let doc = Document::from_value("x1", json!({"name": "Pho"})).expect("object");
        let decoded: Named = doc.decode_with_id("id").expect("decodes");
        assert_eq!(decoded.id, "x1");
        assert_eq!(decoded.name, "Pho");
    }

    #[rstest]
    fn from_value_rejects_non_objects() {
        let err = Document::from_value("x", json!([1, 2])).expect_err("arrays are rejected");
        assert!(matches!(err, DocumentError::NotAnObject { .. }));
    }
}
