//! Diesel table definitions. Keep in step with `backend/migrations`.

diesel::table! {
    /// Every record of every collection, keyed by `(collection, id)`.
    documents (collection, id) {
        collection -> Text,
        id -> Text,
        /// Field map of the record as a JSON object.
        data -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
