use thiserror::Error;

/// Why a record was rejected before it reached storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("unparsable date: {0:?}")]
    UnparsableDate(String),

    #[error("{record} record is missing required field `{field}`")]
    MissingRequiredField {
        record: &'static str,
        field: &'static str,
    },
}

/// Storage-layer failure for a single record. Uniqueness conflicts on a
/// natural key never surface here.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("{table} row for {value:?} not found after insert")]
    MissingAfterInsert { table: &'static str, value: String },
}
