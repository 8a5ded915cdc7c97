//! Core error types.
//!
//! Every data-model operation in this crate surfaces failures through
//! [`CoreError`].  Variants carry the offending id or field so callers can
//! report configuration mistakes without parsing strings.

/// Unified error type for the agentflow data model.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // -- OrderedRecord errors ------------------------------------------------
    /// An item with the same id is already present in the record.
    #[error("duplicate id in ordered record: {id}")]
    DuplicateId { id: String },

    // -- Schema errors -------------------------------------------------------
    /// A schema node carried a `type` discriminator that is not one of
    /// `string`, `number`, `boolean`, `object`, `array`.
    #[error("unknown data type `{type_name}` for field `{field}`")]
    UnknownDataType { field: String, type_name: String },

    /// The schema is structurally malformed (e.g. not an object).
    #[error("invalid schema: {reason}")]
    InvalidSchema { reason: String },

    /// A runtime value did not satisfy its declared data type.
    #[error("validation failed for `{field}`: {reason}")]
    ValidationFailed { field: String, reason: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
