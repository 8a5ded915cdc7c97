//! agentflow data model.
//!
//! This crate holds the pure, synchronous building blocks shared by every
//! agent in the engine:
//!
//! - **[`record`]** -- [`OrderedRecord`], the id-keyed, insertion-ordered
//!   container used for inputs, outputs, steps, cases, and memory bindings.
//! - **[`schema`]** -- the recursive [`DataType`] system, conversion from
//!   plain schemas, JSON-Schema projection, and runtime value validation.
//! - **[`chunk`]** -- streaming delta chunks and the rule that folds a
//!   stream back into a single result object.
//! - **[`template`]** -- mustache-style `{{ path }}` rendering.
//! - **[`error`]** -- [`CoreError`] via [`thiserror`].
//!
//! Nothing here performs I/O; the execution engine lives in
//! `agentflow-agent`.

pub mod chunk;
pub mod error;
pub mod record;
pub mod schema;
pub mod template;

// Re-export the most commonly used types at the crate root for convenience.
pub use chunk::{OutputCollector, RunChunk, TEXT_KEY};
pub use error::{CoreError, Result};
pub use record::{Identified, OrderedRecord};
pub use schema::{
    DataKind, DataType, outputs_to_json_schema, schema_to_data_type, to_json_schema,
    validate_value,
};
pub use template::render;
