//! Stored flow definitions: schema, parsing and pre-run validation.

pub mod parser;
pub mod schema;
pub mod validation;

pub use parser::{parse_dsl, DslFormat};
pub use schema::*;
pub use validation::{validate, validate_dsl, Diagnostic, DiagnosticLevel, ValidationReport};
