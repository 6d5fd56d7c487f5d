//! Schema detection for uploaded spreadsheets.
//!
//! Upstream exports never agree on header spelling, language or punctuation, so files are recognized by scoring
//! their header row against a declarative signature per source kind rather than by trusting file names. Keyword
//! lists live in [`signatures`] as data; adding a source kind is additive and touches no scoring code.

mod mapper;
mod signatures;

pub use mapper::{detect_schema, normalize_header, score_headers, FieldMapping};
pub use signatures::{signatures, FieldSpec, SchemaSignature, OPTIONAL_BONUS, OPTIONAL_BONUS_CAP};
