//! The mapping engine: turns a raw JSON payload into a
//! [`CanonicalEvent`](crate::domain::CanonicalEvent) deterministically.

mod engine;
mod expression;
mod fingerprint;

pub use engine::{MappingEngine, MappingStore, MappingSynthesizer};
pub use expression::{ExpressionError, FieldExpr, Transform};
pub use fingerprint::{extended_fingerprint, structural_fingerprint};
