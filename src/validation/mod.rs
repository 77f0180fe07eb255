//! Validation Engine
//!
//! Structural, semantic and outcome checks over a built document.

pub mod engine;
pub mod lookup;
pub mod rules;
pub mod semantic;
pub mod structural;

pub use engine::{validate_document, ValidationContext};
pub use lookup::{CodeTable, ReferenceLookup};
pub use rules::GreedyRule;
