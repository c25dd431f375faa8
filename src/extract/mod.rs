//! Extract Module
//!
//! Entity ids, the rules that locate them and the extractor that applies
//! those rules to cached results.

mod extractor;
mod id;
mod rule;

// Re-export public types
pub use extractor::{extract_ids, ExtractSettings};
pub use id::{EntityId, IdKind, IdPart, DEFAULT_SUPPORTED_KINDS};
pub use rule::{IdFn, IdRule};
