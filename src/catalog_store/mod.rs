//! Catalog storage: entries, canonical tracks, attribute options,
//! classification nodes and unmatched-track records.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{
    generate_entry_key, AttributeKind, BulkWriteOutcome, CatalogEntry, ClassificationNode,
    CleanupFilter, CleanupReport, CollectionSummary, IndexMode, UnmatchedStatus,
    UnmatchedTrackRecord,
};
pub use store::SqliteCatalogStore;
pub use trait_def::CatalogStore;
