//! Database schema for the catalog store.
//!
//! Tables:
//! - catalog_entries: one row per imported track, keyed by the generated key
//! - canonical_tracks / track_aliases: the per-artist canonical catalog
//! - attribute_options: (attribute, label) -> integer code lookup
//! - classification_nodes / entry_classification: grouping tree and links
//! - unmatched_tracks: tracks that failed every matching tier
//! - store_settings: key/value settings (index-maintenance mode)

/// SQL schema for the catalog database (version 1).
pub const CATALOG_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entry_key TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    duration_secs REAL,

    -- Attribute option codes
    year_code INTEGER,
    venue_code INTEGER,
    taper_code INTEGER,

    collection_key TEXT NOT NULL,
    show_identifier TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    file_ref TEXT NOT NULL,

    -- Timestamps (Unix seconds)
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS canonical_tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artist_key TEXT NOT NULL,
    title TEXT NOT NULL,
    normalized TEXT NOT NULL,
    UNIQUE (artist_key, normalized)
);

CREATE TABLE IF NOT EXISTS track_aliases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    canonical_id INTEGER NOT NULL,
    alias TEXT NOT NULL,
    normalized TEXT NOT NULL,
    FOREIGN KEY (canonical_id) REFERENCES canonical_tracks(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS attribute_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    attribute TEXT NOT NULL,
    label TEXT NOT NULL,
    UNIQUE (attribute, label)
);

CREATE TABLE IF NOT EXISTS classification_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER,
    name TEXT NOT NULL,
    external_key TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    UNIQUE (parent_id, external_key),
    FOREIGN KEY (parent_id) REFERENCES classification_nodes(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS entry_classification (
    entry_id INTEGER NOT NULL,
    node_id INTEGER NOT NULL,
    position INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (entry_id, node_id),
    FOREIGN KEY (entry_id) REFERENCES catalog_entries(id) ON DELETE CASCADE,
    FOREIGN KEY (node_id) REFERENCES classification_nodes(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS unmatched_tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    artist_key TEXT NOT NULL,
    title TEXT NOT NULL,
    normalized TEXT NOT NULL,
    occurrences INTEGER NOT NULL DEFAULT 1,
    last_seen_at INTEGER NOT NULL,
    suggestion_title TEXT,
    suggestion_algorithm TEXT,
    suggestion_confidence REAL,
    status TEXT NOT NULL DEFAULT 'pending',
    UNIQUE (artist_key, normalized)
);

CREATE TABLE IF NOT EXISTS store_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Secondary indexes, maintained incrementally in normal operation and
/// dropped while the store runs in deferred index mode.
pub const SECONDARY_INDEXES: &[(&str, &str)] = &[
    (
        "idx_entries_collection",
        "CREATE INDEX IF NOT EXISTS idx_entries_collection ON catalog_entries(collection_key)",
    ),
    (
        "idx_entries_show",
        "CREATE INDEX IF NOT EXISTS idx_entries_show ON catalog_entries(show_identifier)",
    ),
    (
        "idx_entry_classification_node",
        "CREATE INDEX IF NOT EXISTS idx_entry_classification_node ON entry_classification(node_id)",
    ),
    (
        "idx_unmatched_status",
        "CREATE INDEX IF NOT EXISTS idx_unmatched_status ON unmatched_tracks(status)",
    ),
];

/// Current schema version, stored in PRAGMA user_version.
pub const CATALOG_SCHEMA_VERSION: i32 = 1;
