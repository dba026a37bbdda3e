//! SQL schema for the Feedline SQLite store.
//!
//! Executed once at connection startup. Older databases are migrated first,
//! gated on `PRAGMA user_version`.

/// Version the schema below brings a fresh database to.
pub const SCHEMA_VERSION: i64 = 2;

/// Brings a version 1 database up to version 2: leases gain a timestamp.
pub const MIGRATE_V1_TO_V2: &str = "
ALTER TABLE post_events ADD COLUMN leased_at INTEGER;
";

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id     INTEGER PRIMARY KEY,
    created_at  TEXT NOT NULL
);

-- Posts are immutable once inserted.
CREATE TABLE IF NOT EXISTS posts (
    post_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id   INTEGER NOT NULL,
    media_ref   TEXT NOT NULL,
    created_at  TEXT NOT NULL    -- ISO 8601 UTC; server-assigned
);

-- Naive layout: one row per logical edge.
CREATE TABLE IF NOT EXISTS follows (
    follower_id INTEGER NOT NULL REFERENCES users(user_id),
    followee_id INTEGER NOT NULL REFERENCES users(user_id),
    created_at  TEXT NOT NULL,
    PRIMARY KEY (follower_id, followee_id)
);

CREATE INDEX IF NOT EXISTS follows_followee_idx ON follows(followee_id);

-- Symmetric layout: two rows per logical edge, written together.
--   (A, 'FOLLOWS', B) and (B, 'IS_FOLLOWED_BY', A), same created_at.
CREATE TABLE IF NOT EXISTS follow_edges (
    subject_id  INTEGER NOT NULL REFERENCES users(user_id),
    direction   TEXT NOT NULL,   -- 'FOLLOWS' | 'IS_FOLLOWED_BY'
    object_id   INTEGER NOT NULL REFERENCES users(user_id),
    created_at  TEXT NOT NULL,
    PRIMARY KEY (subject_id, direction, object_id)
);

-- One bounded list per follower; higher seq = newer.
CREATE TABLE IF NOT EXISTS timeline_entries (
    user_id     INTEGER NOT NULL,
    seq         INTEGER NOT NULL,
    entry       TEXT NOT NULL,   -- post_id|media_ref|created_at
    PRIMARY KEY (user_id, seq)
);

-- Post-created event log. Rows leave the table when acknowledged.
CREATE TABLE IF NOT EXISTS post_events (
    event_offset INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id    INTEGER NOT NULL,
    payload      TEXT NOT NULL,  -- PostCreatedEvent as JSON
    state        TEXT NOT NULL DEFAULT 'pending',  -- 'pending' | 'leased' | 'dead'
    attempts     INTEGER NOT NULL DEFAULT 0,
    leased_at    INTEGER           -- unix millis of the current lease
);

CREATE INDEX IF NOT EXISTS post_events_author_idx ON post_events(author_id, state);

PRAGMA user_version = 2;
";
