//! SQL schema for the plainmed SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per (user, survey). The primary key is the uniqueness guarantee;
-- `version` is bumped on every write and compared by conditional updates.
CREATE TABLE IF NOT EXISTS survey_responses (
    user_id     TEXT    NOT NULL,
    survey_type TEXT    NOT NULL,   -- 'personal_info' | 'medical_history'
    response    TEXT,               -- JSON payload; NULL until the form is completed
    version     INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT    NOT NULL,   -- ISO 8601 UTC
    updated_at  TEXT    NOT NULL,
    PRIMARY KEY (user_id, survey_type)
);

-- Read-only reference data, loaded by import.
CREATE TABLE IF NOT EXISTS medical_topics (
    topic_id          INTEGER PRIMARY KEY,
    title             TEXT NOT NULL,
    language          TEXT NOT NULL,
    url               TEXT,
    meta_desc         TEXT,
    full_summary      TEXT,
    aliases           TEXT NOT NULL DEFAULT '[]',
    mesh_headings     TEXT NOT NULL DEFAULT '[]',
    topic_groups      TEXT NOT NULL DEFAULT '[]',
    primary_institute TEXT,             -- JSON object or NULL
    sites             TEXT NOT NULL DEFAULT '[]',
    date_created      TEXT
);

CREATE INDEX IF NOT EXISTS medical_topics_language_idx ON medical_topics(language);

PRAGMA user_version = 1;
";
