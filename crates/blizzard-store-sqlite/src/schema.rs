//! SQL schema for the Blizzard SQLite store.
//!
//! Executed once when a pool opens; `PRAGMA user_version` records the layout
//! version.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organizations (
    ein         TEXT PRIMARY KEY,
    name        TEXT,
    locality    TEXT,
    region      TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Written once per filing_id; never updated.
CREATE TABLE IF NOT EXISTS filings (
    filing_id        TEXT PRIMARY KEY,
    ein              TEXT NOT NULL REFERENCES organizations(ein),
    form_type        TEXT NOT NULL,   -- '990' | '990EZ' | '990PF' | '990T'
    tax_period       TEXT NOT NULL,   -- YYYY-MM-DD
    tax_year         INTEGER NOT NULL,
    submission_date  TEXT,            -- verbatim from the document
    form_version     TEXT,
    object_id        TEXT,
    source_sha256    TEXT,
    loaded_at        TEXT NOT NULL    -- RFC 3339 UTC
);

CREATE TABLE IF NOT EXISTS field_definitions (
    field_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    locator      TEXT NOT NULL,
    form_type    TEXT NOT NULL,
    label        TEXT NOT NULL,
    description  TEXT NOT NULL,
    value_type   TEXT NOT NULL
                 CHECK (value_type IN ('text', 'numeric', 'boolean', 'date')),
    created_at   TEXT NOT NULL,
    UNIQUE (locator, form_type)
);

-- text_value is always the verbatim document string; at most one typed
-- column is set, per the field's declared type.
CREATE TABLE IF NOT EXISTS filing_values (
    filing_id      TEXT NOT NULL REFERENCES filings(filing_id),
    field_id       INTEGER NOT NULL REFERENCES field_definitions(field_id),
    text_value     TEXT NOT NULL,
    numeric_value  REAL,
    boolean_value  INTEGER,
    date_value     TEXT,
    PRIMARY KEY (filing_id, field_id)
);

CREATE TABLE IF NOT EXISTS repeating_groups (
    group_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id        TEXT NOT NULL REFERENCES filings(filing_id),
    parent_group_id  INTEGER REFERENCES repeating_groups(group_id),
    name             TEXT NOT NULL,
    locator          TEXT NOT NULL,
    ordinal          INTEGER NOT NULL,   -- document order within the filing
    UNIQUE (filing_id, ordinal)
);

-- A parent group must belong to the same filing as its child.
CREATE TRIGGER IF NOT EXISTS repeating_groups_parent_same_filing
BEFORE INSERT ON repeating_groups
WHEN NEW.parent_group_id IS NOT NULL
 AND (SELECT filing_id FROM repeating_groups
      WHERE group_id = NEW.parent_group_id) IS NOT NEW.filing_id
BEGIN
    SELECT RAISE(ABORT, 'parent group belongs to a different filing');
END;

CREATE TABLE IF NOT EXISTS repeating_group_values (
    group_id       INTEGER NOT NULL REFERENCES repeating_groups(group_id),
    field_id       INTEGER NOT NULL REFERENCES field_definitions(field_id),
    text_value     TEXT NOT NULL,
    numeric_value  REAL,
    boolean_value  INTEGER,
    date_value     TEXT,
    PRIMARY KEY (group_id, field_id)
);

CREATE INDEX IF NOT EXISTS filings_ein_idx          ON filings(ein);
CREATE INDEX IF NOT EXISTS filing_values_field_idx  ON filing_values(field_id);
CREATE INDEX IF NOT EXISTS groups_filing_idx        ON repeating_groups(filing_id);
CREATE INDEX IF NOT EXISTS groups_parent_idx        ON repeating_groups(parent_group_id);
CREATE INDEX IF NOT EXISTS group_values_field_idx   ON repeating_group_values(field_id);

PRAGMA user_version = 1;
";

/// Settings applied to every pooled connection.
pub const CONNECTION_PRAGMAS: &str = "
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";
