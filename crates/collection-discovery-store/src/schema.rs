use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "CREATE TABLE records (
            source_id   TEXT NOT NULL,
            kind        TEXT NOT NULL,
            name        TEXT NOT NULL,
            body        TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (source_id, kind, name)
        );

        CREATE TABLE reconciliations (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id     TEXT NOT NULL,
            applied_at    TEXT NOT NULL,
            record_count  INTEGER NOT NULL
        );

        CREATE INDEX idx_records_kind ON records(kind);
        CREATE INDEX idx_reconciliations_source ON reconciliations(source_id);",
    )])
}
