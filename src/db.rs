use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn connect(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Every natural-key column is UNIQUE; the store relies on that constraint,
/// not on its own lookups, when two writers race on the same name.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS films (
            id           INTEGER PRIMARY KEY,
            title        TEXT NOT NULL UNIQUE,
            budget       DECIMAL(12,6),
            box_office   DECIMAL(12,6),
            release_date DATE
        );

        CREATE TABLE IF NOT EXISTS persons_actor (
            id   INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS persons_director (
            id   INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS companies_distributor (
            id   INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS companies_production (
            id   INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        -- Junctions
        CREATE TABLE IF NOT EXISTS film_actors (
            film_id   INTEGER NOT NULL REFERENCES films(id),
            entity_id INTEGER NOT NULL REFERENCES persons_actor(id),
            PRIMARY KEY (film_id, entity_id)
        );
        CREATE INDEX IF NOT EXISTS idx_film_actors_entity ON film_actors(entity_id);

        CREATE TABLE IF NOT EXISTS film_directors (
            film_id   INTEGER NOT NULL REFERENCES films(id),
            entity_id INTEGER NOT NULL REFERENCES persons_director(id),
            PRIMARY KEY (film_id, entity_id)
        );
        CREATE INDEX IF NOT EXISTS idx_film_directors_entity ON film_directors(entity_id);

        CREATE TABLE IF NOT EXISTS film_distributors (
            film_id   INTEGER NOT NULL REFERENCES films(id),
            entity_id INTEGER NOT NULL REFERENCES companies_distributor(id),
            PRIMARY KEY (film_id, entity_id)
        );
        CREATE INDEX IF NOT EXISTS idx_film_distributors_entity ON film_distributors(entity_id);

        CREATE TABLE IF NOT EXISTS film_production_companies (
            film_id   INTEGER NOT NULL REFERENCES films(id),
            entity_id INTEGER NOT NULL REFERENCES companies_production(id),
            PRIMARY KEY (film_id, entity_id)
        );
        CREATE INDEX IF NOT EXISTS idx_film_production_entity ON film_production_companies(entity_id);
        ",
    )?;
    Ok(())
}

// ── Stats ──

const COUNTED_TABLES: [&str; 9] = [
    "films",
    "persons_actor",
    "persons_director",
    "companies_distributor",
    "companies_production",
    "film_actors",
    "film_directors",
    "film_distributors",
    "film_production_companies",
];

pub struct TableCount {
    pub table: &'static str,
    pub rows: usize,
}

pub fn table_counts(conn: &Connection) -> Result<Vec<TableCount>> {
    COUNTED_TABLES
        .into_iter()
        .map(|table| -> Result<TableCount> {
            let rows: usize =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            Ok(TableCount { table, rows })
        })
        .collect()
}

pub struct FilmsSummary {
    pub total: usize,
    pub with_release_date: usize,
    pub with_box_office: usize,
}

pub fn films_summary(conn: &Connection) -> Result<FilmsSummary> {
    let (total, with_release_date, with_box_office): (usize, usize, usize) = conn.query_row(
        "SELECT COUNT(*), COUNT(release_date), COUNT(box_office) FROM films",
        [],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    Ok(FilmsSummary {
        total,
        with_release_date,
        with_box_office,
    })
}

#[cfg(test)]
pub fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
    init_schema(&conn).unwrap();
    conn
}
