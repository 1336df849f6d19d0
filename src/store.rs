use rusqlite::{
    ffi, params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior,
};
use tracing::debug;

use crate::error::StoreError;
use crate::record::{AssociationKind, AssociationRow, MovieRow, NormalizedRecord};

/// Lookup tables keyed by a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Films,
    Actors,
    Directors,
    Distributors,
    ProductionCompanies,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Films => "films",
            Table::Actors => "persons_actor",
            Table::Directors => "persons_director",
            Table::Distributors => "companies_distributor",
            Table::ProductionCompanies => "companies_production",
        }
    }

    pub fn key_column(self) -> &'static str {
        match self {
            Table::Films => "title",
            _ => "name",
        }
    }

    pub fn for_kind(kind: AssociationKind) -> Table {
        match kind {
            AssociationKind::Actor => Table::Actors,
            AssociationKind::Director => Table::Directors,
            AssociationKind::Distributor => Table::Distributors,
            AssociationKind::ProductionCompany => Table::ProductionCompanies,
        }
    }
}

fn junction(kind: AssociationKind) -> &'static str {
    match kind {
        AssociationKind::Actor => "film_actors",
        AssociationKind::Director => "film_directors",
        AssociationKind::Distributor => "film_distributors",
        AssociationKind::ProductionCompany => "film_production_companies",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: i64,
    /// False when the row existed, including when a concurrent writer won the insert.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOutcome {
    pub film_created: bool,
    pub entity_created: bool,
    pub linked: bool,
}

/// Upsert-and-link over a caller-owned connection. Each `store` call is one
/// transaction: the film, the entity and the junction row commit together or
/// not at all.
pub struct EntityStore<'c> {
    conn: &'c Connection,
}

impl<'c> EntityStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        EntityStore { conn }
    }

    /// The write lock is taken up front, so another writer's commit can
    /// never land between our lookup and our insert.
    pub fn store(&self, record: &NormalizedRecord) -> Result<StoreOutcome, StoreError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let outcome = write_record(&tx, record)?;
        tx.commit()?;
        Ok(outcome)
    }
}

fn write_record(conn: &Connection, record: &NormalizedRecord) -> Result<StoreOutcome, StoreError> {
    // The film row comes first for every record kind: associations can
    // arrive before the movie record for the same title.
    let film = resolve_or_create(conn, Table::Films, record.title())?;
    let mut outcome = StoreOutcome {
        film_created: film.created,
        ..StoreOutcome::default()
    };

    match record {
        NormalizedRecord::Movie(movie) => update_film(conn, film.id, movie)?,
        NormalizedRecord::Association(assoc) => {
            let entity = resolve_or_create(conn, Table::for_kind(assoc.kind), &assoc.name)?;
            outcome.entity_created = entity.created;
            outcome.linked = link(conn, assoc, film.id, entity.id)?;
        }
    }
    Ok(outcome)
}

fn resolve_or_create(conn: &Connection, table: Table, value: &str) -> Result<Resolved, StoreError> {
    if let Some(id) = lookup(conn, table, value)? {
        return Ok(Resolved { id, created: false });
    }
    let created = insert_key(conn, table, value)?;
    let id = lookup(conn, table, value)?.ok_or_else(|| StoreError::MissingAfterInsert {
        table: table.name(),
        value: value.to_string(),
    })?;
    Ok(Resolved { id, created })
}

fn lookup(conn: &Connection, table: Table, value: &str) -> rusqlite::Result<Option<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE {} = ?1",
        table.name(),
        table.key_column()
    );
    conn.query_row(&sql, params![value], |row| row.get(0))
        .optional()
}

/// Insert a bare natural-key row. Returns false if the key already exists.
fn insert_key(conn: &Connection, table: Table, value: &str) -> rusqlite::Result<bool> {
    let sql = format!(
        "INSERT INTO {} ({}) VALUES (?1)",
        table.name(),
        table.key_column()
    );
    match conn.execute(&sql, params![value]) {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => {
            debug!(table = table.name(), value, "natural key already present");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Movie-level fields are overwritten as a whole, never merged.
fn update_film(conn: &Connection, film_id: i64, movie: &MovieRow) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE films SET budget = ?1, box_office = ?2, release_date = ?3 WHERE id = ?4",
        params![
            movie.budget.map(|a| a.value),
            movie.box_office.map(|a| a.value),
            movie.release_date,
            film_id,
        ],
    )?;
    Ok(())
}

fn link(
    conn: &Connection,
    assoc: &AssociationRow,
    film_id: i64,
    entity_id: i64,
) -> rusqlite::Result<bool> {
    let sql = format!(
        "INSERT INTO {} (film_id, entity_id) VALUES (?1, ?2)
         ON CONFLICT (film_id, entity_id) DO NOTHING",
        junction(assoc.kind)
    );
    let inserted = conn.execute(&sql, params![film_id, entity_id])?;
    Ok(inserted > 0)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::*;
    use crate::db;
    use crate::normalize::money::normalize_money;

    fn assoc(title: &str, kind: AssociationKind, name: &str) -> NormalizedRecord {
        NormalizedRecord::Association(AssociationRow {
            title: title.to_string(),
            kind,
            name: name.to_string(),
        })
    }

    fn dune() -> NormalizedRecord {
        NormalizedRecord::Movie(MovieRow {
            title: "Dune".to_string(),
            budget: normalize_money("$165 million"),
            box_office: normalize_money("$407.6 million"),
            release_date: NaiveDate::from_ymd_opt(2021, 9, 15).unwrap(),
        })
    }

    type FilmRow = (String, Option<f64>, Option<f64>, Option<NaiveDate>);

    fn film(conn: &Connection, title: &str) -> FilmRow {
        conn.query_row(
            "SELECT title, budget, box_office, release_date FROM films WHERE title = ?1",
            [title],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap()
    }

    fn count(conn: &Connection, table: &str) -> usize {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn dune_scenario() {
        let conn = db::test_conn();
        let store = EntityStore::new(&conn);

        let first = store
            .store(&assoc("Dune", AssociationKind::Actor, "Timothée Chalamet"))
            .unwrap();
        assert_eq!(
            first,
            StoreOutcome {
                film_created: true,
                entity_created: true,
                linked: true
            }
        );
        let second = store.store(&dune()).unwrap();
        assert!(!second.film_created);

        assert_eq!(count(&conn, "films"), 1);
        assert_eq!(count(&conn, "persons_actor"), 1);
        assert_eq!(count(&conn, "film_actors"), 1);
        let (title, budget, box_office, date) = film(&conn, "Dune");
        assert_eq!(title, "Dune");
        assert_eq!(budget, Some(165.0));
        assert_eq!(box_office, Some(407.6));
        assert_eq!(date.unwrap().to_string(), "2021-09-15");
    }

    #[test]
    fn repeated_association_links_once() {
        let conn = db::test_conn();
        let store = EntityStore::new(&conn);
        let rec = assoc("Heat", AssociationKind::Director, "Michael Mann");

        assert!(store.store(&rec).unwrap().linked);
        let again = store.store(&rec).unwrap();
        assert_eq!(again, StoreOutcome::default());

        assert_eq!(count(&conn, "films"), 1);
        assert_eq!(count(&conn, "persons_director"), 1);
        assert_eq!(count(&conn, "film_directors"), 1);
    }

    #[test]
    fn arrival_order_does_not_change_film_row() {
        let before = db::test_conn();
        {
            let store = EntityStore::new(&before);
            store.store(&assoc("Dune", AssociationKind::Distributor, "Warner Bros. Pictures")).unwrap();
            store.store(&dune()).unwrap();
        }
        let after = db::test_conn();
        {
            let store = EntityStore::new(&after);
            store.store(&dune()).unwrap();
            store.store(&assoc("Dune", AssociationKind::Distributor, "Warner Bros. Pictures")).unwrap();
        }
        assert_eq!(film(&before, "Dune"), film(&after, "Dune"));
        assert_eq!(count(&before, "film_distributors"), count(&after, "film_distributors"));
    }

    #[test]
    fn association_only_film_has_null_details() {
        let conn = db::test_conn();
        let store = EntityStore::new(&conn);
        store
            .store(&assoc("Arrival", AssociationKind::ProductionCompany, "FilmNation Entertainment"))
            .unwrap();
        assert_eq!(film(&conn, "Arrival"), ("Arrival".to_string(), None, None, None));
    }

    #[test]
    fn movie_record_overwrites_details() {
        let conn = db::test_conn();
        let store = EntityStore::new(&conn);
        store.store(&dune()).unwrap();
        store
            .store(&NormalizedRecord::Movie(MovieRow {
                title: "Dune".to_string(),
                budget: None,
                box_office: normalize_money("$434.8 million"),
                release_date: NaiveDate::from_ymd_opt(2021, 10, 22).unwrap(),
            }))
            .unwrap();
        let (_, budget, box_office, date) = film(&conn, "Dune");
        assert_eq!(budget, None);
        assert_eq!(box_office, Some(434.8));
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 10, 22));
    }

    #[test]
    fn same_name_in_different_tables_is_distinct() {
        let conn = db::test_conn();
        let store = EntityStore::new(&conn);
        store.store(&assoc("Argo", AssociationKind::Actor, "Ben Affleck")).unwrap();
        store.store(&assoc("Argo", AssociationKind::Director, "Ben Affleck")).unwrap();
        assert_eq!(count(&conn, "persons_actor"), 1);
        assert_eq!(count(&conn, "persons_director"), 1);
        assert_eq!(count(&conn, "film_actors"), 1);
        assert_eq!(count(&conn, "film_directors"), 1);
    }

    #[test]
    fn titles_are_case_sensitive() {
        let conn = db::test_conn();
        let a = resolve_or_create(&conn, Table::Films, "Up").unwrap();
        let b = resolve_or_create(&conn, Table::Films, "UP").unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(
            resolve_or_create(&conn, Table::Films, "Up").unwrap(),
            Resolved { id: a.id, created: false }
        );
    }

    #[test]
    fn unique_conflict_counts_as_existing() {
        let conn = db::test_conn();
        assert!(insert_key(&conn, Table::Actors, "Zendaya").unwrap());
        assert!(!insert_key(&conn, Table::Actors, "Zendaya").unwrap());
        assert_eq!(count(&conn, "persons_actor"), 1);
    }

    #[test]
    fn concurrent_writer_wins_the_insert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("films.sqlite");
        let ours = db::connect(&path, Duration::from_secs(5)).unwrap();
        db::init_schema(&ours).unwrap();
        let theirs = db::connect(&path, Duration::from_secs(5)).unwrap();

        assert!(insert_key(&theirs, Table::Films, "Tenet").unwrap());
        // Our lookup missed it earlier; the insert now conflicts and the
        // re-select finds their row.
        assert!(!insert_key(&ours, Table::Films, "Tenet").unwrap());
        let resolved = resolve_or_create(&ours, Table::Films, "Tenet").unwrap();
        assert!(!resolved.created);
        assert_eq!(count(&ours, "films"), 1);
    }

    #[test]
    fn store_waits_out_a_writer_creating_the_same_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("films.sqlite");
        let theirs = db::connect(&path, Duration::from_secs(5)).unwrap();
        db::init_schema(&theirs).unwrap();
        let ours = db::connect(&path, Duration::from_secs(5)).unwrap();

        let tx = Transaction::new_unchecked(&theirs, TransactionBehavior::Immediate).unwrap();
        assert!(insert_key(&tx, Table::Films, "Tenet").unwrap());

        let outcome = std::thread::scope(|s| {
            let handle = s.spawn(move || {
                EntityStore::new(&ours)
                    .store(&assoc("Tenet", AssociationKind::Actor, "John David Washington"))
                    .unwrap()
            });
            std::thread::sleep(Duration::from_millis(200));
            tx.commit().unwrap();
            handle.join().unwrap()
        });

        assert!(!outcome.film_created);
        assert!(outcome.linked);
        assert_eq!(count(&theirs, "films"), 1);
        assert_eq!(count(&theirs, "film_actors"), 1);
    }

    #[test]
    fn racing_stores_share_film_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("films.sqlite");
        let conn = db::connect(&path, Duration::from_secs(5)).unwrap();
        db::init_schema(&conn).unwrap();
        let barrier = std::sync::Barrier::new(2);

        let created: usize = std::thread::scope(|s| {
            let handles: Vec<_> = ["Actor", "Director"]
                .into_iter()
                .map(|who| {
                    let (path, barrier) = (&path, &barrier);
                    s.spawn(move || {
                        let conn = db::connect(path, Duration::from_secs(5)).unwrap();
                        let store = EntityStore::new(&conn);
                        barrier.wait();
                        let mut created = 0;
                        for i in 0..50 {
                            let kind = if who == "Actor" {
                                AssociationKind::Actor
                            } else {
                                AssociationKind::Director
                            };
                            let rec = assoc(&format!("Film {}", i), kind, &format!("{} {}", who, i));
                            created += usize::from(store.store(&rec).unwrap().film_created);
                        }
                        created
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(created, 50);
        assert_eq!(count(&conn, "films"), 50);
        assert_eq!(count(&conn, "film_actors"), 50);
        assert_eq!(count(&conn, "film_directors"), 50);
    }

    #[test]
    fn storage_failure_rolls_back_the_record() {
        let conn = db::test_conn();
        conn.execute_batch("DROP TABLE film_actors;").unwrap();
        let store = EntityStore::new(&conn);

        let err = store
            .store(&assoc("Dune", AssociationKind::Actor, "Zendaya"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(count(&conn, "films"), 0);
        assert_eq!(count(&conn, "persons_actor"), 0);

        // The connection is still usable for the next record.
        store.store(&dune()).unwrap();
        assert_eq!(count(&conn, "films"), 1);
    }
}
