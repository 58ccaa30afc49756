use rusqlite::Connection;
use spectra_core::db::migrations::{apply_migrations_up_to, latest_version};
use spectra_core::db::{open_db, open_db_in_memory, open_db_read_only, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "refs",
        "source_snapshots",
        "species",
        "isotopologues",
        "states",
        "transitions",
        "spectroscopic_parameters",
    ] {
        assert_table_exists(&conn, table);
    }
    assert_column_exists(&conn, "spectroscopic_parameters", "text_value");
    assert_column_exists(&conn, "spectroscopic_parameters", "ref_ids_json");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spectra.sqlite");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "transitions");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn v1_database_upgrades_in_place_without_losing_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.sqlite");

    let mut conn = Connection::open(&path).unwrap();
    apply_migrations_up_to(&mut conn, 1).unwrap();
    assert_eq!(schema_version(&conn), 1);
    conn.execute_batch(
        "INSERT INTO species (species_id, formula, charge) VALUES ('MOL:CO:+0', 'CO', 0);
         INSERT INTO isotopologues (iso_id, species_id) VALUES ('iso_1', 'MOL:CO:+0');
         INSERT INTO spectroscopic_parameters (param_id, iso_id, model, name, value, unit)
         VALUES ('param_1', 'iso_1', 'webbook_diatomic_constants', 'we', 2169.81358, 'cm-1');",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    let (value, text_value): (f64, Option<String>) = conn
        .query_row(
            "SELECT value, text_value FROM spectroscopic_parameters WHERE param_id = 'param_1';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(value, 2169.81358);
    assert_eq!(text_value, None);
}

#[test]
fn read_only_open_rejects_outdated_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.sqlite");

    let mut conn = Connection::open(&path).unwrap();
    apply_migrations_up_to(&mut conn, 1).unwrap();
    drop(conn);

    let err = open_db_read_only(&path).unwrap_err();
    assert!(matches!(
        err,
        DbError::OutdatedSchemaVersion { db_version: 1, .. }
    ));

    drop(open_db(&path).unwrap());
    let conn = open_db_read_only(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
}

#[test]
fn foreign_keys_are_enforced_on_writable_connections() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO isotopologues (iso_id, species_id) VALUES ('iso_x', 'ASD:Xx:+0');",
        [],
    );
    assert!(result.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

fn assert_column_exists(conn: &Connection, table_name: &str, column: &str) {
    let exists: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM pragma_table_info('{table_name}') WHERE name = ?1;"),
            [column],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "column {table_name}.{column} does not exist");
}
