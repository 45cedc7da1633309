use idlink_core::db::migrations::latest_version;
use idlink_core::db::open_db_in_memory;
use idlink_core::{ContactRepository, Precedence, RepoError, SqliteContactRepository};
use rusqlite::Connection;

#[test]
fn create_primary_assigns_monotonic_ids_and_store_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let first = repo
        .create_primary(Some("a@example.com"), Some("+1234567890"))
        .unwrap();
    let second = repo.create_primary(Some("b@example.com"), None).unwrap();

    assert!(first.id > 0);
    assert!(second.id > first.id);
    assert_eq!(first.precedence, Precedence::Primary);
    assert_eq!(first.linked_primary_id, None);
    assert!(first.created_at > 0);
    assert!(first.updated_at >= first.created_at);
    assert_eq!(first.deleted_at, None);
}

#[test]
fn create_primary_rejects_empty_pair() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let err = repo.create_primary(None, None).unwrap_err();
    assert!(matches!(err, RepoError::EmptyContactPair));
}

#[test]
fn create_secondary_links_to_primary_and_lists_in_creation_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let primary = repo.create_primary(Some("a@example.com"), None).unwrap();
    let older = repo
        .create_secondary(primary.id, Some("a@example.com"), Some("+1234567890"))
        .unwrap();
    let newer = repo
        .create_secondary(primary.id, Some("a2@example.com"), None)
        .unwrap();

    assert_eq!(older.precedence, Precedence::Secondary);
    assert_eq!(older.linked_primary_id, Some(primary.id));

    let listed = repo.list_secondaries(primary.id).unwrap();
    let ids: Vec<_> = listed.iter().map(|contact| contact.id).collect();
    assert_eq!(ids, vec![older.id, newer.id]);
}

#[test]
fn create_secondary_rejects_missing_or_secondary_target() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let missing = repo
        .create_secondary(999, Some("a@example.com"), None)
        .unwrap_err();
    assert!(matches!(missing, RepoError::NotFound(999)));

    let primary = repo.create_primary(Some("a@example.com"), None).unwrap();
    let secondary = repo
        .create_secondary(primary.id, Some("b@example.com"), None)
        .unwrap();

    let chained = repo
        .create_secondary(secondary.id, Some("c@example.com"), None)
        .unwrap_err();
    assert!(matches!(chained, RepoError::LinkTargetNotPrimary(id) if id == secondary.id));
}

#[test]
fn find_by_email_or_phone_matches_either_field() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let by_email = repo
        .create_primary(Some("a@example.com"), Some("+1111111111"))
        .unwrap();
    let by_phone = repo
        .create_primary(Some("b@example.com"), Some("+2222222222"))
        .unwrap();
    repo.create_primary(Some("c@example.com"), Some("+3333333333"))
        .unwrap();

    let found = repo
        .find_by_email_or_phone(Some("a@example.com"), Some("+2222222222"))
        .unwrap();
    let ids: Vec<_> = found.iter().map(|contact| contact.id).collect();
    assert_eq!(ids, vec![by_email.id, by_phone.id]);
}

#[test]
fn find_by_email_or_phone_with_no_input_returns_empty_set() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    repo.create_primary(Some("a@example.com"), None).unwrap();

    let found = repo.find_by_email_or_phone(None, None).unwrap();
    assert!(found.is_empty());
}

#[test]
fn soft_deleted_rows_are_excluded_from_queries() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let primary = repo
        .create_primary(Some("a@example.com"), Some("+1234567890"))
        .unwrap();
    let secondary = repo
        .create_secondary(primary.id, Some("b@example.com"), None)
        .unwrap();

    repo.soft_delete_contact(secondary.id).unwrap();
    repo.soft_delete_contact(secondary.id).unwrap();

    assert!(repo.get_contact(secondary.id, false).unwrap().is_none());
    let tombstoned = repo.get_contact(secondary.id, true).unwrap().unwrap();
    assert!(tombstoned.deleted_at.is_some());

    assert!(repo.list_secondaries(primary.id).unwrap().is_empty());
    let found = repo
        .find_by_email_or_phone(Some("b@example.com"), None)
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn demote_primary_flattens_shape() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let winner = repo.create_primary(Some("a@example.com"), None).unwrap();
    let loser = repo.create_primary(Some("b@example.com"), None).unwrap();

    repo.demote_primary(loser.id, winner.id).unwrap();

    let demoted = repo.get_contact(loser.id, false).unwrap().unwrap();
    assert_eq!(demoted.precedence, Precedence::Secondary);
    assert_eq!(demoted.linked_primary_id, Some(winner.id));
    assert!(demoted.updated_at >= demoted.created_at);

    // A second demotion finds no active primary row to change.
    let err = repo.demote_primary(loser.id, winner.id).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == loser.id));
}

#[test]
fn demote_primary_rejects_self_link() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let primary = repo.create_primary(Some("a@example.com"), None).unwrap();

    let err = repo.demote_primary(primary.id, primary.id).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn repoint_secondaries_moves_whole_set_and_reports_count() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteContactRepository::try_new(&conn).unwrap();

    let winner = repo.create_primary(Some("a@example.com"), None).unwrap();
    let loser = repo.create_primary(Some("b@example.com"), None).unwrap();
    let first = repo
        .create_secondary(loser.id, Some("b2@example.com"), None)
        .unwrap();
    let second = repo
        .create_secondary(loser.id, None, Some("+1234567890"))
        .unwrap();

    let repointed = repo.repoint_secondaries(loser.id, winner.id).unwrap();
    assert_eq!(repointed, 2);

    let moved = repo.list_secondaries(winner.id).unwrap();
    let ids: Vec<_> = moved.iter().map(|contact| contact.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
    assert!(repo.list_secondaries(loser.id).unwrap().is_empty());
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let result = SqliteContactRepository::try_new(&conn);
    match result {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert!(expected_version > 0),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_required_contacts_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteContactRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredTable("contacts"))
    ));
}

#[test]
fn repository_rejects_connection_missing_required_contacts_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE contacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT,
            phone TEXT
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteContactRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredColumn {
            table: "contacts",
            column: "precedence"
        })
    ));
}
