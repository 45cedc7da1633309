//! Contact repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide indexed lookup by email/phone and link-graph mutations over the
//!   canonical `contacts` table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths reject empty contact pairs and malformed link targets
//!   before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Result ordering is deterministic: `created_at ASC, id ASC`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::contact::{Contact, ContactId, ContactValidationError, Precedence};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone,
    precedence,
    linked_primary_id,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for contact persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ContactValidationError),
    Db(DbError),
    NotFound(ContactId),
    InvalidData(String),
    /// Neither email nor phone was supplied for a row to be created.
    EmptyContactPair,
    /// A secondary would link to a row that is not an active primary.
    LinkTargetNotPrimary(ContactId),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl RepoError {
    /// Returns whether retrying the whole operation against a fresh
    /// transaction may succeed (lock contention, not logic faults).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(db) if db.is_transient())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
            Self::EmptyContactPair => {
                write!(f, "contact requires at least one of email or phone")
            }
            Self::LinkTargetNotPrimary(id) => {
                write!(f, "link target {id} is not an active primary contact")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table: {table}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column: {table}.{column}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContactValidationError> for RepoError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the contact store.
///
/// All operations see the snapshot of the connection (or enclosing
/// transaction) they were constructed over; the store itself is the only
/// synchronization primitive.
pub trait ContactRepository {
    /// Inserts a new primary row and returns it with store-assigned fields.
    fn create_primary(&self, email: Option<&str>, phone: Option<&str>) -> RepoResult<Contact>;
    /// Inserts a new secondary row linked to `primary_id`.
    fn create_secondary(
        &self,
        primary_id: ContactId,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> RepoResult<Contact>;
    /// Fetches one row by id with optional tombstone visibility.
    fn get_contact(&self, id: ContactId, include_deleted: bool) -> RepoResult<Option<Contact>>;
    /// Finds all active rows whose email or phone equals the given values.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> RepoResult<Vec<Contact>>;
    /// Lists active secondaries of one primary in creation order.
    fn list_secondaries(&self, primary_id: ContactId) -> RepoResult<Vec<Contact>>;
    /// Re-points every active secondary of `from_primary_id` to
    /// `to_primary_id`, returning the number of rows changed.
    fn repoint_secondaries(
        &self,
        from_primary_id: ContactId,
        to_primary_id: ContactId,
    ) -> RepoResult<usize>;
    /// Demotes one active primary to a secondary of `new_primary_id`.
    fn demote_primary(&self, id: ContactId, new_primary_id: ContactId) -> RepoResult<()>;
    /// Marks one row as soft-deleted; already-deleted rows keep their
    /// original tombstone timestamp.
    fn soft_delete_contact(&self, id: ContactId) -> RepoResult<()>;
}

/// SQLite-backed contact repository.
///
/// Works equally over a plain connection or a `rusqlite::Transaction` (which
/// derefs to `Connection`), so reconciliation can bind it to one atomic
/// transaction snapshot.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    /// Constructs a repository after verifying the connection is migrated
    /// and the contact schema is present.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn create_primary(&self, email: Option<&str>, phone: Option<&str>) -> RepoResult<Contact> {
        if email.is_none() && phone.is_none() {
            return Err(RepoError::EmptyContactPair);
        }

        self.conn.execute(
            "INSERT INTO contacts (email, phone, precedence, linked_primary_id)
             VALUES (?1, ?2, 'primary', NULL);",
            params![email, phone],
        )?;

        self.read_back(self.conn.last_insert_rowid())
    }

    fn create_secondary(
        &self,
        primary_id: ContactId,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> RepoResult<Contact> {
        if email.is_none() && phone.is_none() {
            return Err(RepoError::EmptyContactPair);
        }

        match self.get_contact(primary_id, false)? {
            None => return Err(RepoError::NotFound(primary_id)),
            Some(target) if !target.is_primary() => {
                return Err(RepoError::LinkTargetNotPrimary(primary_id));
            }
            Some(_) => {}
        }

        self.conn.execute(
            "INSERT INTO contacts (email, phone, precedence, linked_primary_id)
             VALUES (?1, ?2, 'secondary', ?3);",
            params![email, phone, primary_id],
        )?;

        self.read_back(self.conn.last_insert_rowid())
    }

    fn get_contact(&self, id: ContactId, include_deleted: bool) -> RepoResult<Option<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR deleted_at IS NULL);"
        ))?;

        let mut rows = stmt.query(params![id, bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }

        Ok(None)
    }

    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> RepoResult<Vec<Contact>> {
        // NULL never compares equal in SQL, so an absent field cannot match.
        if email.is_none() && phone.is_none() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE deleted_at IS NULL
               AND (email = ?1 OR phone = ?2)
             ORDER BY created_at ASC, id ASC;"
        ))?;

        let mut rows = stmt.query(params![email, phone])?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }

        Ok(contacts)
    }

    fn list_secondaries(&self, primary_id: ContactId) -> RepoResult<Vec<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE precedence = 'secondary'
               AND linked_primary_id = ?1
               AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC;"
        ))?;

        let mut rows = stmt.query([primary_id])?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }

        Ok(contacts)
    }

    fn repoint_secondaries(
        &self,
        from_primary_id: ContactId,
        to_primary_id: ContactId,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE contacts
             SET
                linked_primary_id = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE precedence = 'secondary'
               AND linked_primary_id = ?1
               AND deleted_at IS NULL;",
            params![from_primary_id, to_primary_id],
        )?;

        Ok(changed)
    }

    fn demote_primary(&self, id: ContactId, new_primary_id: ContactId) -> RepoResult<()> {
        if id == new_primary_id {
            return Err(ContactValidationError::SelfLink(id).into());
        }

        let changed = self.conn.execute(
            "UPDATE contacts
             SET
                precedence = 'secondary',
                linked_primary_id = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND precedence = 'primary'
               AND deleted_at IS NULL;",
            params![id, new_primary_id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn soft_delete_contact(&self, id: ContactId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE contacts
             SET
                deleted_at = COALESCE(deleted_at, strftime('%s', 'now') * 1000),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

impl SqliteContactRepository<'_> {
    fn read_back(&self, id: ContactId) -> RepoResult<Contact> {
        self.get_contact(id, true)?.ok_or(RepoError::NotFound(id))
    }
}

fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    let precedence_text: String = row.get("precedence")?;
    let precedence = parse_precedence(&precedence_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid precedence `{precedence_text}` in contacts.precedence"
        ))
    })?;

    let contact = Contact {
        id: row.get("id")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        precedence,
        linked_primary_id: row.get("linked_primary_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    contact.validate()?;
    Ok(contact)
}

fn parse_precedence(value: &str) -> Option<Precedence> {
    match value {
        "primary" => Some(Precedence::Primary),
        "secondary" => Some(Precedence::Secondary),
        _ => None,
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "contacts")? {
        return Err(RepoError::MissingRequiredTable("contacts"));
    }

    for column in [
        "id",
        "email",
        "phone",
        "precedence",
        "linked_primary_id",
        "created_at",
        "updated_at",
        "deleted_at",
    ] {
        if !table_has_column(conn, "contacts", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "contacts",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
