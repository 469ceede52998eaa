//! Member store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence APIs over the self-referential `members` table.
//! - Keep SQL details and ordering behavior inside repository boundary.
//!
//! # Invariants
//! - Only active (`is_deleted=0`) members are returned by default.
//! - Child listing is deterministic: `full_name ASC, id ASC`.
//! - A member whose parent is missing, soft-deleted or itself is listed as
//!   a root.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::member::{now_epoch_ms, Member, MemberId, MemberValidationError};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const MEMBER_SELECT_SQL: &str = "SELECT
    m.id AS id,
    m.full_name AS full_name,
    m.email AS email,
    m.phone AS phone,
    m.church AS church,
    m.membership_category AS membership_category,
    m.age_group AS age_group,
    m.spiritual_parent_id AS spiritual_parent_id,
    m.is_deleted AS is_deleted,
    m.created_at AS created_at,
    m.updated_at AS updated_at
FROM members m";

// Parent reference resolves to another active member. Self-references
// written around the service layer count as dangling.
const HAS_ACTIVE_PARENT_SQL: &str = "EXISTS(
    SELECT 1
    FROM members p
    WHERE p.id = m.spiritual_parent_id
      AND p.id <> m.id
      AND p.is_deleted = 0
)";

const MEMBER_LIST_LIMIT_MAX: u32 = 500;

/// Result type used by member repository operations.
pub type MemberRepoResult<T> = Result<T, MemberRepoError>;

/// Errors from member repository operations.
#[derive(Debug)]
pub enum MemberRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Write rejected by `Member::validate`.
    Validation(MemberValidationError),
    /// Target member does not exist or is soft-deleted.
    NotFound(MemberId),
    /// Insert collided with an existing id.
    DuplicateId(MemberId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to valid read model.
    InvalidData(String),
}

impl Display for MemberRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "member not found: {id}"),
            Self::DuplicateId(id) => write!(f, "member id already exists: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "member repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "member repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "member repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid member data: {message}"),
        }
    }
}

impl Error for MemberRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for MemberRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for MemberRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<MemberValidationError> for MemberRepoError {
    fn from(value: MemberValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Query options for paginated member listing.
#[derive(Debug, Clone, Default)]
pub struct MemberListQuery {
    pub include_deleted: bool,
    /// Capped at 500; `None` lists everything.
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Population counts over active members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulationCounts {
    pub total: usize,
    /// No parent, or the parent is missing/soft-deleted.
    pub roots: usize,
    /// Parent resolves to an active member.
    pub with_parents: usize,
}

/// Repository interface for the member store.
pub trait MemberRepository {
    /// Inserts one validated member.
    fn create_member(&self, member: &Member) -> MemberRepoResult<MemberId>;
    /// Loads one member by id.
    fn get_member(&self, id: &str, include_deleted: bool) -> MemberRepoResult<Option<Member>>;
    /// Lists active direct children of one member.
    fn list_children(&self, parent_id: &str) -> MemberRepoResult<Vec<Member>>;
    /// Lists active roots, orphaned members included.
    fn list_roots(&self) -> MemberRepoResult<Vec<Member>>;
    /// Lists members sorted by `full_name ASC, id ASC`.
    fn list_members(&self, query: &MemberListQuery) -> MemberRepoResult<Vec<Member>>;
    /// Loads every active member in one pass.
    fn list_active(&self) -> MemberRepoResult<Vec<Member>> {
        self.list_members(&MemberListQuery::default())
    }
    /// Points one member at a new parent (or makes it a root).
    fn set_spiritual_parent(&self, id: &str, parent_id: Option<&str>) -> MemberRepoResult<()>;
    /// Tombstones one member. Children keep their dangling reference.
    fn soft_delete_member(&self, id: &str) -> MemberRepoResult<()>;
    /// Counts active members by lineage role.
    fn population_counts(&self) -> MemberRepoResult<PopulationCounts>;
}

/// SQLite-backed member repository.
pub struct SqliteMemberRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMemberRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> MemberRepoResult<Self> {
        ensure_member_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl MemberRepository for SqliteMemberRepository<'_> {
    fn create_member(&self, member: &Member) -> MemberRepoResult<MemberId> {
        member.validate()?;

        if self.get_member(&member.id, true)?.is_some() {
            return Err(MemberRepoError::DuplicateId(member.id.clone()));
        }

        self.conn.execute(
            "INSERT INTO members (
                id,
                full_name,
                email,
                phone,
                church,
                membership_category,
                age_group,
                spiritual_parent_id,
                is_deleted,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                member.id,
                member.full_name.trim(),
                member.email,
                member.phone,
                member.church,
                member.membership_category,
                member.age_group,
                member.spiritual_parent_id,
                member.is_deleted as i64,
                member.created_at,
                member.updated_at,
            ],
        )?;
        Ok(member.id.clone())
    }

    fn get_member(&self, id: &str, include_deleted: bool) -> MemberRepoResult<Option<Member>> {
        let sql = if include_deleted {
            format!("{MEMBER_SELECT_SQL} WHERE m.id = ?1;")
        } else {
            format!("{MEMBER_SELECT_SQL} WHERE m.id = ?1 AND m.is_deleted = 0;")
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_member_row(row)?));
        }
        Ok(None)
    }

    fn list_children(&self, parent_id: &str) -> MemberRepoResult<Vec<Member>> {
        let sql = format!(
            "{MEMBER_SELECT_SQL}
             WHERE m.spiritual_parent_id = ?1
               AND m.id <> ?1
               AND m.is_deleted = 0
             ORDER BY m.full_name ASC, m.id ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([parent_id])?;
        collect_members(&mut rows)
    }

    fn list_roots(&self) -> MemberRepoResult<Vec<Member>> {
        let sql = format!(
            "{MEMBER_SELECT_SQL}
             WHERE m.is_deleted = 0
               AND (m.spiritual_parent_id IS NULL OR NOT {HAS_ACTIVE_PARENT_SQL})
             ORDER BY m.full_name ASC, m.id ASC;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        collect_members(&mut rows)
    }

    fn list_members(&self, query: &MemberListQuery) -> MemberRepoResult<Vec<Member>> {
        let filter = if query.include_deleted {
            ""
        } else {
            "WHERE m.is_deleted = 0"
        };
        // SQLite treats a negative LIMIT as unbounded.
        let limit = query
            .limit
            .map_or(-1_i64, |value| i64::from(value.min(MEMBER_LIST_LIMIT_MAX)));
        let sql = format!(
            "{MEMBER_SELECT_SQL}
             {filter}
             ORDER BY m.full_name ASC, m.id ASC
             LIMIT ?1 OFFSET ?2;"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![limit, i64::from(query.offset)])?;
        collect_members(&mut rows)
    }

    fn set_spiritual_parent(&self, id: &str, parent_id: Option<&str>) -> MemberRepoResult<()> {
        if parent_id == Some(id) {
            return Err(MemberValidationError::SelfParent(id.to_string()).into());
        }
        let changed = self.conn.execute(
            "UPDATE members
             SET spiritual_parent_id = ?2,
                 updated_at = ?3
             WHERE id = ?1
               AND is_deleted = 0;",
            params![id, parent_id, now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(MemberRepoError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn soft_delete_member(&self, id: &str) -> MemberRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE members
             SET is_deleted = 1,
                 updated_at = ?2
             WHERE id = ?1
               AND is_deleted = 0;",
            params![id, now_epoch_ms()],
        )?;
        if changed == 0 {
            return Err(MemberRepoError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn population_counts(&self) -> MemberRepoResult<PopulationCounts> {
        let sql = format!(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN {HAS_ACTIVE_PARENT_SQL} THEN 1 ELSE 0 END), 0)
             FROM members m
             WHERE m.is_deleted = 0;"
        );
        let (total, with_parents): (i64, i64) = self
            .conn
            .query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let total = usize::try_from(total)
            .map_err(|_| MemberRepoError::InvalidData(format!("negative member count {total}")))?;
        let with_parents = usize::try_from(with_parents).map_err(|_| {
            MemberRepoError::InvalidData(format!("negative parented count {with_parents}"))
        })?;
        Ok(PopulationCounts {
            total,
            roots: total.saturating_sub(with_parents),
            with_parents,
        })
    }
}

fn collect_members(rows: &mut rusqlite::Rows<'_>) -> MemberRepoResult<Vec<Member>> {
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(parse_member_row(row)?);
    }
    Ok(items)
}

fn parse_member_row(row: &Row<'_>) -> MemberRepoResult<Member> {
    let is_deleted = match row.get::<_, i64>("is_deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(MemberRepoError::InvalidData(format!(
                "invalid is_deleted value `{other}` in members.is_deleted"
            )));
        }
    };

    // Blank references are treated as no parent.
    let spiritual_parent_id = row
        .get::<_, Option<String>>("spiritual_parent_id")?
        .filter(|value| !value.trim().is_empty());

    Ok(Member {
        id: row.get("id")?,
        full_name: row.get("full_name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        church: row.get("church")?,
        membership_category: row.get("membership_category")?,
        age_group: row.get("age_group")?,
        spiritual_parent_id,
        is_deleted,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn ensure_member_connection_ready(conn: &Connection) -> MemberRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(MemberRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "members")? {
        return Err(MemberRepoError::MissingRequiredTable("members"));
    }

    for column in [
        "id",
        "full_name",
        "email",
        "phone",
        "church",
        "membership_category",
        "age_group",
        "spiritual_parent_id",
        "is_deleted",
        "created_at",
        "updated_at",
    ] {
        if !table_has_column(conn, "members", column)? {
            return Err(MemberRepoError::MissingRequiredColumn {
                table: "members",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> MemberRepoResult<bool> {
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

fn table_has_column(conn: &Connection, table: &str, column: &str) -> MemberRepoResult<bool> {
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
