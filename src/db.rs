use crate::directory::{DirectoryStore, EmailMatch, StoreError, StudentRecord};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "classroom.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // email is unique as written; email_key is the lower-cased lookup key.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            email_key TEXT NOT NULL,
            name TEXT NOT NULL,
            external_id TEXT,
            grade_level TEXT,
            class_id TEXT,
            active INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_email_key ON students(email_key)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS curriculum_units(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            topics_json TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

const STUDENT_COLUMNS: &str =
    "id, email, name, external_id, grade_level, class_id, active, created_at, updated_at";

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: r.get(0)?,
        email: r.get(1)?,
        name: r.get(2)?,
        external_id: r.get(3)?,
        grade_level: r.get(4)?,
        class_id: r.get(5)?,
        is_active: r.get::<_, i64>(6)? != 0,
        created_at: r.get(7)?,
        updated_at: r.get(8)?,
    })
}

pub fn list_students(
    conn: &Connection,
    class_id: Option<&str>,
    include_inactive: bool,
) -> Result<Vec<StudentRecord>, StoreError> {
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students
         WHERE (?1 IS NULL OR class_id = ?1) AND (?2 = 1 OR active = 1)
         ORDER BY name COLLATE NOCASE, email"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((class_id, include_inactive as i64), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_student_active(
    conn: &Connection,
    student_id: &str,
    active: bool,
    now: &str,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE students SET active = ?, updated_at = ? WHERE id = ?",
        (active as i64, now, student_id),
    )
    .map_err(StoreError::Update)?;
    if changed == 0 {
        return Err(StoreError::NotFound(student_id.to_string()));
    }
    Ok(())
}

/// Directory Store over a workspace connection. Pass a `Transaction` (it derefs to
/// `Connection`) to make a whole reconcile batch commit or roll back together.
pub struct SqliteDirectory<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteDirectory<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn map_unique_violation(e: rusqlite::Error, email: &str) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::DuplicateEmail(email.to_string())
        }
        other => StoreError::Insert(other),
    }
}

impl DirectoryStore for SqliteDirectory<'_> {
    fn find_by_email(
        &self,
        email: &str,
        mode: EmailMatch,
    ) -> Result<Option<StudentRecord>, StoreError> {
        let (column, key) = match mode {
            EmailMatch::Exact => ("email", email.to_string()),
            EmailMatch::CaseInsensitive => ("email_key", mode.key(email)),
        };
        // Oldest wins if exact-mode imports left several case variants behind.
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE {column} = ? ORDER BY rowid LIMIT 1"
        );
        let found = self
            .conn
            .query_row(&sql, [key], student_from_row)
            .optional()?;
        Ok(found)
    }

    fn insert(&mut self, record: StudentRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO students(id, email, email_key, name, external_id, grade_level, class_id, active, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &record.id,
                    &record.email,
                    EmailMatch::CaseInsensitive.key(&record.email),
                    &record.name,
                    &record.external_id,
                    &record.grade_level,
                    &record.class_id,
                    record.is_active as i64,
                    &record.created_at,
                    &record.updated_at,
                ),
            )
            .map_err(|e| map_unique_violation(e, &record.email))?;
        Ok(())
    }

    fn update(&mut self, record: &StudentRecord) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE students
             SET name = ?, external_id = ?, grade_level = ?, class_id = ?, active = ?, updated_at = ?
             WHERE id = ?",
            (
                &record.name,
                &record.external_id,
                &record.grade_level,
                &record.class_id,
                record.is_active as i64,
                &record.updated_at,
                &record.id,
            ),
        )
        .map_err(StoreError::Update)?;
        if changed == 0 {
            return Err(StoreError::NotFound(record.id.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumUnit {
    pub id: String,
    pub title: String,
    pub topics: Vec<String>,
}

pub fn create_unit(conn: &Connection, id: &str, title: &str, topics: &[String], now: &str) -> anyhow::Result<()> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM curriculum_units",
        [],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO curriculum_units(id, title, topics_json, sort_order, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (id, title, serde_json::to_string(topics)?, next, now),
    )?;
    Ok(())
}

fn unit_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<CurriculumUnit> {
    let raw: String = r.get(2)?;
    Ok(CurriculumUnit {
        id: r.get(0)?,
        title: r.get(1)?,
        topics: serde_json::from_str::<Vec<String>>(&raw).unwrap_or_default(),
    })
}

pub fn list_units(conn: &Connection) -> anyhow::Result<Vec<CurriculumUnit>> {
    let mut stmt =
        conn.prepare("SELECT id, title, topics_json FROM curriculum_units ORDER BY sort_order")?;
    let units = stmt
        .query_map([], unit_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(units)
}

pub fn get_unit(conn: &Connection, unit_id: &str) -> anyhow::Result<Option<CurriculumUnit>> {
    let unit = conn
        .query_row(
            "SELECT id, title, topics_json FROM curriculum_units WHERE id = ?",
            [unit_id],
            unit_from_row,
        )
        .optional()?;
    Ok(unit)
}
