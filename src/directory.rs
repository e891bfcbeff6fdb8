use crate::roster::RosterEntry;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub external_id: Option<String>,
    pub grade_level: Option<String>,
    pub class_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// How two emails are compared for identity. Display casing is never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailMatch {
    #[default]
    CaseInsensitive,
    Exact,
}

impl EmailMatch {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "case_insensitive" => Some(Self::CaseInsensitive),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaseInsensitive => "case_insensitive",
            Self::Exact => "exact",
        }
    }

    pub fn key(self, email: &str) -> String {
        match self {
            Self::CaseInsensitive => email.trim().to_lowercase(),
            Self::Exact => email.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a student with email {0} already exists")]
    DuplicateEmail(String),
    #[error("student not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Query(#[from] rusqlite::Error),
    #[error("insert failed: {0}")]
    Insert(#[source] rusqlite::Error),
    #[error("update failed: {0}")]
    Update(#[source] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateEmail(_) => "duplicate_email",
            Self::NotFound(_) => "not_found",
            Self::Query(_) => "db_query_failed",
            Self::Insert(_) => "db_insert_failed",
            Self::Update(_) => "db_update_failed",
        }
    }
}

/// The authoritative collection of student records. Email is unique per store.
pub trait DirectoryStore {
    fn find_by_email(
        &self,
        email: &str,
        mode: EmailMatch,
    ) -> Result<Option<StudentRecord>, StoreError>;
    fn insert(&mut self, record: StudentRecord) -> Result<(), StoreError>;
    fn update(&mut self, record: &StudentRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    records: Vec<StudentRecord>,
}

impl MemoryDirectory {
    pub fn new(records: Vec<StudentRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }
}

impl DirectoryStore for MemoryDirectory {
    fn find_by_email(
        &self,
        email: &str,
        mode: EmailMatch,
    ) -> Result<Option<StudentRecord>, StoreError> {
        let key = mode.key(email);
        Ok(self
            .records
            .iter()
            .find(|r| mode.key(&r.email) == key)
            .cloned())
    }

    fn insert(&mut self, record: StudentRecord) -> Result<(), StoreError> {
        if self.records.iter().any(|r| r.email == record.email) {
            return Err(StoreError::DuplicateEmail(record.email));
        }
        self.records.push(record);
        Ok(())
    }

    fn update(&mut self, record: &StudentRecord) -> Result<(), StoreError> {
        let Some(slot) = self.records.iter_mut().find(|r| r.id == record.id) else {
            return Err(StoreError::NotFound(record.id.clone()));
        };
        *slot = record.clone();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertResult {
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub email_match: EmailMatch,
    pub default_active: bool,
    /// Class for newly created records whose entry carries none. Existing records keep theirs.
    pub default_class_id: Option<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            email_match: EmailMatch::default(),
            default_active: true,
            default_class_id: None,
        }
    }
}

fn merge_entry(record: &mut StudentRecord, entry: &RosterEntry, now: &str) {
    record.name = entry.name.clone();
    if let Some(v) = &entry.external_id {
        record.external_id = Some(v.clone());
    }
    if let Some(v) = &entry.grade {
        record.grade_level = Some(v.clone());
    }
    if let Some(v) = &entry.class_id {
        record.class_id = Some(v.clone());
    }
    if let Some(active) = entry.active {
        record.is_active = active;
    }
    record.updated_at = now.to_string();
}

fn new_record(entry: &RosterEntry, opts: &ReconcileOptions, now: &str) -> StudentRecord {
    StudentRecord {
        id: Uuid::new_v4().to_string(),
        email: entry.email.clone(),
        name: entry.name.clone(),
        external_id: entry.external_id.clone(),
        grade_level: entry.grade.clone(),
        class_id: entry
            .class_id
            .clone()
            .or_else(|| opts.default_class_id.clone()),
        is_active: entry.active.unwrap_or(opts.default_active),
        created_at: now.to_string(),
        updated_at: now.to_string(),
    }
}

/// Upserts every entry, in order, keyed by email. `created + updated == entries.len()`.
pub fn reconcile<S: DirectoryStore + ?Sized>(
    entries: &[RosterEntry],
    store: &mut S,
    opts: &ReconcileOptions,
    now: &str,
) -> Result<UpsertResult, StoreError> {
    let mut result = UpsertResult::default();
    for entry in entries {
        match store.find_by_email(&entry.email, opts.email_match)? {
            Some(mut existing) => {
                merge_entry(&mut existing, entry, now);
                store.update(&existing)?;
                result.updated += 1;
            }
            None => {
                store.insert(new_record(entry, opts, now))?;
                result.created += 1;
            }
        }
    }
    tracing::debug!(
        created = result.created,
        updated = result.updated,
        "reconciled roster entries"
    );
    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlannedAction {
    New,
    #[serde(rename_all = "camelCase")]
    Matched { matched_student_id: String },
    /// Same identity as an earlier row of this batch that has no record yet. Applying it updates
    /// the record that row creates, so it counts as a match.
    #[serde(rename_all = "camelCase")]
    RepeatOf { first_line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedRow {
    pub line: usize,
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub action: PlannedAction,
}

impl PlannedRow {
    pub fn is_create(&self) -> bool {
        matches!(self.action, PlannedAction::New)
    }
}

/// Dry run of `reconcile`: the decision each entry would get, without touching the store.
pub fn plan<S: DirectoryStore + ?Sized>(
    entries: &[RosterEntry],
    store: &S,
    email_match: EmailMatch,
) -> Result<Vec<PlannedRow>, StoreError> {
    let mut first_seen = HashMap::<String, usize>::new();
    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let action = match store.find_by_email(&entry.email, email_match)? {
            Some(existing) => PlannedAction::Matched {
                matched_student_id: existing.id,
            },
            None => match first_seen.get(&email_match.key(&entry.email)) {
                Some(&first_line) => PlannedAction::RepeatOf { first_line },
                None => {
                    first_seen.insert(email_match.key(&entry.email), entry.line);
                    PlannedAction::New
                }
            },
        };
        rows.push(PlannedRow {
            line: entry.line,
            name: entry.name.clone(),
            email: entry.email.clone(),
            action,
        });
    }
    Ok(rows)
}
