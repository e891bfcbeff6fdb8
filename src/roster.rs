use crate::directory::StudentRecord;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// One accepted data row. `line` is the 1-based physical line in the raw input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub line: usize,
    pub name: String,
    pub email: String,
    pub external_id: Option<String>,
    pub grade: Option<String>,
    pub class_id: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SkipReason {
    FieldCountMismatch { expected: usize, actual: usize },
    MissingRequired { fields: Vec<&'static str> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub line: usize,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRoster {
    pub entries: Vec<RosterEntry>,
    pub skipped: Vec<SkippedRow>,
    pub rows_total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterParseError {
    #[error("roster needs a header row and at least one data row")]
    EmptyInput,
    #[error("missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<&'static str> },
    #[error("no rows had both name and email ({rows_total} data rows read)")]
    NoValidRows { rows_total: usize },
}

impl RosterParseError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::MissingColumns { .. } => "missing_columns",
            Self::NoValidRows { .. } => "no_valid_rows",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::EmptyInput => None,
            Self::MissingColumns { missing } => Some(json!({ "missing": missing })),
            Self::NoValidRows { rows_total } => Some(json!({ "rowsTotal": rows_total })),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Name,
    Email,
    ExternalId,
    Grade,
    ClassId,
    Active,
}

const REQUIRED: [(Column, &str); 2] = [(Column::Name, "name"), (Column::Email, "email")];

fn column_for_header(header: &str) -> Option<Column> {
    match header {
        "name" => Some(Column::Name),
        "email" => Some(Column::Email),
        "externalid" | "external_id" | "studentid" | "student_id" => Some(Column::ExternalId),
        "grade" => Some(Column::Grade),
        "classid" | "class_id" | "class" => Some(Column::ClassId),
        "active" | "isactive" | "is_active" => Some(Column::Active),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_boolish(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// Parses comma-separated roster text. The first non-blank line is the header.
/// No quoting: a field can never contain a literal comma.
pub fn parse_roster(text: &str) -> Result<ParsedRoster, RosterParseError> {
    let lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| (i + 1, l))
        .collect::<Vec<_>>();
    if lines.len() < 2 {
        return Err(RosterParseError::EmptyInput);
    }

    let header_line = lines[0].1.trim_start_matches('\u{feff}');
    let header = split_fields(header_line);
    let mut columns = HashMap::<Column, usize>::new();
    for (i, h) in header.iter().enumerate() {
        if let Some(col) = column_for_header(&h.to_lowercase()) {
            // First matching synonym wins.
            columns.entry(col).or_insert(i);
        }
    }
    let missing = REQUIRED
        .iter()
        .filter(|(col, _)| !columns.contains_key(col))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(RosterParseError::MissingColumns { missing });
    }

    let mut parsed = ParsedRoster::default();
    for (line_no, raw) in lines.iter().skip(1) {
        parsed.rows_total += 1;
        let fields = split_fields(raw);
        if fields.len() != header.len() {
            parsed.skipped.push(SkippedRow {
                line: *line_no,
                reason: SkipReason::FieldCountMismatch {
                    expected: header.len(),
                    actual: fields.len(),
                },
            });
            continue;
        }
        let field = |col: Column| columns.get(&col).map(|&i| fields[i]).unwrap_or("");

        let name = field(Column::Name);
        let email = field(Column::Email);
        let blank = REQUIRED
            .iter()
            .filter(|(col, _)| field(*col).is_empty())
            .map(|(_, name)| *name)
            .collect::<Vec<_>>();
        if !blank.is_empty() {
            parsed.skipped.push(SkippedRow {
                line: *line_no,
                reason: SkipReason::MissingRequired { fields: blank },
            });
            continue;
        }

        parsed.entries.push(RosterEntry {
            line: *line_no,
            name: name.to_string(),
            email: email.to_string(),
            external_id: non_empty(field(Column::ExternalId)),
            grade: non_empty(field(Column::Grade)),
            class_id: non_empty(field(Column::ClassId)),
            active: parse_boolish(field(Column::Active)),
        });
    }

    if parsed.entries.is_empty() {
        return Err(RosterParseError::NoValidRows {
            rows_total: parsed.rows_total,
        });
    }
    tracing::debug!(
        accepted = parsed.entries.len(),
        skipped = parsed.skipped.len(),
        "parsed roster"
    );
    Ok(parsed)
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

pub const EXPORT_HEADER: &str = "name,email,external_id,grade,class_id,active";

/// Renders records using the same header vocabulary `parse_roster` accepts.
pub fn write_roster_csv(records: &[StudentRecord]) -> String {
    let mut out = String::from(EXPORT_HEADER);
    out.push('\n');
    for r in records {
        let cols = [
            csv_quote(&r.name),
            csv_quote(&r.email),
            csv_quote(r.external_id.as_deref().unwrap_or("")),
            csv_quote(r.grade_level.as_deref().unwrap_or("")),
            csv_quote(r.class_id.as_deref().unwrap_or("")),
            (if r.is_active { "1" } else { "0" }).to_string(),
        ];
        out.push_str(&cols.join(","));
        out.push('\n');
    }
    out
}
