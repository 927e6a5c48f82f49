use crate::db;
use crate::error::{GradebookError, Result};
use crate::grading::{self, percent_of, GradingScheme};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            "excused" => Some(Self::Excused),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
            Self::Excused => "excused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarksheetStatus {
    Draft,
    Approved,
    Published,
}

impl MarksheetStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "approved" => Some(Self::Approved),
            "published" => Some(Self::Published),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Published => "published",
        }
    }

    /// Marksheets only move one step forward: draft -> approved -> published.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Draft => Some(Self::Approved),
            Self::Approved => Some(Self::Published),
            Self::Published => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportCardStatus {
    Generated,
    Signed,
    Distributed,
}

impl ReportCardStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Generated" => Some(Self::Generated),
            "Signed" => Some(Self::Signed),
            "Distributed" => Some(Self::Distributed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "Generated",
            Self::Signed => "Signed",
            Self::Distributed => "Distributed",
        }
    }
}

fn require_row(conn: &Connection, table: &str, id: &str, what: &str) -> Result<()> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let hit: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    if hit.is_none() {
        return Err(GradebookError::not_found(format!("{} not found", what)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub status: String,
}

pub fn record_attendance(
    conn: &Connection,
    student_id: &str,
    date: NaiveDate,
    status: AttendanceStatus,
) -> Result<AttendanceRecord> {
    require_row(conn, "students", student_id, "student")?;
    let day = date.format("%Y-%m-%d").to_string();
    let existing: Option<String> = conn
        .query_row(
            "SELECT status FROM attendance_records WHERE student_id = ? AND date = ?",
            (student_id, &day),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(prev) = existing {
        return Err(GradebookError::Conflict(format!(
            "attendance already recorded for {} ({})",
            day, prev
        )));
    }

    let rec = AttendanceRecord {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        date: day,
        status: status.as_str().to_string(),
    };
    conn.execute(
        "INSERT INTO attendance_records(id, student_id, date, status, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&rec.id, &rec.student_id, &rec.date, &rec.status, db::now_timestamp()),
    )?;
    Ok(rec)
}

pub fn list_attendance(
    conn: &Connection,
    student_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<AttendanceRecord>> {
    let mut sql = String::from(
        "SELECT id, student_id, date, status FROM attendance_records WHERE student_id = ?",
    );
    let mut values = vec![Value::Text(student_id.to_string())];
    if let Some(d) = start {
        sql.push_str(" AND date >= ?");
        values.push(Value::Text(d.format("%Y-%m-%d").to_string()));
    }
    if let Some(d) = end {
        sql.push_str(" AND date <= ?");
        values.push(Value::Text(d.format("%Y-%m-%d").to_string()));
    }
    sql.push_str(" ORDER BY date");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |r| {
            Ok(AttendanceRecord {
                id: r.get(0)?,
                student_id: r.get(1)?,
                date: r.get(2)?,
                status: r.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marksheet {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub academic_year_id: String,
    pub term: i64,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub percentage: f64,
    pub grade: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct MarksEntry {
    pub student_id: String,
    pub subject_id: String,
    pub academic_year_id: String,
    pub term: i64,
    pub marks_obtained: Option<f64>,
    pub max_marks: Option<f64>,
}

pub fn validate_marks(obtained: Option<f64>, max: Option<f64>) -> Result<(f64, f64)> {
    let (Some(obtained), Some(max)) = (obtained, max) else {
        return Err(GradebookError::validation(
            "marksObtained and maxMarks are required",
        ));
    };
    if !obtained.is_finite() || !max.is_finite() {
        return Err(GradebookError::validation("marks must be finite numbers"));
    }
    if max <= 0.0 {
        return Err(GradebookError::validation("maxMarks must be > 0"));
    }
    if obtained < 0.0 || obtained > max {
        return Err(GradebookError::validation(format!(
            "marksObtained must be in 0..={}",
            max
        )));
    }
    Ok((obtained, max))
}

pub fn grade_for(percentage: f64, schemes: &[GradingScheme]) -> Option<String> {
    match grading::classify(percentage, schemes) {
        Ok(outcome) => Some(outcome.grade),
        Err(_) => {
            tracing::warn!(percentage, "no grading band covers percentage; storing ungraded");
            None
        }
    }
}

const MARKSHEET_COLUMNS: &str = "id, student_id, subject_id, academic_year_id, term, marks_obtained, max_marks, percentage, grade, status";

fn marksheet_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Marksheet> {
    Ok(Marksheet {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        academic_year_id: r.get(3)?,
        term: r.get(4)?,
        marks_obtained: r.get(5)?,
        max_marks: r.get(6)?,
        percentage: r.get(7)?,
        grade: r.get(8)?,
        status: r.get(9)?,
    })
}

pub fn get_marksheet(conn: &Connection, id: &str) -> Result<Marksheet> {
    conn.query_row(
        &format!("SELECT {} FROM marksheets WHERE id = ?", MARKSHEET_COLUMNS),
        [id],
        marksheet_from_row,
    )
    .optional()?
    .ok_or_else(|| GradebookError::not_found("marksheet not found"))
}

pub fn upsert_marksheet(
    conn: &Connection,
    entry: &MarksEntry,
    schemes: &[GradingScheme],
) -> Result<Marksheet> {
    let (obtained, max) = validate_marks(entry.marks_obtained, entry.max_marks)?;
    if entry.term < 1 {
        return Err(GradebookError::validation("term must be >= 1"));
    }

    let tx = conn.unchecked_transaction()?;
    require_row(&tx, "students", &entry.student_id, "student")?;
    require_row(&tx, "subjects", &entry.subject_id, "subject")?;
    require_row(&tx, "academic_years", &entry.academic_year_id, "academic year")?;

    let percentage = percent_of(obtained, max);
    let grade = grade_for(percentage, schemes);
    let now = db::now_timestamp();

    let existing: Option<(String, String)> = tx
        .query_row(
            "SELECT id, status FROM marksheets
             WHERE student_id = ? AND subject_id = ? AND academic_year_id = ? AND term = ?",
            (
                &entry.student_id,
                &entry.subject_id,
                &entry.academic_year_id,
                entry.term,
            ),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let id = match existing {
        Some((id, status)) => {
            if status != MarksheetStatus::Draft.as_str() {
                return Err(GradebookError::validation(format!(
                    "marksheet is {}; only draft marksheets can be edited",
                    status
                )));
            }
            tx.execute(
                "UPDATE marksheets
                 SET marks_obtained = ?, max_marks = ?, percentage = ?, grade = ?, updated_at = ?
                 WHERE id = ?",
                (obtained, max, percentage, &grade, &now, &id),
            )?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO marksheets(id, student_id, subject_id, academic_year_id, term,
                    marks_obtained, max_marks, percentage, grade, status, created_at, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &entry.student_id,
                    &entry.subject_id,
                    &entry.academic_year_id,
                    entry.term,
                    obtained,
                    max,
                    percentage,
                    &grade,
                    MarksheetStatus::Draft.as_str(),
                    &now,
                    &now,
                ),
            )?;
            id
        }
    };
    let sheet = get_marksheet(&tx, &id)?;
    tx.commit()?;
    Ok(sheet)
}

pub fn transition_marksheet(
    conn: &Connection,
    id: &str,
    target: MarksheetStatus,
) -> Result<Marksheet> {
    let sheet = get_marksheet(conn, id)?;
    let current = MarksheetStatus::parse(&sheet.status).ok_or_else(|| {
        GradebookError::validation(format!("unknown marksheet status: {}", sheet.status))
    })?;
    if current.next() != Some(target) {
        return Err(GradebookError::validation(format!(
            "cannot move marksheet from {} to {}",
            current.as_str(),
            target.as_str()
        )));
    }
    conn.execute(
        "UPDATE marksheets SET status = ?, updated_at = ? WHERE id = ?",
        (target.as_str(), db::now_timestamp(), id),
    )?;
    tracing::info!(marksheet = %id, status = target.as_str(), "marksheet status changed");
    get_marksheet(conn, id)
}

pub fn delete_marksheet(conn: &Connection, id: &str) -> Result<()> {
    let sheet = get_marksheet(conn, id)?;
    if sheet.status == MarksheetStatus::Published.as_str() {
        return Err(GradebookError::validation(
            "published marksheets cannot be deleted",
        ));
    }
    conn.execute("DELETE FROM marksheets WHERE id = ?", [id])?;
    Ok(())
}

pub fn list_marksheets(
    conn: &Connection,
    student_id: Option<&str>,
    academic_year_id: Option<&str>,
) -> Result<Vec<Marksheet>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(v) = student_id {
        clauses.push("student_id = ?");
        values.push(Value::Text(v.to_string()));
    }
    if let Some(v) = academic_year_id {
        clauses.push("academic_year_id = ?");
        values.push(Value::Text(v.to_string()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM marksheets {} ORDER BY student_id, academic_year_id, subject_id, term",
        MARKSHEET_COLUMNS, where_sql
    ))?;
    let rows = stmt
        .query_map(params_from_iter(values), marksheet_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub id: String,
    pub student_id: String,
    pub academic_year_id: String,
    pub final_grade: String,
    pub percentage: f64,
    pub status: String,
    pub generated_at: String,
}

const REPORT_CARD_COLUMNS: &str =
    "id, student_id, academic_year_id, final_grade, percentage, status, generated_at";

fn report_card_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ReportCard> {
    Ok(ReportCard {
        id: r.get(0)?,
        student_id: r.get(1)?,
        academic_year_id: r.get(2)?,
        final_grade: r.get(3)?,
        percentage: r.get(4)?,
        status: r.get(5)?,
        generated_at: r.get(6)?,
    })
}

pub fn get_report_card(conn: &Connection, id: &str) -> Result<ReportCard> {
    conn.query_row(
        &format!("SELECT {} FROM report_cards WHERE id = ?", REPORT_CARD_COLUMNS),
        [id],
        report_card_from_row,
    )
    .optional()?
    .ok_or_else(|| GradebookError::not_found("report card not found"))
}

/// Regenerating replaces the figures and resets the status to `Generated`.
pub fn generate_report_card(
    conn: &Connection,
    student_id: &str,
    academic_year_id: &str,
    schemes: &[GradingScheme],
    now: NaiveDateTime,
) -> Result<ReportCard> {
    let tx = conn.unchecked_transaction()?;
    require_row(&tx, "students", student_id, "student")?;
    require_row(&tx, "academic_years", academic_year_id, "academic year")?;

    let (count, obtained, max): (i64, f64, f64) = tx.query_row(
        "SELECT COUNT(*), COALESCE(SUM(marks_obtained), 0.0), COALESCE(SUM(max_marks), 0.0)
         FROM marksheets
         WHERE student_id = ? AND academic_year_id = ? AND status <> 'draft'",
        (student_id, academic_year_id),
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;
    if count == 0 {
        return Err(GradebookError::validation(
            "no approved marksheets for this student and academic year",
        ));
    }

    let percentage = percent_of(obtained, max);
    let outcome = grading::classify(percentage, schemes)?;
    let stamp = db::format_timestamp(now);

    tx.execute(
        "INSERT INTO report_cards(id, student_id, academic_year_id, final_grade, percentage,
            status, generated_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, academic_year_id) DO UPDATE SET
            final_grade = excluded.final_grade,
            percentage = excluded.percentage,
            status = excluded.status,
            generated_at = excluded.generated_at,
            updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            student_id,
            academic_year_id,
            &outcome.grade,
            percentage,
            ReportCardStatus::Generated.as_str(),
            &stamp,
            &stamp,
        ),
    )?;
    let card = tx.query_row(
        &format!(
            "SELECT {} FROM report_cards WHERE student_id = ? AND academic_year_id = ?",
            REPORT_CARD_COLUMNS
        ),
        (student_id, academic_year_id),
        report_card_from_row,
    )?;
    tx.commit()?;
    tracing::info!(
        student = %student_id,
        year = %academic_year_id,
        grade = %card.final_grade,
        percentage = card.percentage,
        "report card generated"
    );
    Ok(card)
}

pub fn set_report_card_status(
    conn: &Connection,
    id: &str,
    target: ReportCardStatus,
) -> Result<ReportCard> {
    let card = get_report_card(conn, id)?;
    let current = ReportCardStatus::parse(&card.status).ok_or_else(|| {
        GradebookError::validation(format!("unknown report card status: {}", card.status))
    })?;
    if target <= current {
        return Err(GradebookError::validation(format!(
            "cannot move report card from {} to {}",
            current.as_str(),
            target.as_str()
        )));
    }
    conn.execute(
        "UPDATE report_cards SET status = ?, updated_at = ? WHERE id = ?",
        (target.as_str(), db::now_timestamp(), id),
    )?;
    get_report_card(conn, id)
}

pub fn list_report_cards(
    conn: &Connection,
    student_id: Option<&str>,
    academic_year_id: Option<&str>,
) -> Result<Vec<ReportCard>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM report_cards
         WHERE (?1 IS NULL OR student_id = ?1) AND (?2 IS NULL OR academic_year_id = ?2)
         ORDER BY generated_at DESC, student_id",
        REPORT_CARD_COLUMNS
    ))?;
    let rows = stmt
        .query_map((student_id, academic_year_id), report_card_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
