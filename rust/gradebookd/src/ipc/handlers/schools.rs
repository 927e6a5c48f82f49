use crate::error::{GradebookError, Result};
use crate::ipc::helpers::{db_conn, optional_date, optional_str, required_str, respond};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn require_school(conn: &Connection, school_id: &str) -> Result<()> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM schools WHERE id = ?", [school_id], |r| r.get(0))
        .optional()?;
    if hit.is_none() {
        return Err(GradebookError::not_found("school not found"));
    }
    Ok(())
}

fn list_schools(conn: &Connection) -> Result<serde_json::Value> {
    let mut stmt = conn.prepare(
        "SELECT
           sc.id,
           sc.name,
           (SELECT COUNT(*) FROM students s WHERE s.school_id = sc.id) AS student_count,
           (SELECT COUNT(*) FROM academic_years y WHERE y.school_id = sc.id) AS year_count
         FROM schools sc
         ORDER BY sc.name",
    )?;
    let schools = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let student_count: i64 = row.get(2)?;
            let year_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "studentCount": student_count,
                "academicYearCount": year_count
            }))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(json!({ "schools": schools }))
}

fn handle_schools_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Ok(conn) = db_conn(state) else {
        return respond(req, Ok(json!({ "schools": [] })));
    };
    respond(req, list_schools(conn))
}

fn handle_schools_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let name = required_str(&req.params, "name")?;
        let school_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO schools(id, name) VALUES(?, ?)",
            (&school_id, &name),
        )?;
        tracing::info!(school = %school_id, "school created");
        Ok(json!({ "schoolId": school_id, "name": name }))
    });
    respond(req, result)
}

fn handle_academic_years_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let school_id = required_str(&req.params, "schoolId")?;
        let name = required_str(&req.params, "name")?;
        let start = optional_date(&req.params, "startDate")?;
        let end = optional_date(&req.params, "endDate")?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(GradebookError::validation("startDate must be <= endDate"));
            }
        }
        require_school(conn, &school_id)?;

        let year_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO academic_years(id, school_id, name, start_date, end_date)
             VALUES(?, ?, ?, ?, ?)",
            (
                &year_id,
                &school_id,
                &name,
                start.map(|d| d.to_string()),
                end.map(|d| d.to_string()),
            ),
        )?;
        Ok(json!({ "academicYearId": year_id, "name": name }))
    });
    respond(req, result)
}

fn handle_academic_years_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let school_id = optional_str(&req.params, "schoolId")?;
        let mut stmt = conn.prepare(
            "SELECT id, school_id, name, start_date, end_date
             FROM academic_years
             WHERE (?1 IS NULL OR school_id = ?1)
             ORDER BY start_date, name",
        )?;
        let years = stmt
            .query_map([&school_id], |r| {
                let id: String = r.get(0)?;
                let school_id: String = r.get(1)?;
                let name: String = r.get(2)?;
                let start_date: Option<String> = r.get(3)?;
                let end_date: Option<String> = r.get(4)?;
                Ok(json!({
                    "id": id,
                    "schoolId": school_id,
                    "name": name,
                    "startDate": start_date,
                    "endDate": end_date
                }))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(json!({ "academicYears": years }))
    });
    respond(req, result)
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let name = required_str(&req.params, "name")?;
        let school_id = optional_str(&req.params, "schoolId")?;
        let code = optional_str(&req.params, "code")?;
        if let Some(sid) = school_id.as_deref() {
            require_school(conn, sid)?;
        }
        let subject_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO subjects(id, school_id, name, code) VALUES(?, ?, ?, ?)",
            (&subject_id, &school_id, &name, &code),
        )?;
        Ok(json!({ "subjectId": subject_id, "name": name }))
    });
    respond(req, result)
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let school_id = optional_str(&req.params, "schoolId")?;
        let mut stmt = conn.prepare(
            "SELECT id, school_id, name, code
             FROM subjects
             WHERE (?1 IS NULL OR school_id = ?1)
             ORDER BY name",
        )?;
        let subjects = stmt
            .query_map([&school_id], |r| {
                let id: String = r.get(0)?;
                let school_id: Option<String> = r.get(1)?;
                let name: String = r.get(2)?;
                let code: Option<String> = r.get(3)?;
                Ok(json!({ "id": id, "schoolId": school_id, "name": name, "code": code }))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(json!({ "subjects": subjects }))
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schools.list" => Some(handle_schools_list(state, req)),
        "schools.create" => Some(handle_schools_create(state, req)),
        "academicYears.create" => Some(handle_academic_years_create(state, req)),
        "academicYears.list" => Some(handle_academic_years_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        _ => None,
    }
}
