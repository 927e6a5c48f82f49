use crate::error::{GradebookError, Result};
use crate::ipc::handlers::schools::require_school;
use crate::ipc::helpers::{db_conn, optional_str, required_str, respond};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn require_student(conn: &Connection, student_id: &str) -> Result<()> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| r.get(0))
        .optional()?;
    if hit.is_none() {
        return Err(GradebookError::not_found("student not found"));
    }
    Ok(())
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let school_id = required_str(&req.params, "schoolId")?;
        let first_name = required_str(&req.params, "firstName")?;
        let last_name = required_str(&req.params, "lastName")?;
        require_school(conn, &school_id)?;

        let student_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO students(id, school_id, first_name, last_name, active, created_at)
             VALUES(?, ?, ?, ?, 1, ?)",
            (
                &student_id,
                &school_id,
                &first_name,
                &last_name,
                crate::db::now_timestamp(),
            ),
        )?;
        Ok(json!({
            "studentId": student_id,
            "displayName": format!("{} {}", first_name, last_name)
        }))
    });
    respond(req, result)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let school_id = optional_str(&req.params, "schoolId")?;
        let active_only = req
            .params
            .get("activeOnly")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let mut stmt = conn.prepare(
            "SELECT id, school_id, first_name, last_name, active
             FROM students
             WHERE (?1 IS NULL OR school_id = ?1) AND (?2 = 0 OR active = 1)
             ORDER BY last_name, first_name",
        )?;
        let students = stmt
            .query_map((&school_id, active_only as i64), |r| {
                let id: String = r.get(0)?;
                let school_id: String = r.get(1)?;
                let first: String = r.get(2)?;
                let last: String = r.get(3)?;
                let active: i64 = r.get(4)?;
                Ok(json!({
                    "id": id,
                    "schoolId": school_id,
                    "firstName": first,
                    "lastName": last,
                    "displayName": format!("{} {}", first, last),
                    "active": active != 0
                }))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(json!({ "students": students }))
    });
    respond(req, result)
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let student_id = required_str(&req.params, "studentId")?;
        let first_name = optional_str(&req.params, "firstName")?;
        let last_name = optional_str(&req.params, "lastName")?;
        let active = match req.params.get("active") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(
                v.as_bool()
                    .ok_or_else(|| GradebookError::bad_params("active must be boolean"))?,
            ),
        };
        require_student(conn, &student_id)?;

        conn.execute(
            "UPDATE students
             SET first_name = COALESCE(?, first_name),
                 last_name = COALESCE(?, last_name),
                 active = COALESCE(?, active)
             WHERE id = ?",
            (
                &first_name,
                &last_name,
                active.map(|a| a as i64),
                &student_id,
            ),
        )?;
        Ok(json!({ "ok": true }))
    });
    respond(req, result)
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let student_id = required_str(&req.params, "studentId")?;
        require_student(conn, &student_id)?;

        // Delete dependents explicitly; there is no ON DELETE CASCADE.
        let tx = conn.unchecked_transaction()?;
        for sql in [
            "DELETE FROM attendance_records WHERE student_id = ?",
            "DELETE FROM marksheets WHERE student_id = ?",
            "DELETE FROM report_cards WHERE student_id = ?",
            "DELETE FROM sponsorships WHERE student_id = ?",
            "DELETE FROM students WHERE id = ?",
        ] {
            tx.execute(sql, [&student_id])?;
        }
        tx.commit()?;
        tracing::info!(student = %student_id, "student deleted");
        Ok(json!({ "ok": true }))
    });
    respond(req, result)
}

fn handle_sponsors_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let name = required_str(&req.params, "name")?;
        let school_id = optional_str(&req.params, "schoolId")?;
        let email = optional_str(&req.params, "email")?;
        if let Some(sid) = school_id.as_deref() {
            require_school(conn, sid)?;
        }
        let sponsor_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO sponsors(id, school_id, name, email) VALUES(?, ?, ?, ?)",
            (&sponsor_id, &school_id, &name, &email),
        )?;
        Ok(json!({ "sponsorId": sponsor_id, "name": name }))
    });
    respond(req, result)
}

fn handle_sponsors_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let school_id = optional_str(&req.params, "schoolId")?;
        let mut stmt = conn.prepare(
            "SELECT sp.id, sp.school_id, sp.name, sp.email,
                    (SELECT COUNT(*) FROM sponsorships x WHERE x.sponsor_id = sp.id)
             FROM sponsors sp
             WHERE (?1 IS NULL OR sp.school_id = ?1)
             ORDER BY sp.name",
        )?;
        let sponsors = stmt
            .query_map([&school_id], |r| {
                let id: String = r.get(0)?;
                let school_id: Option<String> = r.get(1)?;
                let name: String = r.get(2)?;
                let email: Option<String> = r.get(3)?;
                let student_count: i64 = r.get(4)?;
                Ok(json!({
                    "id": id,
                    "schoolId": school_id,
                    "name": name,
                    "email": email,
                    "studentCount": student_count
                }))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(json!({ "sponsors": sponsors }))
    });
    respond(req, result)
}

fn handle_sponsors_link(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let sponsor_id = required_str(&req.params, "sponsorId")?;
        let student_id = required_str(&req.params, "studentId")?;
        require_student(conn, &student_id)?;
        let hit: Option<i64> = conn
            .query_row("SELECT 1 FROM sponsors WHERE id = ?", [&sponsor_id], |r| r.get(0))
            .optional()?;
        if hit.is_none() {
            return Err(GradebookError::not_found("sponsor not found"));
        }
        conn.execute(
            "INSERT OR IGNORE INTO sponsorships(sponsor_id, student_id) VALUES(?, ?)",
            (&sponsor_id, &student_id),
        )?;
        Ok(json!({ "ok": true }))
    });
    respond(req, result)
}

fn handle_sponsors_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let sponsor_id = required_str(&req.params, "sponsorId")?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM sponsorships WHERE sponsor_id = ?", [&sponsor_id])?;
        let n = tx.execute("DELETE FROM sponsors WHERE id = ?", [&sponsor_id])?;
        if n == 0 {
            return Err(GradebookError::not_found("sponsor not found"));
        }
        tx.commit()?;
        Ok(json!({ "ok": true }))
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "sponsors.create" => Some(handle_sponsors_create(state, req)),
        "sponsors.list" => Some(handle_sponsors_list(state, req)),
        "sponsors.link" => Some(handle_sponsors_link(state, req)),
        "sponsors.delete" => Some(handle_sponsors_delete(state, req)),
        _ => None,
    }
}
