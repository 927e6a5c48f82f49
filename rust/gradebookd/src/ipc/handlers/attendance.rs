use crate::error::GradebookError;
use crate::ipc::helpers::{db_conn, optional_date, required_date, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, AttendanceStatus};
use serde_json::json;

fn handle_attendance_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let student_id = required_str(&req.params, "studentId")?;
        let date = required_date(&req.params, "date")?;
        let raw_status = required_str(&req.params, "status")?;
        let status = AttendanceStatus::parse(&raw_status).ok_or_else(|| {
            GradebookError::bad_params("status must be one of: present, absent, late, excused")
        })?;
        let record = records::record_attendance(conn, &student_id, date, status)?;
        Ok(json!({ "record": record }))
    });
    respond(req, result)
}

fn handle_attendance_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let student_id = required_str(&req.params, "studentId")?;
        let start = optional_date(&req.params, "startDate")?;
        let end = optional_date(&req.params, "endDate")?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(GradebookError::validation("startDate must be <= endDate"));
            }
        }
        let records = records::list_attendance(conn, &student_id, start, end)?;
        Ok(json!({ "records": records }))
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(handle_attendance_record(state, req)),
        "attendance.list" => Some(handle_attendance_list(state, req)),
        _ => None,
    }
}
