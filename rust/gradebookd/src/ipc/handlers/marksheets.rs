use crate::error::GradebookError;
use crate::grading;
use crate::ipc::helpers::{
    db_conn, optional_f64, optional_i64, optional_str, parse_now, required_str, respond,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, MarksEntry, MarksheetStatus, ReportCardStatus};
use serde_json::json;

fn handle_marksheets_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let entry = MarksEntry {
            student_id: required_str(&req.params, "studentId")?,
            subject_id: required_str(&req.params, "subjectId")?,
            academic_year_id: required_str(&req.params, "academicYearId")?,
            term: optional_i64(&req.params, "term")?.unwrap_or(1),
            marks_obtained: optional_f64(&req.params, "marksObtained")?,
            max_marks: optional_f64(&req.params, "maxMarks")?,
        };
        let schemes = grading::load_schemes(conn)?;
        let sheet = records::upsert_marksheet(conn, &entry, &schemes)?;
        Ok(json!({ "marksheet": sheet }))
    });
    respond(req, result)
}

fn handle_marksheets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let student_id = optional_str(&req.params, "studentId")?;
        let year_id = optional_str(&req.params, "academicYearId")?;
        let sheets = records::list_marksheets(conn, student_id.as_deref(), year_id.as_deref())?;
        Ok(json!({ "marksheets": sheets }))
    });
    respond(req, result)
}

fn handle_marksheets_transition(
    state: &mut AppState,
    req: &Request,
    target: MarksheetStatus,
) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let id = required_str(&req.params, "marksheetId")?;
        let sheet = records::transition_marksheet(conn, &id, target)?;
        Ok(json!({ "marksheet": sheet }))
    });
    respond(req, result)
}

fn handle_marksheets_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let id = required_str(&req.params, "marksheetId")?;
        records::delete_marksheet(conn, &id)?;
        Ok(json!({ "ok": true }))
    });
    respond(req, result)
}

fn handle_report_cards_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let student_id = required_str(&req.params, "studentId")?;
        let year_id = required_str(&req.params, "academicYearId")?;
        let now = parse_now(&req.params)?;
        let schemes = grading::load_schemes(conn)?;
        let card = records::generate_report_card(conn, &student_id, &year_id, &schemes, now)?;
        Ok(json!({ "reportCard": card }))
    });
    respond(req, result)
}

fn handle_report_cards_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let student_id = optional_str(&req.params, "studentId")?;
        let year_id = optional_str(&req.params, "academicYearId")?;
        let cards =
            records::list_report_cards(conn, student_id.as_deref(), year_id.as_deref())?;
        Ok(json!({ "reportCards": cards }))
    });
    respond(req, result)
}

fn handle_report_cards_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let id = required_str(&req.params, "reportCardId")?;
        let raw = required_str(&req.params, "status")?;
        let target = ReportCardStatus::parse(&raw).ok_or_else(|| {
            GradebookError::bad_params("status must be one of: Generated, Signed, Distributed")
        })?;
        let card = records::set_report_card_status(conn, &id, target)?;
        Ok(json!({ "reportCard": card }))
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marksheets.upsert" => Some(handle_marksheets_upsert(state, req)),
        "marksheets.list" => Some(handle_marksheets_list(state, req)),
        "marksheets.approve" => Some(handle_marksheets_transition(
            state,
            req,
            MarksheetStatus::Approved,
        )),
        "marksheets.publish" => Some(handle_marksheets_transition(
            state,
            req,
            MarksheetStatus::Published,
        )),
        "marksheets.delete" => Some(handle_marksheets_delete(state, req)),
        "reportCards.generate" => Some(handle_report_cards_generate(state, req)),
        "reportCards.list" => Some(handle_report_cards_list(state, req)),
        "reportCards.setStatus" => Some(handle_report_cards_set_status(state, req)),
        _ => None,
    }
}
