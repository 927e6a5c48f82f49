use crate::analytics::{self, parse_filters};
use crate::error::Result;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{db_conn, parse_now, respond};
use crate::ipc::types::{AppState, Request};
use serde::Serialize;

fn to_value<T: Serialize>(summary: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(summary)?)
}

fn handle_student_performance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let filters = parse_filters(req.params.get("filters"))?;
        let limits = setup::analytics_limits(conn)?;
        let summary = analytics::student_performance(conn, &filters, &limits)?;
        to_value(&summary)
    });
    respond(req, result)
}

fn handle_school_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let filters = parse_filters(req.params.get("filters"))?;
        let now = parse_now(&req.params)?;
        let limits = setup::analytics_limits(conn)?;
        let summary = analytics::school_dashboard(conn, &filters, now, &limits)?;
        to_value(&summary)
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.student.performance" => Some(handle_student_performance(state, req)),
        "analytics.school.dashboard" => Some(handle_school_dashboard(state, req)),
        _ => None,
    }
}
