use crate::analytics::parse_date;
use crate::error::{GradebookError, Result};
use crate::ipc::error::{fail, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;

pub fn respond(req: &Request, result: Result<serde_json::Value>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => fail(&req.id, &e),
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection> {
    state.db.as_ref().ok_or(GradebookError::NoWorkspace)
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| GradebookError::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(GradebookError::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(GradebookError::bad_params(format!(
            "{} must be a string or null",
            key
        ))),
    }
}

pub fn optional_f64(params: &serde_json::Value, key: &str) -> Result<Option<f64>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| GradebookError::bad_params(format!("{} must be a number", key))),
    }
}

pub fn optional_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| GradebookError::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate> {
    parse_date(&required_str(params, key)?, key)
}

pub fn optional_date(params: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>> {
    match optional_str(params, key)? {
        Some(s) => parse_date(&s, key).map(Some),
        None => Ok(None),
    }
}

/// `params.now` when given, else the wall clock. An explicit offset is kept
/// as the caller's local time so "today" is the caller's calendar day.
pub fn parse_now(params: &serde_json::Value) -> Result<NaiveDateTime> {
    let Some(raw) = optional_str(params, "now")? else {
        return Ok(Utc::now().naive_utc());
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(&raw, crate::db::TIMESTAMP_FORMAT).map_err(|_| {
        GradebookError::bad_params("now must be RFC 3339 or YYYY-MM-DD HH:MM:SS")
    })
}
