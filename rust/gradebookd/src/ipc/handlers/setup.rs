use crate::analytics::AnalyticsLimits;
use crate::db;
use crate::error::{GradebookError, Result};
use crate::grading::DEFAULT_PASSING_THRESHOLD;
use crate::ipc::helpers::{db_conn, respond};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Analytics,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "analytics" => Some(Self::Analytics),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Analytics => "setup.analytics",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => json!({
            "defaultPassingThreshold": DEFAULT_PASSING_THRESHOLD
        }),
        SetupSection::Analytics => {
            let d = AnalyticsLimits::default();
            json!({
                "topPerformersLimit": d.top_performers,
                "topSubjectsLimit": d.top_subjects,
                "activeWindowDays": d.active_window_days,
                "trendMonths": d.trend_months,
                "attendanceTrendDays": d.attendance_trend_days
            })
        }
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> std::result::Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> std::result::Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> std::result::Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "defaultPassingThreshold" => {
                    obj.insert(k.clone(), Value::from(parse_f64_range(v, k, 0.0, 100.0)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Analytics => match k.as_str() {
                "topPerformersLimit" | "topSubjectsLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100)?));
                }
                "activeWindowDays" | "attendanceTrendDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 366)?));
                }
                "trendMonths" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 24)?));
                }
                _ => return Err(format!("unknown analytics field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

fn load(conn: &Connection, section: SetupSection) -> Result<Value> {
    load_section(conn, section).map_err(GradebookError::Settings)
}

pub fn default_passing_threshold(conn: &Connection) -> Result<f64> {
    let grading = load(conn, SetupSection::Grading)?;
    Ok(grading
        .get("defaultPassingThreshold")
        .and_then(|v| v.as_f64())
        .unwrap_or(DEFAULT_PASSING_THRESHOLD))
}

pub fn analytics_limits(conn: &Connection) -> Result<AnalyticsLimits> {
    let a = load(conn, SetupSection::Analytics)?;
    let d = AnalyticsLimits::default();
    let int = |key: &str, fallback: i64| a.get(key).and_then(|v| v.as_i64()).unwrap_or(fallback);
    Ok(AnalyticsLimits {
        top_performers: int("topPerformersLimit", d.top_performers),
        top_subjects: int("topSubjectsLimit", d.top_subjects),
        active_window_days: int("activeWindowDays", d.active_window_days),
        trend_months: u32::try_from(int("trendMonths", d.trend_months as i64))
            .unwrap_or(d.trend_months),
        attendance_trend_days: int("attendanceTrendDays", d.attendance_trend_days),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        Ok(json!({
            "grading": load(conn, SetupSection::Grading)?,
            "analytics": load(conn, SetupSection::Analytics)?,
        }))
    });
    respond(req, result)
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let section_raw = req
            .params
            .get("section")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GradebookError::bad_params("missing section"))?;
        let section = SetupSection::parse(section_raw)
            .ok_or_else(|| GradebookError::bad_params("unknown section"))?;
        let patch = req
            .params
            .get("patch")
            .and_then(|v| v.as_object())
            .ok_or_else(|| GradebookError::bad_params("patch must be an object"))?;

        let mut current = load(conn, section)?;
        merge_section_patch(section, &mut current, patch).map_err(GradebookError::BadParams)?;
        db::settings_set_json(conn, section.key(), &current)
            .map_err(GradebookError::Settings)?;
        tracing::info!(section = section_raw, "setup updated");
        Ok(json!({ "ok": true, "section": current }))
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
