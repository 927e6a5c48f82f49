use crate::error::{GradebookError, Result};
use crate::grading::{self, SchemeInput};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{db_conn, optional_f64, optional_str, required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn scheme_input(params: &serde_json::Value) -> Result<SchemeInput> {
    Ok(SchemeInput {
        grade_label: optional_str(params, "gradeLabel")?,
        min_value: optional_f64(params, "minValue")?,
        max_value: optional_f64(params, "maxValue")?,
        passing_threshold: optional_f64(params, "passingThreshold")?,
    })
}

fn handle_schemes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let schemes = grading::load_schemes(conn)?;
        Ok(json!({ "schemes": schemes }))
    });
    respond(req, result)
}

fn handle_schemes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let input = scheme_input(&req.params)?;
        let threshold = setup::default_passing_threshold(conn)?;
        let scheme = grading::insert_scheme(conn, &input, threshold)?;
        Ok(json!({ "scheme": scheme }))
    });
    respond(req, result)
}

fn handle_schemes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let scheme_id = required_str(&req.params, "schemeId")?;
        let patch = req
            .params
            .get("patch")
            .filter(|v| v.is_object())
            .ok_or_else(|| GradebookError::bad_params("patch must be an object"))?;
        let scheme = grading::update_scheme(conn, &scheme_id, &scheme_input(patch)?)?;
        Ok(json!({ "scheme": scheme }))
    });
    respond(req, result)
}

fn handle_schemes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let scheme_id = required_str(&req.params, "schemeId")?;
        grading::delete_scheme(conn, &scheme_id)?;
        Ok(json!({ "ok": true }))
    });
    respond(req, result)
}

fn handle_schemes_seed_defaults(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let threshold = match optional_f64(&req.params, "passingThreshold")? {
            Some(v) => v,
            None => setup::default_passing_threshold(conn)?,
        };
        let inserted = grading::seed_default_schemes(conn, threshold)?;
        Ok(json!({ "inserted": inserted }))
    });
    respond(req, result)
}

fn handle_schemes_classify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let value = optional_f64(&req.params, "value")?
            .ok_or_else(|| GradebookError::bad_params("missing value"))?;
        let schemes = grading::load_schemes(conn)?;
        let outcome = grading::classify(value, &schemes)?;
        Ok(json!({ "grade": outcome.grade, "passed": outcome.passed }))
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schemes.list" => Some(handle_schemes_list(state, req)),
        "schemes.create" => Some(handle_schemes_create(state, req)),
        "schemes.update" => Some(handle_schemes_update(state, req)),
        "schemes.delete" => Some(handle_schemes_delete(state, req)),
        "schemes.seedDefaults" => Some(handle_schemes_seed_defaults(state, req)),
        "schemes.classify" => Some(handle_schemes_classify(state, req)),
        _ => None,
    }
}
