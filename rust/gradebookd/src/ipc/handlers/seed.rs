use crate::error::GradebookError;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{db_conn, optional_i64, parse_now, respond};
use crate::ipc::types::{AppState, Request};
use crate::seed::{self, SeedOptions};

fn handle_dev_seed(state: &mut AppState, req: &Request) -> serde_json::Value {
    let result = db_conn(state).and_then(|conn| {
        let mut opts = SeedOptions::new(parse_now(&req.params)?);
        if let Some(v) = optional_i64(&req.params, "seed")? {
            opts.seed = u64::try_from(v)
                .map_err(|_| GradebookError::bad_params("seed must be non-negative"))?;
        }
        if let Some(v) = optional_i64(&req.params, "students")? {
            opts.students = usize::try_from(v)
                .map_err(|_| GradebookError::bad_params("students must be non-negative"))?;
        }
        if let Some(v) = optional_i64(&req.params, "days")? {
            opts.days = v;
        }
        let threshold = setup::default_passing_threshold(conn)?;
        let summary = seed::seed_workspace(conn, &opts, threshold)?;
        Ok(serde_json::to_value(summary)?)
    });
    respond(req, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dev.seed" => Some(handle_dev_seed(state, req)),
        _ => None,
    }
}
