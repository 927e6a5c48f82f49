use crate::error::GradebookError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn fail(id: &str, e: &GradebookError) -> serde_json::Value {
    match e {
        GradebookError::Db(_)
        | GradebookError::Io(_)
        | GradebookError::Encode(_)
        | GradebookError::Open(_)
        | GradebookError::Settings(_)
        | GradebookError::Backup(_) => {
            tracing::error!(request = %id, code = e.code(), error = %e, "request failed");
        }
        _ => {
            tracing::debug!(request = %id, code = e.code(), error = %e, "request rejected");
        }
    }
    err(id, e.code(), e.to_string(), None)
}
