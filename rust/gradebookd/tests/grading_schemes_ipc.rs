mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn classify_follows_configured_bands() {
    let workspace = temp_dir("gradebook-schemes-classify");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (i, (label, min, max)) in [("A+", 90.0, 100.0), ("A", 80.0, 89.0), ("B", 70.0, 79.0)]
        .into_iter()
        .enumerate()
    {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("c{}", i),
            "schemes.create",
            json!({ "gradeLabel": label, "minValue": min, "maxValue": max, "passingThreshold": 40 }),
        );
        assert_eq!(created["scheme"]["gradeLabel"], label);
    }

    let a_plus = request_ok(&mut stdin, &mut reader, "k1", "schemes.classify", json!({ "value": 92 }));
    assert_eq!(a_plus, json!({ "grade": "A+", "passed": true }));

    let a = request_ok(&mut stdin, &mut reader, "k2", "schemes.classify", json!({ "value": 85 }));
    assert_eq!(a["grade"], "A");

    let gap = request(&mut stdin, &mut reader, "k3", "schemes.classify", json!({ "value": 55 }));
    assert_eq!(error_code(&gap), "not_found");
    assert_eq!(gap["error"]["message"], "No matching grade");

    let listed = request_ok(&mut stdin, &mut reader, "l", "schemes.list", json!({}));
    let labels: Vec<&str> = listed["schemes"]
        .as_array()
        .expect("schemes")
        .iter()
        .filter_map(|s| s["gradeLabel"].as_str())
        .collect();
    assert_eq!(labels, vec!["A+", "A", "B"]);
}

#[test]
fn overlapping_bands_are_rejected_on_create_and_update() {
    let workspace = temp_dir("gradebook-schemes-overlap");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let b = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schemes.create",
        json!({ "gradeLabel": "B", "minValue": 60, "maxValue": 69.99 }),
    );
    let b_id = str_field(&b["scheme"], "id");
    // Threshold falls back to the workspace default.
    assert_eq!(b["scheme"]["passingThreshold"], 40.0);

    let a = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schemes.create",
        json!({ "gradeLabel": "A", "minValue": 70, "maxValue": 100 }),
    );
    let a_id = str_field(&a["scheme"], "id");

    let clash = request(
        &mut stdin,
        &mut reader,
        "4",
        "schemes.create",
        json!({ "gradeLabel": "X", "minValue": 65, "maxValue": 75 }),
    );
    assert_eq!(error_code(&clash), "validation_failed");

    let inverted = request(
        &mut stdin,
        &mut reader,
        "5",
        "schemes.create",
        json!({ "gradeLabel": "Y", "minValue": 30, "maxValue": 20 }),
    );
    assert_eq!(error_code(&inverted), "validation_failed");

    // Re-saving a band unchanged is not a self-overlap.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schemes.update",
        json!({ "schemeId": b_id, "patch": { "minValue": 60, "maxValue": 69.99 } }),
    );
    let grow = request(
        &mut stdin,
        &mut reader,
        "7",
        "schemes.update",
        json!({ "schemeId": b_id, "patch": { "maxValue": 72 } }),
    );
    assert_eq!(error_code(&grow), "validation_failed");

    let _ = request_ok(&mut stdin, &mut reader, "8", "schemes.delete", json!({ "schemeId": a_id }));
    let gone = request(&mut stdin, &mut reader, "9", "schemes.delete", json!({ "schemeId": a_id }));
    assert_eq!(error_code(&gone), "not_found");
}

#[test]
fn seed_defaults_only_fills_an_empty_collection() {
    let workspace = temp_dir("gradebook-schemes-seed");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "grading", "patch": { "defaultPassingThreshold": 50 } }),
    );
    let first = request_ok(&mut stdin, &mut reader, "3", "schemes.seedDefaults", json!({}));
    assert_eq!(first["inserted"], 7);
    let second = request_ok(&mut stdin, &mut reader, "4", "schemes.seedDefaults", json!({}));
    assert_eq!(second["inserted"], 0);

    let d = request_ok(&mut stdin, &mut reader, "5", "schemes.classify", json!({ "value": 45 }));
    assert_eq!(d, json!({ "grade": "D", "passed": false }));
}
