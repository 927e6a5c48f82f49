mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, str_field, temp_dir};

#[test]
fn marksheet_and_report_card_lifecycle() {
    let workspace = temp_dir("gradebook-marks-workflow");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school_id = str_field(
        &request_ok(&mut stdin, &mut reader, "2", "schools.create", json!({ "name": "Hillside" })),
        "schoolId",
    );
    let year_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "academicYears.create",
            json!({ "schoolId": school_id, "name": "2025/26" }),
        ),
        "academicYearId",
    );
    let student_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "students.create",
            json!({ "schoolId": school_id, "firstName": "Kwame", "lastName": "Mensah" }),
        ),
        "studentId",
    );
    let subject_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "subjects.create",
            json!({ "schoolId": school_id, "name": "Science" }),
        ),
        "subjectId",
    );
    let _ = request_ok(&mut stdin, &mut reader, "6", "schemes.seedDefaults", json!({}));

    let marks = |got: f64| {
        json!({
            "studentId": student_id,
            "subjectId": subject_id,
            "academicYearId": year_id,
            "term": 1,
            "marksObtained": got,
            "maxMarks": 80
        })
    };

    let too_many = request(&mut stdin, &mut reader, "7", "marksheets.upsert", marks(81.0));
    assert_eq!(error_code(&too_many), "validation_failed");

    let draft = request_ok(&mut stdin, &mut reader, "8", "marksheets.upsert", marks(52.0));
    let sheet = &draft["marksheet"];
    let sheet_id = str_field(sheet, "id");
    assert_eq!(sheet["percentage"], 65.0);
    assert_eq!(sheet["grade"], "B");
    assert_eq!(sheet["status"], "draft");

    // No report card from drafts.
    let early = request(
        &mut stdin,
        &mut reader,
        "9",
        "reportCards.generate",
        json!({ "studentId": student_id, "academicYearId": year_id }),
    );
    assert_eq!(error_code(&early), "validation_failed");

    let skip = request(&mut stdin, &mut reader, "10", "marksheets.publish", json!({ "marksheetId": sheet_id }));
    assert_eq!(error_code(&skip), "validation_failed");
    let _ = request_ok(&mut stdin, &mut reader, "11", "marksheets.approve", json!({ "marksheetId": sheet_id }));
    let locked = request(&mut stdin, &mut reader, "12", "marksheets.upsert", marks(60.0));
    assert_eq!(error_code(&locked), "validation_failed");
    let _ = request_ok(&mut stdin, &mut reader, "13", "marksheets.publish", json!({ "marksheetId": sheet_id }));
    let undeletable = request(&mut stdin, &mut reader, "14", "marksheets.delete", json!({ "marksheetId": sheet_id }));
    assert_eq!(error_code(&undeletable), "validation_failed");

    let card = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "reportCards.generate",
        json!({ "studentId": student_id, "academicYearId": year_id, "now": "2025-12-01 08:00:00" }),
    );
    let card = &card["reportCard"];
    let card_id = str_field(card, "id");
    assert_eq!(card["finalGrade"], "B");
    assert_eq!(card["percentage"], 65.0);
    assert_eq!(card["status"], "Generated");
    assert_eq!(card["generatedAt"], "2025-12-01 08:00:00");

    let signed = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "reportCards.setStatus",
        json!({ "reportCardId": card_id, "status": "Signed" }),
    );
    assert_eq!(signed["reportCard"]["status"], "Signed");
    let back = request(
        &mut stdin,
        &mut reader,
        "17",
        "reportCards.setStatus",
        json!({ "reportCardId": card_id, "status": "Generated" }),
    );
    assert_eq!(error_code(&back), "validation_failed");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "reportCards.list",
        json!({ "studentId": student_id }),
    );
    assert_eq!(listed["reportCards"].as_array().map(|a| a.len()), Some(1));
}

#[test]
fn deleting_a_student_removes_dependent_rows() {
    let workspace = temp_dir("gradebook-student-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let seeded = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "dev.seed",
        json!({ "seed": 5, "students": 5, "days": 3, "now": "2025-10-15T12:00:00Z" }),
    );
    assert_eq!(seeded["students"], 5);
    assert_eq!(seeded["sponsors"], 1);

    let students = request_ok(&mut stdin, &mut reader, "3", "students.list", json!({}));
    let victim = str_field(&students["students"][0], "id");

    let _ = request_ok(&mut stdin, &mut reader, "4", "students.delete", json!({ "studentId": victim }));
    let again = request(&mut stdin, &mut reader, "5", "students.delete", json!({ "studentId": victim }));
    assert_eq!(error_code(&again), "not_found");

    let sheets = request_ok(&mut stdin, &mut reader, "6", "marksheets.list", json!({ "studentId": victim }));
    assert_eq!(sheets["marksheets"], json!([]));
    let att = request_ok(&mut stdin, &mut reader, "7", "attendance.list", json!({ "studentId": victim }));
    assert_eq!(att["records"], json!([]));
    let sponsors = request_ok(&mut stdin, &mut reader, "8", "sponsors.list", json!({}));
    assert_eq!(sponsors["sponsors"][0]["studentCount"], 4);

    let remaining = request_ok(&mut stdin, &mut reader, "9", "students.list", json!({}));
    assert_eq!(remaining["students"].as_array().map(|a| a.len()), Some(4));
}

#[test]
fn sponsors_link_to_existing_students() {
    let workspace = temp_dir("gradebook-sponsors");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let school_id = str_field(
        &request_ok(&mut stdin, &mut reader, "2", "schools.create", json!({ "name": "Hillside" })),
        "schoolId",
    );
    let student_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "students.create",
            json!({ "schoolId": school_id, "firstName": "Nia", "lastName": "Diallo" }),
        ),
        "studentId",
    );
    let sponsor_id = str_field(
        &request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "sponsors.create",
            json!({ "schoolId": school_id, "name": "Harbour Trust", "email": "give@harbour.example" }),
        ),
        "sponsorId",
    );
    let ghost = request(
        &mut stdin,
        &mut reader,
        "5",
        "sponsors.link",
        json!({ "sponsorId": sponsor_id, "studentId": "nobody" }),
    );
    assert_eq!(error_code(&ghost), "not_found");
    for id in ["6", "7"] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "sponsors.link",
            json!({ "sponsorId": sponsor_id, "studentId": student_id }),
        );
    }
    let listed = request_ok(&mut stdin, &mut reader, "8", "sponsors.list", json!({ "schoolId": school_id }));
    assert_eq!(listed["sponsors"][0]["studentCount"], 1);

    let _ = request_ok(&mut stdin, &mut reader, "9", "sponsors.delete", json!({ "sponsorId": sponsor_id }));
    let listed = request_ok(&mut stdin, &mut reader, "10", "sponsors.list", json!({}));
    assert_eq!(listed["sponsors"], json!([]));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "students.update",
        json!({ "studentId": student_id, "active": false }),
    );
    let active = request_ok(&mut stdin, &mut reader, "12", "students.list", json!({ "activeOnly": true }));
    assert_eq!(active["students"], json!([]));
}
