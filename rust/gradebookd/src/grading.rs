use crate::db;
use crate::error::{GradebookError, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::cmp::Ordering;
use uuid::Uuid;

pub const DEFAULT_PASSING_THRESHOLD: f64 = 40.0;

pub const GRADE_SEVERITY_ORDER: [&str; 7] = ["A+", "A", "B+", "B", "C", "D", "F"];

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `0` when the denominator is not positive.
pub fn percent_of(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        round2(100.0 * numerator / denominator)
    } else {
        0.0
    }
}

pub fn grade_rank(label: &str) -> Option<usize> {
    GRADE_SEVERITY_ORDER.iter().position(|g| *g == label)
}

/// Known grades first in severity order, then unknown labels alphabetically.
pub fn compare_grade_labels(a: &str, b: &str) -> Ordering {
    match (grade_rank(a), grade_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingScheme {
    pub id: String,
    pub grade_label: String,
    pub min_value: f64,
    pub max_value: f64,
    pub passing_threshold: f64,
}

impl GradingScheme {
    pub fn contains(&self, value: f64) -> bool {
        self.min_value <= value && value <= self.max_value
    }

    fn range(&self) -> ValueRange {
        ValueRange {
            min: self.min_value,
            max: self.max_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeOutcome {
    pub grade: String,
    pub passed: bool,
}

/// Highest-minimum band containing `value` wins.
pub fn classify(value: f64, schemes: &[GradingScheme]) -> Result<GradeOutcome> {
    let mut ordered: Vec<&GradingScheme> = schemes.iter().collect();
    ordered.sort_by(|a, b| {
        b.min_value
            .partial_cmp(&a.min_value)
            .unwrap_or(Ordering::Equal)
    });
    ordered
        .into_iter()
        .find(|s| s.contains(value))
        .map(|s| GradeOutcome {
            grade: s.grade_label.clone(),
            passed: value >= s.passing_threshold,
        })
        .ok_or_else(|| GradebookError::not_found("No matching grade"))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    fn intersects(&self, other: &ValueRange) -> bool {
        self.min <= other.max && self.max >= other.min
    }
}

pub fn validate_bounds(min: Option<f64>, max: Option<f64>) -> Result<ValueRange> {
    let (Some(min), Some(max)) = (min, max) else {
        return Err(GradebookError::validation(
            "minValue and maxValue are required",
        ));
    };
    if !min.is_finite() || !max.is_finite() {
        return Err(GradebookError::validation(
            "minValue and maxValue must be finite numbers",
        ));
    }
    if min > max {
        return Err(GradebookError::validation(format!(
            "minValue ({}) must be <= maxValue ({})",
            min, max
        )));
    }
    Ok(ValueRange { min, max })
}

pub fn check_overlap(
    candidate: ValueRange,
    existing: &[GradingScheme],
    exclude_id: Option<&str>,
) -> Result<()> {
    let hit = existing
        .iter()
        .filter(|s| exclude_id != Some(s.id.as_str()))
        .find(|s| candidate.intersects(&s.range()));
    match hit {
        Some(s) => Err(GradebookError::validation(format!(
            "overlapping range: [{}, {}] intersects {} [{}, {}]",
            candidate.min, candidate.max, s.grade_label, s.min_value, s.max_value
        ))),
        None => Ok(()),
    }
}

fn validate_label(raw: &str) -> Result<String> {
    let label = raw.trim();
    if label.is_empty() {
        return Err(GradebookError::validation("gradeLabel must not be empty"));
    }
    if label.chars().count() > 16 {
        return Err(GradebookError::validation(
            "gradeLabel length must be <= 16",
        ));
    }
    Ok(label.to_string())
}

fn validate_threshold(v: f64) -> Result<f64> {
    if !v.is_finite() {
        return Err(GradebookError::validation(
            "passingThreshold must be a finite number",
        ));
    }
    Ok(v)
}

#[derive(Debug, Clone, Default)]
pub struct SchemeInput {
    pub grade_label: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub passing_threshold: Option<f64>,
}

fn scheme_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<GradingScheme> {
    Ok(GradingScheme {
        id: r.get(0)?,
        grade_label: r.get(1)?,
        min_value: r.get(2)?,
        max_value: r.get(3)?,
        passing_threshold: r.get(4)?,
    })
}

pub fn load_schemes(conn: &Connection) -> Result<Vec<GradingScheme>> {
    let mut stmt = conn.prepare(
        "SELECT id, grade_label, min_value, max_value, passing_threshold
         FROM grading_schemes
         ORDER BY min_value DESC, grade_label",
    )?;
    let rows = stmt
        .query_map([], scheme_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_scheme(conn: &Connection, id: &str) -> Result<GradingScheme> {
    conn.query_row(
        "SELECT id, grade_label, min_value, max_value, passing_threshold
         FROM grading_schemes WHERE id = ?",
        [id],
        scheme_from_row,
    )
    .optional()?
    .ok_or_else(|| GradebookError::not_found("grading scheme not found"))
}

pub fn insert_scheme(
    conn: &Connection,
    input: &SchemeInput,
    default_threshold: f64,
) -> Result<GradingScheme> {
    let label = validate_label(input.grade_label.as_deref().unwrap_or(""))?;
    let range = validate_bounds(input.min_value, input.max_value)?;
    let threshold = validate_threshold(input.passing_threshold.unwrap_or(default_threshold))?;

    let tx = conn.unchecked_transaction()?;
    let existing = load_schemes(&tx)?;
    check_overlap(range, &existing, None)?;

    let scheme = GradingScheme {
        id: Uuid::new_v4().to_string(),
        grade_label: label,
        min_value: range.min,
        max_value: range.max,
        passing_threshold: threshold,
    };
    let now = db::now_timestamp();
    tx.execute(
        "INSERT INTO grading_schemes(id, grade_label, min_value, max_value, passing_threshold, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &scheme.id,
            &scheme.grade_label,
            scheme.min_value,
            scheme.max_value,
            scheme.passing_threshold,
            &now,
            &now,
        ),
    )?;
    tx.commit()?;
    tracing::info!(grade = %scheme.grade_label, min = scheme.min_value, max = scheme.max_value, "grading scheme created");
    Ok(scheme)
}

/// Applies a partial update; unset fields keep their stored values.
pub fn update_scheme(conn: &Connection, id: &str, patch: &SchemeInput) -> Result<GradingScheme> {
    let tx = conn.unchecked_transaction()?;
    let current = get_scheme(&tx, id)?;

    let label = match patch.grade_label.as_deref() {
        Some(raw) => validate_label(raw)?,
        None => current.grade_label.clone(),
    };
    let range = validate_bounds(
        Some(patch.min_value.unwrap_or(current.min_value)),
        Some(patch.max_value.unwrap_or(current.max_value)),
    )?;
    let threshold =
        validate_threshold(patch.passing_threshold.unwrap_or(current.passing_threshold))?;

    let existing = load_schemes(&tx)?;
    check_overlap(range, &existing, Some(id))?;

    tx.execute(
        "UPDATE grading_schemes
         SET grade_label = ?, min_value = ?, max_value = ?, passing_threshold = ?, updated_at = ?
         WHERE id = ?",
        (
            &label,
            range.min,
            range.max,
            threshold,
            db::now_timestamp(),
            id,
        ),
    )?;
    tx.commit()?;

    Ok(GradingScheme {
        id: id.to_string(),
        grade_label: label,
        min_value: range.min,
        max_value: range.max,
        passing_threshold: threshold,
    })
}

pub fn delete_scheme(conn: &Connection, id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM grading_schemes WHERE id = ?", [id])?;
    if n == 0 {
        return Err(GradebookError::not_found("grading scheme not found"));
    }
    Ok(())
}

pub fn default_bands() -> Vec<(&'static str, f64, f64)> {
    vec![
        ("A+", 90.0, 100.0),
        ("A", 80.0, 89.99),
        ("B+", 70.0, 79.99),
        ("B", 60.0, 69.99),
        ("C", 50.0, 59.99),
        ("D", 40.0, 49.99),
        ("F", 0.0, 39.99),
    ]
}

pub fn seed_default_schemes(conn: &Connection, passing_threshold: f64) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM grading_schemes", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(0);
    }
    let bands = default_bands();
    for (label, min, max) in &bands {
        insert_scheme(
            conn,
            &SchemeInput {
                grade_label: Some(label.to_string()),
                min_value: Some(*min),
                max_value: Some(*max),
                passing_threshold: Some(passing_threshold),
            },
            passing_threshold,
        )?;
    }
    Ok(bands.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(id: &str, label: &str, min: f64, max: f64) -> GradingScheme {
        GradingScheme {
            id: id.to_string(),
            grade_label: label.to_string(),
            min_value: min,
            max_value: max,
            passing_threshold: DEFAULT_PASSING_THRESHOLD,
        }
    }

    fn sample_bands() -> Vec<GradingScheme> {
        vec![
            band("a", "A+", 90.0, 100.0),
            band("b", "A", 80.0, 89.0),
            band("c", "B", 70.0, 79.0),
        ]
    }

    #[test]
    fn classify_sample_scenario() {
        let schemes = sample_bands();
        assert_eq!(
            classify(92.0, &schemes).expect("92"),
            GradeOutcome {
                grade: "A+".into(),
                passed: true
            }
        );
        assert_eq!(classify(85.0, &schemes).expect("85").grade, "A");
        let e = classify(55.0, &schemes).expect_err("55 is uncovered");
        assert_eq!(e.code(), "not_found");
        assert_eq!(e.to_string(), "No matching grade");
    }

    #[test]
    fn classify_bounds_are_inclusive() {
        let schemes = sample_bands();
        assert_eq!(classify(90.0, &schemes).expect("90").grade, "A+");
        assert_eq!(classify(100.0, &schemes).expect("100").grade, "A+");
        assert_eq!(classify(70.0, &schemes).expect("70").grade, "B");
        assert_eq!(classify(79.0, &schemes).expect("79").grade, "B");
    }

    #[test]
    fn classify_outside_every_band_is_not_found() {
        let schemes = sample_bands();
        for v in [-1.0, 69.99, 100.01, f64::NAN] {
            assert!(classify(v, &schemes).is_err(), "value {} should miss", v);
        }
        assert!(classify(50.0, &[]).is_err());
    }

    #[test]
    fn passed_follows_band_threshold() {
        let mut schemes = vec![band("d", "D", 30.0, 49.0)];
        schemes[0].passing_threshold = 40.0;
        assert!(!classify(39.5, &schemes).expect("39.5").passed);
        assert!(classify(40.0, &schemes).expect("40").passed);
    }

    #[test]
    fn overlapping_bands_pick_highest_minimum() {
        let schemes = vec![band("x", "low", 0.0, 60.0), band("y", "high", 50.0, 100.0)];
        assert_eq!(classify(55.0, &schemes).expect("55").grade, "high");
        assert_eq!(classify(45.0, &schemes).expect("45").grade, "low");
    }

    #[test]
    fn overlap_check_rejects_intersection_and_accepts_disjoint() {
        let schemes = sample_bands();
        let hit = check_overlap(ValueRange { min: 85.0, max: 95.0 }, &schemes, None)
            .expect_err("intersects A and A+");
        assert_eq!(hit.code(), "validation_failed");
        assert!(hit.to_string().contains("overlapping range"));

        // Touching an endpoint counts as overlap because bounds are inclusive.
        assert!(check_overlap(ValueRange { min: 60.0, max: 70.0 }, &schemes, None).is_err());

        check_overlap(ValueRange { min: 60.0, max: 69.0 }, &schemes, None).expect("disjoint");
        check_overlap(ValueRange { min: 100.5, max: 110.0 }, &schemes, None).expect("above");
    }

    #[test]
    fn overlap_check_excludes_self_on_update() {
        let schemes = sample_bands();
        check_overlap(ValueRange { min: 80.0, max: 89.0 }, &schemes, Some("b"))
            .expect("unchanged bounds are not a self-overlap");
        assert!(check_overlap(ValueRange { min: 80.0, max: 90.0 }, &schemes, Some("b")).is_err());
    }

    #[test]
    fn bounds_validation() {
        assert!(validate_bounds(None, Some(10.0)).is_err());
        assert!(validate_bounds(Some(10.0), None).is_err());
        assert!(validate_bounds(Some(20.0), Some(10.0)).is_err());
        assert!(validate_bounds(Some(f64::INFINITY), Some(10.0)).is_err());
        let r = validate_bounds(Some(10.0), Some(10.0)).expect("single point");
        assert_eq!(r, ValueRange { min: 10.0, max: 10.0 });
    }

    #[test]
    fn persisted_schemes_enforce_overlap() {
        let conn = db::open_memory();
        let a = insert_scheme(
            &conn,
            &SchemeInput {
                grade_label: Some("A".into()),
                min_value: Some(80.0),
                max_value: Some(100.0),
                passing_threshold: None,
            },
            DEFAULT_PASSING_THRESHOLD,
        )
        .expect("insert A");
        assert_eq!(a.passing_threshold, DEFAULT_PASSING_THRESHOLD);

        let clash = insert_scheme(
            &conn,
            &SchemeInput {
                grade_label: Some("B".into()),
                min_value: Some(70.0),
                max_value: Some(80.0),
                passing_threshold: None,
            },
            DEFAULT_PASSING_THRESHOLD,
        );
        assert_eq!(clash.expect_err("overlap").code(), "validation_failed");

        let renamed = update_scheme(
            &conn,
            &a.id,
            &SchemeInput {
                grade_label: Some("A+".into()),
                ..SchemeInput::default()
            },
        )
        .expect("self update");
        assert_eq!(renamed.min_value, 80.0);
        assert_eq!(load_schemes(&conn).expect("load")[0].grade_label, "A+");

        delete_scheme(&conn, &a.id).expect("delete");
        assert_eq!(delete_scheme(&conn, &a.id).expect_err("gone").code(), "not_found");
    }

    #[test]
    fn default_bands_are_disjoint_and_seed_once() {
        let conn = db::open_memory();
        assert_eq!(seed_default_schemes(&conn, 40.0).expect("seed"), 7);
        assert_eq!(seed_default_schemes(&conn, 40.0).expect("reseed"), 0);
        let schemes = load_schemes(&conn).expect("load");
        assert_eq!(classify(89.99, &schemes).expect("89.99").grade, "A");
        let f = classify(12.5, &schemes).expect("12.5");
        assert_eq!(f.grade, "F");
        assert!(!f.passed);
    }

    #[test]
    fn grade_labels_sort_by_severity() {
        let mut labels = vec!["F", "Z", "A", "B+", "A+", "E"];
        labels.sort_by(|a, b| compare_grade_labels(a, b));
        assert_eq!(labels, vec!["A+", "A", "B+", "F", "E", "Z"]);
    }

    #[test]
    fn percent_guards_zero_denominator() {
        assert_eq!(percent_of(5.0, 0.0), 0.0);
        assert_eq!(percent_of(7.0, 10.0), 70.0);
        assert_eq!(percent_of(1.0, 3.0), 33.33);
    }
}
