//! Reproducible demo data for a fresh workspace.

use crate::db;
use crate::error::{GradebookError, Result};
use crate::grading::{self, percent_of};
use crate::records::{grade_for, AttendanceStatus, MarksheetStatus, ReportCardStatus};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rand::prelude::*;
use rand::rngs::StdRng;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

const FIRST_NAMES: [&str; 12] = [
    "Amara", "Kwame", "Lina", "Tomas", "Priya", "Yusuf", "Chen", "Sofia", "Ibrahim", "Nia",
    "Mateo", "Zara",
];
const LAST_NAMES: [&str; 10] = [
    "Okafor", "Mensah", "Haddad", "Novak", "Sharma", "Bello", "Wang", "Rossi", "Diallo", "Silva",
];
const SUBJECTS: [(&str, &str); 5] = [
    ("Mathematics", "MATH"),
    ("English", "ENG"),
    ("Science", "SCI"),
    ("History", "HIS"),
    ("Geography", "GEO"),
];
const MAX_MARKS: f64 = 100.0;

#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
    pub seed: u64,
    pub students: usize,
    pub days: i64,
    pub now: NaiveDateTime,
}

impl SeedOptions {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            seed: 42,
            students: 20,
            days: 30,
            now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub school_id: String,
    pub academic_year_id: String,
    pub schemes: usize,
    pub subjects: usize,
    pub students: usize,
    pub sponsors: usize,
    pub attendance_records: usize,
    pub marksheets: usize,
    pub report_cards: usize,
}

fn attendance_roll(rng: &mut StdRng) -> AttendanceStatus {
    match rng.gen_range(0..100) {
        0..=79 => AttendanceStatus::Present,
        80..=89 => AttendanceStatus::Absent,
        90..=95 => AttendanceStatus::Late,
        _ => AttendanceStatus::Excused,
    }
}

/// Academic years start on 1 September.
fn academic_year_for(today: NaiveDate) -> (String, NaiveDate, NaiveDate) {
    let start_year = if today.month() >= 9 {
        today.year()
    } else {
        today.year() - 1
    };
    let start = NaiveDate::from_ymd_opt(start_year, 9, 1).unwrap_or(today);
    let end = NaiveDate::from_ymd_opt(start_year + 1, 7, 31).unwrap_or(today);
    (
        format!("{}/{:02}", start_year, (start_year + 1) % 100),
        start,
        end,
    )
}

/// Default bands go in first if missing; everything else is one transaction.
pub fn seed_workspace(
    conn: &Connection,
    opts: &SeedOptions,
    passing_threshold: f64,
) -> Result<SeedSummary> {
    if !(1..=500).contains(&opts.students) {
        return Err(GradebookError::validation("students must be in 1..=500"));
    }
    if !(1..=366).contains(&opts.days) {
        return Err(GradebookError::validation("days must be in 1..=366"));
    }

    let schemes_inserted = grading::seed_default_schemes(conn, passing_threshold)?;
    let schemes = grading::load_schemes(conn)?;
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let today = opts.now.date();
    let stamp = db::format_timestamp(opts.now);

    let tx = conn.unchecked_transaction()?;

    let school_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO schools(id, name) VALUES(?, ?)",
        (&school_id, format!("Demo School {}", opts.seed)),
    )?;

    let (year_name, year_start, year_end) = academic_year_for(today);
    let academic_year_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO academic_years(id, school_id, name, start_date, end_date)
         VALUES(?, ?, ?, ?, ?)",
        (
            &academic_year_id,
            &school_id,
            &year_name,
            year_start.format("%Y-%m-%d").to_string(),
            year_end.format("%Y-%m-%d").to_string(),
        ),
    )?;

    let mut subject_ids = Vec::with_capacity(SUBJECTS.len());
    for (name, code) in SUBJECTS {
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO subjects(id, school_id, name, code) VALUES(?, ?, ?, ?)",
            (&id, &school_id, name, code),
        )?;
        subject_ids.push(id);
    }

    let mut student_ids = Vec::with_capacity(opts.students);
    for _ in 0..opts.students {
        let id = Uuid::new_v4().to_string();
        let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
        tx.execute(
            "INSERT INTO students(id, school_id, first_name, last_name, active, created_at)
             VALUES(?, ?, ?, ?, 1, ?)",
            (&id, &school_id, first, last, &stamp),
        )?;
        student_ids.push(id);
    }

    let mut sponsors = 0usize;
    for (n, group) in student_ids.chunks(5).enumerate() {
        let sponsor_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO sponsors(id, school_id, name, email) VALUES(?, ?, ?, ?)",
            (
                &sponsor_id,
                &school_id,
                format!("Sponsor {}", n + 1),
                format!("sponsor{}@example.org", n + 1),
            ),
        )?;
        for student_id in group {
            tx.execute(
                "INSERT INTO sponsorships(sponsor_id, student_id) VALUES(?, ?)",
                (&sponsor_id, student_id),
            )?;
        }
        sponsors += 1;
    }

    let mut attendance_records = 0usize;
    for student_id in &student_ids {
        for back in 0..opts.days {
            let day = today - Duration::days(back);
            let status = attendance_roll(&mut rng);
            tx.execute(
                "INSERT INTO attendance_records(id, student_id, date, status, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    student_id,
                    day.format("%Y-%m-%d").to_string(),
                    status.as_str(),
                    &stamp,
                ),
            )?;
            attendance_records += 1;
        }
    }

    let mut marksheets = 0usize;
    let mut report_cards = 0usize;
    for student_id in &student_ids {
        let mut obtained_sum = 0.0;
        let mut max_sum = 0.0;
        for subject_id in &subject_ids {
            let obtained = rng.gen_range(25..=100) as f64;
            let percentage = percent_of(obtained, MAX_MARKS);
            tx.execute(
                "INSERT INTO marksheets(id, student_id, subject_id, academic_year_id, term,
                    marks_obtained, max_marks, percentage, grade, status, created_at, updated_at)
                 VALUES(?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    student_id,
                    subject_id,
                    &academic_year_id,
                    obtained,
                    MAX_MARKS,
                    percentage,
                    grade_for(percentage, &schemes),
                    MarksheetStatus::Approved.as_str(),
                    &stamp,
                    &stamp,
                ),
            )?;
            obtained_sum += obtained;
            max_sum += MAX_MARKS;
            marksheets += 1;
        }

        let percentage = percent_of(obtained_sum, max_sum);
        let Ok(outcome) = grading::classify(percentage, &schemes) else {
            tracing::warn!(student = %student_id, percentage, "no band for seeded report card");
            continue;
        };
        let generated =
            db::format_timestamp(opts.now - Duration::days(rng.gen_range(0..opts.days)));
        tx.execute(
            "INSERT INTO report_cards(id, student_id, academic_year_id, final_grade, percentage,
                status, generated_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                student_id,
                &academic_year_id,
                &outcome.grade,
                percentage,
                ReportCardStatus::Generated.as_str(),
                &generated,
                &generated,
            ),
        )?;
        report_cards += 1;
    }

    tx.commit()?;

    let summary = SeedSummary {
        school_id,
        academic_year_id,
        schemes: schemes_inserted,
        subjects: subject_ids.len(),
        students: student_ids.len(),
        sponsors,
        attendance_records,
        marksheets,
        report_cards,
    };
    tracing::info!(
        seed = opts.seed,
        students = summary.students,
        marksheets = summary.marksheets,
        "workspace seeded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{self, AnalyticsFilters, AnalyticsLimits};

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-10-15 12:00:00", db::TIMESTAMP_FORMAT).expect("ts")
    }

    fn opts(seed: u64) -> SeedOptions {
        SeedOptions {
            seed,
            students: 12,
            days: 10,
            now: now(),
        }
    }

    fn marks(conn: &Connection) -> Vec<f64> {
        let mut stmt = conn
            .prepare(
                "SELECT m.marks_obtained FROM marksheets m
                 JOIN subjects sub ON sub.id = m.subject_id
                 JOIN students s ON s.id = m.student_id
                 ORDER BY s.created_at, s.rowid, sub.rowid",
            )
            .expect("prepare");
        stmt.query_map([], |r| r.get(0))
            .expect("query")
            .collect::<rusqlite::Result<Vec<f64>>>()
            .expect("collect")
    }

    #[test]
    fn seeding_fills_every_table() {
        let conn = db::open_memory();
        let summary = seed_workspace(&conn, &opts(7), 40.0).expect("seed");
        assert_eq!(summary.schemes, 7);
        assert_eq!(summary.subjects, 5);
        assert_eq!(summary.students, 12);
        assert_eq!(summary.sponsors, 3);
        assert_eq!(summary.attendance_records, 120);
        assert_eq!(summary.marksheets, 60);
        assert_eq!(summary.report_cards, 12);

        let dash = analytics::school_dashboard(
            &conn,
            &AnalyticsFilters::default(),
            now(),
            &AnalyticsLimits::default(),
        )
        .expect("dashboard");
        assert_eq!(dash.overview.total_students, 12);
        assert_eq!(dash.overview.active_students, 12);
        assert_eq!(dash.overview.total_sponsors, 3);
    }

    #[test]
    fn same_seed_gives_same_marks() {
        let a = db::open_memory();
        let b = db::open_memory();
        seed_workspace(&a, &opts(99), 40.0).expect("seed a");
        seed_workspace(&b, &opts(99), 40.0).expect("seed b");
        assert_eq!(marks(&a), marks(&b));
    }

    #[test]
    fn rejects_out_of_range_sizes() {
        let conn = db::open_memory();
        let mut o = opts(1);
        o.students = 0;
        assert_eq!(
            seed_workspace(&conn, &o, 40.0).expect_err("no students").code(),
            "validation_failed"
        );
    }

    #[test]
    fn academic_year_rolls_over_in_september() {
        let (name, start, _) =
            academic_year_for(NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"));
        assert_eq!(name, "2025/26");
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"));
    }
}
