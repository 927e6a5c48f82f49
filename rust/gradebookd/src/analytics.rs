use crate::error::{GradebookError, Result};
use crate::grading::{compare_grade_labels, percent_of, round2};
use crate::records::AttendanceStatus;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyticsFilters {
    pub student_id: Option<String>,
    pub school_id: Option<String>,
    pub academic_year_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticsLimits {
    pub top_performers: i64,
    pub top_subjects: i64,
    pub active_window_days: i64,
    pub trend_months: u32,
    pub attendance_trend_days: i64,
}

impl Default for AnalyticsLimits {
    fn default() -> Self {
        Self {
            top_performers: 10,
            top_subjects: 10,
            active_window_days: 30,
            trend_months: 6,
            attendance_trend_days: 30,
        }
    }
}

fn parse_optional_id(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
        Some(_) => Err(GradebookError::bad_params(format!(
            "filters.{} must be a string or null",
            key
        ))),
    }
}

/// `YYYY-MM-DD`, or a complete timestamp whose own calendar date is taken.
pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Ok(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, crate::db::TIMESTAMP_FORMAT) {
        return Ok(dt.date());
    }
    Err(GradebookError::bad_params(format!(
        "{} must be an ISO date (YYYY-MM-DD)",
        key
    )))
}

fn parse_optional_date(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<NaiveDate>> {
    match obj.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => {
            parse_date(s, &format!("filters.{}", key)).map(Some)
        }
        Some(_) => Err(GradebookError::bad_params(format!(
            "filters.{} must be a string or null",
            key
        ))),
    }
}

pub fn parse_filters(raw: Option<&serde_json::Value>) -> Result<AnalyticsFilters> {
    let Some(raw) = raw else {
        return Ok(AnalyticsFilters::default());
    };
    if raw.is_null() {
        return Ok(AnalyticsFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(GradebookError::bad_params("filters must be an object"));
    };
    let filters = AnalyticsFilters {
        student_id: parse_optional_id(obj, "studentId")?,
        school_id: parse_optional_id(obj, "schoolId")?,
        academic_year_id: parse_optional_id(obj, "academicYearId")?,
        start_date: parse_optional_date(obj, "startDate")?,
        end_date: parse_optional_date(obj, "endDate")?,
    };
    if let (Some(start), Some(end)) = (filters.start_date, filters.end_date) {
        if start > end {
            return Err(GradebookError::validation(
                "filters.startDate must be <= filters.endDate",
            ));
        }
    }
    Ok(filters)
}

/// WHERE-clause accumulator; clauses are ANDed in insertion order.
#[derive(Debug, Clone, Default)]
struct Predicates {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Predicates {
    fn push(&mut self, clause: impl Into<String>, value: Value) {
        self.clauses.push(clause.into());
        self.values.push(value);
    }

    fn push_opt(&mut self, clause: &str, value: Option<&String>) {
        if let Some(v) = value {
            self.push(clause, Value::Text(v.clone()));
        }
    }

    fn push_date_range(&mut self, column: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) {
        if let Some(d) = start {
            self.push(format!("{} >= ?", column), date_value(d));
        }
        if let Some(d) = end {
            self.push(format!("{} <= ?", column), date_value(d));
        }
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn values_with(&self, extra: Value) -> Vec<Value> {
        let mut out = self.values.clone();
        out.push(extra);
        out
    }
}

fn date_value(d: NaiveDate) -> Value {
    Value::Text(d.format(DATE_FORMAT).to_string())
}

fn student_scope(filters: &AnalyticsFilters) -> Predicates {
    let mut p = Predicates::default();
    p.push_opt("s.id = ?", filters.student_id.as_ref());
    p.push_opt("s.school_id = ?", filters.school_id.as_ref());
    p
}

fn marksheet_scope(filters: &AnalyticsFilters) -> Predicates {
    let mut p = student_scope(filters);
    p.push_opt("m.academic_year_id = ?", filters.academic_year_id.as_ref());
    p
}

fn report_card_scope(filters: &AnalyticsFilters) -> Predicates {
    let mut p = student_scope(filters);
    p.push_opt("r.academic_year_id = ?", filters.academic_year_id.as_ref());
    p.push_date_range("date(r.generated_at)", filters.start_date, filters.end_date);
    p
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    pub excused: i64,
    pub total: i64,
}

impl AttendanceCounts {
    fn add(&mut self, status: &str, n: i64) {
        match AttendanceStatus::parse(status) {
            Some(AttendanceStatus::Present) => self.present += n,
            Some(AttendanceStatus::Absent) => self.absent += n,
            Some(AttendanceStatus::Late) => self.late += n,
            Some(AttendanceStatus::Excused) => self.excused += n,
            None => {}
        }
        self.total += n;
    }

    pub fn attendance_rate(&self) -> f64 {
        percent_of(self.present as f64, self.total as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceBreakdown {
    #[serde(flatten)]
    pub counts: AttendanceCounts,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceOverview {
    pub total_students: i64,
    pub total_subjects: i64,
    pub average_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCount {
    pub grade: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub student_id: String,
    pub student_name: String,
    pub academic_year_id: String,
    pub percentage: f64,
    pub final_grade: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub subject_name: String,
    pub average_marks: f64,
    pub average_max_marks: f64,
    pub average_percentage: f64,
    pub record_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformanceSummary {
    pub overview: PerformanceOverview,
    pub attendance: AttendanceBreakdown,
    pub grade_distribution: Vec<GradeCount>,
    pub top_performers: Vec<TopPerformer>,
    pub subject_performance: Vec<SubjectPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_students: i64,
    pub active_students: i64,
    pub total_sponsors: i64,
    pub average_percentage: f64,
    pub total_report_cards: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeShare {
    pub grade: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPerformance {
    pub month: String,
    pub average_percentage: f64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAttendance {
    pub date: String,
    pub total: i64,
    pub present: i64,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPopularity {
    pub subject_id: String,
    pub subject_name: String,
    pub mark_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolDashboardSummary {
    pub overview: DashboardOverview,
    pub attendance_today: AttendanceCounts,
    pub grade_distribution: Vec<GradeShare>,
    pub performance_trend: Vec<MonthlyPerformance>,
    pub attendance_trend: Vec<DailyAttendance>,
    pub top_subjects: Vec<SubjectPopularity>,
}

fn count_students(conn: &Connection, preds: &Predicates) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM students s {}", preds.where_sql());
    Ok(conn.query_row(&sql, params_from_iter(preds.values.iter()), |r| r.get(0))?)
}

fn attendance_counts(conn: &Connection, preds: &Predicates) -> Result<AttendanceCounts> {
    let sql = format!(
        "SELECT a.status, COUNT(*)
         FROM attendance_records a
         JOIN students s ON s.id = a.student_id
         {}
         GROUP BY a.status",
        preds.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(preds.values.iter()), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut counts = AttendanceCounts::default();
    for (status, n) in rows {
        counts.add(&status, n);
    }
    Ok(counts)
}

fn grade_counts(conn: &Connection, preds: &Predicates) -> Result<Vec<GradeCount>> {
    let sql = format!(
        "SELECT r.final_grade, COUNT(*)
         FROM report_cards r
         JOIN students s ON s.id = r.student_id
         {}
         GROUP BY r.final_grade",
        preds.where_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(params_from_iter(preds.values.iter()), |r| {
            Ok(GradeCount {
                grade: r.get(0)?,
                count: r.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.sort_by(|a, b| compare_grade_labels(&a.grade, &b.grade));
    Ok(rows)
}

pub fn student_performance(
    conn: &Connection,
    filters: &AnalyticsFilters,
    limits: &AnalyticsLimits,
) -> Result<StudentPerformanceSummary> {
    let tx = conn.unchecked_transaction()?;

    let total_students = count_students(&tx, &student_scope(filters))?;

    let marks = marksheet_scope(filters);
    let (total_subjects, sum_obtained, sum_max): (i64, f64, f64) = tx.query_row(
        &format!(
            "SELECT COUNT(DISTINCT m.subject_id),
                    COALESCE(SUM(m.marks_obtained), 0.0),
                    COALESCE(SUM(m.max_marks), 0.0)
             FROM marksheets m
             JOIN students s ON s.id = m.student_id
             {}",
            marks.where_sql()
        ),
        params_from_iter(marks.values.iter()),
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;

    let mut attendance_preds = student_scope(filters);
    attendance_preds.push_date_range("a.date", filters.start_date, filters.end_date);
    let attendance = attendance_counts(&tx, &attendance_preds)?;

    let cards = report_card_scope(filters);
    let grade_distribution = grade_counts(&tx, &cards)?;

    let mut stmt = tx.prepare(&format!(
        "SELECT r.student_id, s.first_name, s.last_name, r.academic_year_id, r.percentage, r.final_grade
         FROM report_cards r
         JOIN students s ON s.id = r.student_id
         {}
         ORDER BY r.percentage DESC, s.last_name, s.first_name
         LIMIT ?",
        cards.where_sql()
    ))?;
    let top_performers = stmt
        .query_map(
            params_from_iter(cards.values_with(Value::Integer(limits.top_performers))),
            |r| {
                let first: String = r.get(1)?;
                let last: String = r.get(2)?;
                Ok(TopPerformer {
                    student_id: r.get(0)?,
                    student_name: format!("{} {}", first, last),
                    academic_year_id: r.get(3)?,
                    percentage: r.get(4)?,
                    final_grade: r.get(5)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    let mut stmt = tx.prepare(&format!(
        "SELECT sub.name, AVG(m.marks_obtained), AVG(m.max_marks), COUNT(*)
         FROM marksheets m
         JOIN students s ON s.id = m.student_id
         JOIN subjects sub ON sub.id = m.subject_id
         {}
         GROUP BY sub.name
         ORDER BY sub.name",
        marks.where_sql()
    ))?;
    let subject_performance = stmt
        .query_map(params_from_iter(marks.values.iter()), |r| {
            let avg_marks: f64 = r.get(1)?;
            let avg_max: f64 = r.get(2)?;
            Ok(SubjectPerformance {
                subject_name: r.get(0)?,
                average_marks: round2(avg_marks),
                average_max_marks: round2(avg_max),
                average_percentage: percent_of(avg_marks, avg_max),
                record_count: r.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    tx.commit()?;

    Ok(StudentPerformanceSummary {
        overview: PerformanceOverview {
            total_students,
            total_subjects,
            average_percentage: percent_of(sum_obtained, sum_max),
        },
        attendance: AttendanceBreakdown {
            attendance_rate: attendance.attendance_rate(),
            counts: attendance,
        },
        grade_distribution,
        top_performers,
        subject_performance,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashboardWindows {
    pub today: NaiveDate,
    pub active_since: NaiveDate,
    pub attendance_since: NaiveDate,
    pub trend_since: NaiveDate,
}

impl DashboardWindows {
    /// A window of N days covers N dates, the end date included.
    pub fn resolve(filters: &AnalyticsFilters, now: NaiveDateTime, limits: &AnalyticsLimits) -> Self {
        let today = filters.end_date.unwrap_or_else(|| now.date());
        let trailing = |days: i64| today - Duration::days((days - 1).max(0));
        let month_start = today.with_day(1).unwrap_or(today);
        let trend_default = month_start
            .checked_sub_months(Months::new(limits.trend_months.saturating_sub(1)))
            .unwrap_or(month_start);
        Self {
            today,
            active_since: filters
                .start_date
                .unwrap_or_else(|| trailing(limits.active_window_days)),
            attendance_since: filters
                .start_date
                .unwrap_or_else(|| trailing(limits.attendance_trend_days)),
            trend_since: filters.start_date.unwrap_or(trend_default),
        }
    }
}

pub fn school_dashboard(
    conn: &Connection,
    filters: &AnalyticsFilters,
    now: NaiveDateTime,
    limits: &AnalyticsLimits,
) -> Result<SchoolDashboardSummary> {
    let windows = DashboardWindows::resolve(filters, now, limits);
    let tx = conn.unchecked_transaction()?;

    let students = student_scope(filters);
    let total_students = count_students(&tx, &students)?;

    let mut active = student_scope(filters);
    active.push_date_range("a.date", Some(windows.active_since), Some(windows.today));
    let active_students: i64 = tx.query_row(
        &format!(
            "SELECT COUNT(DISTINCT a.student_id)
             FROM attendance_records a
             JOIN students s ON s.id = a.student_id
             {}",
            active.where_sql()
        ),
        params_from_iter(active.values.iter()),
        |r| r.get(0),
    )?;

    let mut sponsors = Predicates::default();
    sponsors.push_opt("school_id = ?", filters.school_id.as_ref());
    let total_sponsors: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM sponsors {}", sponsors.where_sql()),
        params_from_iter(sponsors.values.iter()),
        |r| r.get(0),
    )?;

    let cards = report_card_scope(filters);
    let (total_report_cards, avg_percentage): (i64, Option<f64>) = tx.query_row(
        &format!(
            "SELECT COUNT(*), AVG(r.percentage)
             FROM report_cards r
             JOIN students s ON s.id = r.student_id
             {}",
            cards.where_sql()
        ),
        params_from_iter(cards.values.iter()),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let mut today = student_scope(filters);
    today.push("a.date = ?", date_value(windows.today));
    let attendance_today = attendance_counts(&tx, &today)?;

    let grade_distribution = grade_counts(&tx, &cards)?
        .into_iter()
        .map(|g| GradeShare {
            percentage: percent_of(g.count as f64, total_report_cards as f64),
            grade: g.grade,
            count: g.count,
        })
        .collect();

    let mut trend = student_scope(filters);
    trend.push_opt("r.academic_year_id = ?", filters.academic_year_id.as_ref());
    trend.push_date_range(
        "date(r.generated_at)",
        Some(windows.trend_since),
        Some(windows.today),
    );
    let mut stmt = tx.prepare(&format!(
        "SELECT strftime('%Y-%m', r.generated_at) AS month, AVG(r.percentage), COUNT(*)
         FROM report_cards r
         JOIN students s ON s.id = r.student_id
         {}
         GROUP BY month
         ORDER BY month",
        trend.where_sql()
    ))?;
    let performance_trend = stmt
        .query_map(params_from_iter(trend.values.iter()), |r| {
            Ok(MonthlyPerformance {
                month: r.get(0)?,
                average_percentage: round2(r.get::<_, f64>(1)?),
                count: r.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    let mut daily = student_scope(filters);
    daily.push_date_range("a.date", Some(windows.attendance_since), Some(windows.today));
    let mut stmt = tx.prepare(&format!(
        "SELECT a.date, COUNT(*), SUM(CASE WHEN a.status = 'present' THEN 1 ELSE 0 END)
         FROM attendance_records a
         JOIN students s ON s.id = a.student_id
         {}
         GROUP BY a.date
         ORDER BY a.date",
        daily.where_sql()
    ))?;
    let attendance_trend = stmt
        .query_map(params_from_iter(daily.values.iter()), |r| {
            let total: i64 = r.get(1)?;
            let present: i64 = r.get(2)?;
            Ok(DailyAttendance {
                date: r.get(0)?,
                total,
                present,
                attendance_rate: percent_of(present as f64, total as f64),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    let marks = marksheet_scope(filters);
    let mut stmt = tx.prepare(&format!(
        "SELECT sub.id, sub.name, COUNT(DISTINCT m.id) AS mark_count
         FROM subjects sub
         JOIN marksheets m ON m.subject_id = sub.id
         JOIN students s ON s.id = m.student_id
         {}
         GROUP BY sub.id, sub.name
         ORDER BY mark_count DESC, sub.name
         LIMIT ?",
        marks.where_sql()
    ))?;
    let top_subjects = stmt
        .query_map(
            params_from_iter(marks.values_with(Value::Integer(limits.top_subjects))),
            |r| {
                Ok(SubjectPopularity {
                    subject_id: r.get(0)?,
                    subject_name: r.get(1)?,
                    mark_count: r.get(2)?,
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    tx.commit()?;

    Ok(SchoolDashboardSummary {
        overview: DashboardOverview {
            total_students,
            active_students,
            total_sponsors,
            average_percentage: avg_percentage.map(round2).unwrap_or(0.0),
            total_report_cards,
        },
        attendance_today,
        grade_distribution,
        performance_trend,
        attendance_trend,
        top_subjects,
    })
}
