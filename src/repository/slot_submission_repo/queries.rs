use super::core::SlotSubmissionRepository;
use super::{DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT};
use crate::domain::submission::{CavityRecord, LineMoldAssignmentRecord, SubmittedSlotRecord};
use crate::domain::types::{ReportKind, Shift, TimeWindow};
use crate::repository::error::RepositoryResult;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, Result as SqliteResult, Row};

const SUBMISSION_COLUMNS: &str = r#"
    submission_id, report_kind, line_id, slot_id, tool_id, tool_name,
    production_date, time_window, start_time, end_time,
    cycle_time, cavity_values_json, cavity_details_json, average_value,
    is_changeover_point, previous_tool_name, changeover_at,
    notes, submitted_by, submitted_at
"#;

const ASSIGNMENT_COLUMNS: &str = r#"
    assignment_id, line_id, tool_id, tool_name, assignment_date,
    changeover_time, shift, first_window, previous_tool_name, is_active
"#;

impl SlotSubmissionRepository {
    // ==========================================
    // 提交记录查询
    // ==========================================

    /// 查询产线某生产日的全部提交记录
    ///
    /// # 返回
    /// 按规范时段顺序, 同一时段按提交时间升序
    pub fn find_by_line_and_day(
        &self,
        report_kind: ReportKind,
        line_id: &str,
        production_date: NaiveDate,
    ) -> RepositoryResult<Vec<SubmittedSlotRecord>> {
        let conn = self.get_conn()?;

        let sql = format!(
            r#"
            SELECT {}
            FROM slot_submission
            WHERE report_kind = ? AND line_id = ? AND production_date = ?
            ORDER BY window_index ASC, submitted_at ASC
            "#,
            SUBMISSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let records = stmt
            .query_map(
                params![
                    report_kind.to_db_str(),
                    line_id,
                    production_date.format(DATE_FORMAT).to_string()
                ],
                map_submission_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(records)
    }

    /// 按 submission_id 查询
    pub fn find_by_id(&self, submission_id: &str) -> RepositoryResult<Option<SubmittedSlotRecord>> {
        let conn = self.get_conn()?;

        let sql = format!(
            "SELECT {} FROM slot_submission WHERE submission_id = ?",
            SUBMISSION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        match stmt.query_row(params![submission_id], map_submission_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 统计产线某生产日的提交数
    pub fn count_by_line_and_day(
        &self,
        report_kind: ReportKind,
        line_id: &str,
        production_date: NaiveDate,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            r#"
            SELECT COUNT(*) FROM slot_submission
            WHERE report_kind = ? AND line_id = ? AND production_date = ?
            "#,
            params![
                report_kind.to_db_str(),
                line_id,
                production_date.format(DATE_FORMAT).to_string()
            ],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ==========================================
    // 上模记录查询
    // ==========================================

    /// 产线某生产日当前有效的上模记录
    pub fn find_active_assignment(
        &self,
        line_id: &str,
        assignment_date: NaiveDate,
    ) -> RepositoryResult<Option<LineMoldAssignmentRecord>> {
        let conn = self.get_conn()?;

        let sql = format!(
            r#"
            SELECT {}
            FROM line_mold_assignment
            WHERE line_id = ? AND assignment_date = ? AND is_active = 1
            ORDER BY changeover_time DESC
            LIMIT 1
            "#,
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        match stmt.query_row(
            params![line_id, assignment_date.format(DATE_FORMAT).to_string()],
            map_assignment_row,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 产线某生产日的全部上模记录 (按换模时间升序)
    pub fn find_assignments(
        &self,
        line_id: &str,
        assignment_date: NaiveDate,
    ) -> RepositoryResult<Vec<LineMoldAssignmentRecord>> {
        let conn = self.get_conn()?;

        let sql = format!(
            r#"
            SELECT {}
            FROM line_mold_assignment
            WHERE line_id = ? AND assignment_date = ?
            ORDER BY changeover_time ASC
            "#,
            ASSIGNMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;

        let records = stmt
            .query_map(
                params![line_id, assignment_date.format(DATE_FORMAT).to_string()],
                map_assignment_row,
            )?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(records)
    }
}

// ==========================================
// 行映射
// ==========================================

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn invalid_text(column: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        format!("无法识别的取值: {}", raw).into(),
    )
}

fn parse_timestamp(column: usize, raw: &str) -> SqliteResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| conversion_error(column, e))
}

fn parse_window(column: usize, raw: &str) -> SqliteResult<TimeWindow> {
    TimeWindow::parse(raw).ok_or_else(|| invalid_text(column, raw))
}

fn map_submission_row(row: &Row) -> SqliteResult<SubmittedSlotRecord> {
    let report_kind_str: String = row.get(1)?;
    let production_date_str: String = row.get(6)?;
    let time_window_str: String = row.get(7)?;
    let start_time_str: String = row.get(8)?;
    let end_time_str: String = row.get(9)?;
    let cavity_values_json: String = row.get(11)?;
    let cavity_details_json: String = row.get(12)?;
    let changeover_at_str: Option<String> = row.get(16)?;
    let submitted_at_str: String = row.get(19)?;

    let report_kind = ReportKind::from_db_str(&report_kind_str)
        .ok_or_else(|| invalid_text(1, &report_kind_str))?;
    let production_date = NaiveDate::parse_from_str(&production_date_str, DATE_FORMAT)
        .map_err(|e| conversion_error(6, e))?;
    let time_window = parse_window(7, &time_window_str)?;
    let start_time =
        NaiveTime::parse_from_str(&start_time_str, TIME_FORMAT).map_err(|e| conversion_error(8, e))?;
    let end_time =
        NaiveTime::parse_from_str(&end_time_str, TIME_FORMAT).map_err(|e| conversion_error(9, e))?;

    let cavity_values: Vec<f64> =
        serde_json::from_str(&cavity_values_json).map_err(|e| conversion_error(11, e))?;
    let cavity_details: Vec<CavityRecord> =
        serde_json::from_str(&cavity_details_json).map_err(|e| conversion_error(12, e))?;

    let changeover_at = changeover_at_str
        .as_deref()
        .map(|raw| parse_timestamp(16, raw))
        .transpose()?;
    let submitted_at = parse_timestamp(19, &submitted_at_str)?;

    Ok(SubmittedSlotRecord {
        submission_id: row.get(0)?,
        report_kind,
        line_id: row.get(2)?,
        slot_id: row.get(3)?,
        tool_id: row.get(4)?,
        tool_name: row.get(5)?,
        production_date,
        time_window,
        start_time,
        end_time,
        cycle_time: row.get(10)?,
        cavity_values,
        cavity_details,
        average_value: row.get(13)?,
        is_changeover_point: row.get(14)?,
        previous_tool_name: row.get(15)?,
        changeover_at,
        notes: row.get(17)?,
        submitted_by: row.get(18)?,
        submitted_at,
    })
}

fn map_assignment_row(row: &Row) -> SqliteResult<LineMoldAssignmentRecord> {
    let assignment_date_str: String = row.get(4)?;
    let changeover_time_str: String = row.get(5)?;
    let shift_str: String = row.get(6)?;
    let first_window_str: Option<String> = row.get(7)?;

    let assignment_date = NaiveDate::parse_from_str(&assignment_date_str, DATE_FORMAT)
        .map_err(|e| conversion_error(4, e))?;
    let changeover_time = parse_timestamp(5, &changeover_time_str)?;
    let shift = Shift::parse(&shift_str).ok_or_else(|| invalid_text(6, &shift_str))?;
    let first_window = first_window_str
        .as_deref()
        .map(|raw| parse_window(7, raw))
        .transpose()?;

    Ok(LineMoldAssignmentRecord {
        assignment_id: row.get(0)?,
        line_id: row.get(1)?,
        tool_id: row.get(2)?,
        tool_name: row.get(3)?,
        assignment_date,
        changeover_time,
        shift,
        first_window,
        previous_tool_name: row.get(8)?,
        is_active: row.get(9)?,
    })
}
