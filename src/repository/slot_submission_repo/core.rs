use super::{DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT};
use crate::domain::submission::{LineMoldAssignmentRecord, SubmittedSlotRecord};
use crate::domain::types::ReportKind;
use crate::engine::store::SlotRecordStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// SlotSubmissionRepository - 时段提交仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射与写入前校验
pub struct SlotSubmissionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SlotSubmissionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入时段提交记录
    ///
    /// # 返回
    /// - `Ok(submission_id)`: 成功插入
    /// - `Err(ValidationError)`: 必填字段为空或数值非法
    /// - `Err(UniqueConstraintViolation)`: submission_id 重复
    pub fn insert(&self, record: &SubmittedSlotRecord) -> RepositoryResult<String> {
        record.validate().map_err(RepositoryError::ValidationError)?;

        let cavity_values_json = serde_json::to_string(&record.cavity_values)?;
        let cavity_details_json = serde_json::to_string(&record.cavity_details)?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO slot_submission (
                submission_id, report_kind, line_id, slot_id, tool_id, tool_name,
                production_date, time_window, window_index, start_time, end_time,
                cycle_time, cavity_values_json, cavity_details_json, average_value,
                is_changeover_point, previous_tool_name, changeover_at,
                notes, submitted_by, submitted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.submission_id,
                record.report_kind.to_db_str(),
                record.line_id,
                record.slot_id,
                record.tool_id,
                record.tool_name,
                record.production_date.format(DATE_FORMAT).to_string(),
                record.time_window.code(),
                record.time_window.index() as i64,
                record.start_time.format(TIME_FORMAT).to_string(),
                record.end_time.format(TIME_FORMAT).to_string(),
                record.cycle_time,
                cavity_values_json,
                cavity_details_json,
                record.average_value,
                record.is_changeover_point,
                record.previous_tool_name,
                record
                    .changeover_at
                    .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
                record.notes,
                record.submitted_by,
                record.submitted_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;

        Ok(record.submission_id.clone())
    }

    /// 插入上模记录
    ///
    /// 同一产线同一生产日之前的有效记录置为无效, 与插入在同一事务内
    pub fn insert_assignment(&self, record: &LineMoldAssignmentRecord) -> RepositoryResult<()> {
        if record.line_id.trim().is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "line_id".to_string(),
                message: "产线ID不能为空".to_string(),
            });
        }
        if record.tool_name.trim().is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "tool_name".to_string(),
                message: "模具名称不能为空".to_string(),
            });
        }

        let assignment_date = record.assignment_date.format(DATE_FORMAT).to_string();

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        if record.is_active {
            tx.execute(
                r#"
                UPDATE line_mold_assignment
                SET is_active = 0
                WHERE line_id = ? AND assignment_date = ? AND is_active = 1
                "#,
                params![record.line_id, assignment_date],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO line_mold_assignment (
                assignment_id, line_id, tool_id, tool_name, assignment_date,
                changeover_time, shift, first_window, previous_tool_name, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.assignment_id,
                record.line_id,
                record.tool_id,
                record.tool_name,
                assignment_date,
                record.changeover_time.format(TIMESTAMP_FORMAT).to_string(),
                record.shift.as_str(),
                record.first_window.map(|w| w.code()),
                record.previous_tool_name,
                record.is_active,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }
}

// ==========================================
// SlotRecordStore Trait 实现
// ==========================================
#[async_trait]
impl SlotRecordStore for SlotSubmissionRepository {
    async fn insert_submission(&self, record: &SubmittedSlotRecord) -> RepositoryResult<String> {
        self.insert(record)
    }

    async fn find_submissions(
        &self,
        report_kind: ReportKind,
        line_id: &str,
        production_date: NaiveDate,
    ) -> RepositoryResult<Vec<SubmittedSlotRecord>> {
        self.find_by_line_and_day(report_kind, line_id, production_date)
    }

    async fn record_assignment(&self, record: &LineMoldAssignmentRecord) -> RepositoryResult<()> {
        self.insert_assignment(record)
    }
}
