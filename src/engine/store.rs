// ==========================================
// 注塑生产时段追踪 - 引擎层存储接口
// ==========================================
// 职责: 定义提交记录存储 trait, 实现依赖倒置
// 说明: Engine 层定义 trait, Repository 层实现 (SQLite)
// ==========================================

use crate::domain::submission::{LineMoldAssignmentRecord, SubmittedSlotRecord};
use crate::domain::types::ReportKind;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::NaiveDate;

// ==========================================
// 存储 Trait
// ==========================================

/// 时段提交记录存储
///
/// # 实现说明
/// - `SlotSubmissionRepository` (SQLite) 为默认实现
/// - 写入成功后引擎才将时段置为已提交
#[async_trait]
pub trait SlotRecordStore: Send + Sync {
    /// 写入一条提交记录
    ///
    /// # 返回
    /// - Ok(submission_id): 写入成功
    /// - Err: 写入失败 (时段保持未提交)
    async fn insert_submission(&self, record: &SubmittedSlotRecord) -> RepositoryResult<String>;

    /// 查询产线某生产日的全部提交记录
    ///
    /// # 返回
    /// 按规范时段顺序, 同时段按提交时间升序
    async fn find_submissions(
        &self,
        report_kind: ReportKind,
        line_id: &str,
        production_date: NaiveDate,
    ) -> RepositoryResult<Vec<SubmittedSlotRecord>>;

    /// 写入上模记录
    async fn record_assignment(&self, record: &LineMoldAssignmentRecord) -> RepositoryResult<()>;
}
