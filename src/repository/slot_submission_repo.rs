// ==========================================
// 注塑生产时段追踪 - 时段提交数据仓储
// ==========================================
// 表: slot_submission (只追加), line_mold_assignment
// 红线: 提交记录只追加, 不更新不删除
// ==========================================

mod core;
mod queries;


pub use self::core::SlotSubmissionRepository;

/// 时间戳存储格式 (定宽, 文本排序即时间排序)
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M";
