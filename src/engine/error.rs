// ==========================================
// 注塑生产时段追踪 - 引擎层错误类型
// ==========================================
// 说明: 所有错误仅作用于当前产线/当前操作, 不影响其他产线, 均不致命
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
/// 错误信息包含显式原因, 供界面直接展示
#[derive(Error, Debug)]
pub enum EngineError {
    // ==========================================
    // 模具分配
    // ==========================================
    /// 模具已在其他产线使用 (可恢复: 选择其他模具)
    #[error("模具冲突: tool={tool_id} 已在产线 {held_by_line_id} 使用, 请选择其他模具")]
    ToolConflict {
        tool_id: String,
        held_by_line_id: String,
    },

    /// 产线模具已锁定, 需先发起换模
    #[error("产线 {line_id} 的模具已锁定, 请先发起换模")]
    AssignmentLocked { line_id: String },

    #[error("产线 {line_id} 尚未分配模具")]
    NoAssignment { line_id: String },

    #[error("未知模具: {0}")]
    UnknownTool(String),

    // ==========================================
    // 换模
    // ==========================================
    /// 当日所有时段均已提交, 无法换模 (可恢复: 现有状态不变)
    #[error("产线 {line_id} 当日所有时段均已提交, 无法换模")]
    NoRemainingCapacity { line_id: String },

    // ==========================================
    // 时段提交
    // ==========================================
    /// 时段已提交 (重复提交保护; 调用方视为无操作成功)
    #[error("时段已提交: line={line_id}, slot={slot_id}")]
    AlreadyLocked { line_id: String, slot_id: String },

    /// 时段提交进行中
    #[error("时段提交进行中: line={line_id}, slot={slot_id}")]
    SubmitInFlight { line_id: String, slot_id: String },

    /// 对已提交时段的修改被拒绝
    #[error("时段已提交不可修改: line={line_id}, slot={slot_id}")]
    SlotLocked { line_id: String, slot_id: String },

    #[error("时段未找到: line={line_id}, slot={slot_id}")]
    SlotNotFound { line_id: String, slot_id: String },

    #[error("穴位超出范围: slot={slot_id}, position={position}, positions={positions}")]
    CavityOutOfRange {
        slot_id: String,
        position: usize,
        positions: usize,
    },

    #[error("数据验证失败: {0}")]
    Validation(String),

    // ==========================================
    // 基础设施
    // ==========================================
    #[error("状态锁获取失败: {0}")]
    LockPoisoned(String),

    /// 存储写入/读取失败 (时段保持未提交, 可重试)
    #[error("存储失败: {0}")]
    Storage(#[from] RepositoryError),
}

impl EngineError {
    /// 是否可恢复
    ///
    /// 引擎内没有致命错误; 锁中毒以外的错误都由操作员重试或改选处理
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::LockPoisoned(_))
    }

    /// 调用方是否应视为无操作成功
    pub fn is_noop(&self) -> bool {
        matches!(self, EngineError::AlreadyLocked { .. })
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
