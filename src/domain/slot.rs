// ==========================================
// 注塑生产时段追踪 - 时段领域模型
// ==========================================
// 红线: 已提交 (locked) 的时段不可修改、不可删除 (生产日重置除外)
// 红线: 同一产线内 time_window 唯一且按规范顺序排列
// ==========================================

use crate::domain::tool::Tool;
use crate::domain::types::{SlotStatus, TimeWindow};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// CavityEntry - 单穴测量值
// ==========================================
// D: 流程相关的扩展字段 (穴重追踪为 (), 首件确认为尺寸明细)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CavityEntry<D> {
    pub position: usize,    // 穴位 (0 起)
    pub value: Option<f64>, // 测量值 (None 表示未录入, 不计入均值)
    pub is_active: bool,    // 当前模具是否使用该穴
    pub detail: D,          // 流程扩展字段
}

impl<D> CavityEntry<D> {
    /// 显示用穴号, 例如 "C1"
    pub fn label(&self) -> String {
        format!("C{}", self.position + 1)
    }

    /// 是否计入聚合 (激活且已录入)
    pub fn counts_toward_aggregate(&self) -> bool {
        self.is_active && self.value.is_some()
    }
}

// ==========================================
// Slot - 检验时段
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot<D> {
    pub id: String, // 时段ID (产线内唯一)
    pub time_window: TimeWindow,

    // ===== 模具 =====
    pub tool_id: String,
    pub tool_name: String,

    // ===== 录入数据 (提交前可改) =====
    pub cycle_time: f64,
    pub measurements: Vec<CavityEntry<D>>,
    pub average_value: f64, // 派生值, 测量值变化时重算
    pub notes: String,

    // ===== 换模 =====
    pub is_changeover_point: bool,
    pub previous_tool_name: Option<String>, // 仅换模点有值

    // ===== 提交状态 =====
    pub locked: bool,
    pub submitted_by: Option<String>,
    pub submitted_at: Option<NaiveDateTime>,
}

impl<D> Slot<D> {
    /// 新建未提交时段
    ///
    /// # 参数
    /// - `id`: 时段ID
    /// - `time_window`: 时段
    /// - `tool`: 模具 (提供默认周期与激活穴位)
    /// - `measurements`: 已分配好的穴位列表
    pub fn new(
        id: String,
        time_window: TimeWindow,
        tool: &Tool,
        measurements: Vec<CavityEntry<D>>,
    ) -> Self {
        Self {
            id,
            time_window,
            tool_id: tool.tool_id.clone(),
            tool_name: tool.tool_name.clone(),
            cycle_time: tool.default_cycle_time,
            measurements,
            average_value: 0.0,
            notes: String::new(),
            is_changeover_point: false,
            previous_tool_name: None,
            locked: false,
            submitted_by: None,
            submitted_at: None,
        }
    }

    /// 标记为换模点
    pub fn mark_changeover(&mut self, previous_tool_name: impl Into<String>) {
        self.is_changeover_point = true;
        self.previous_tool_name = Some(previous_tool_name.into());
    }

    /// 激活穴位
    pub fn active_entries(&self) -> impl Iterator<Item = &CavityEntry<D>> {
        self.measurements.iter().filter(|e| e.is_active)
    }

    /// 激活且已录入的测量值 (按穴位顺序)
    pub fn active_values(&self) -> Vec<f64> {
        self.measurements
            .iter()
            .filter(|e| e.is_active)
            .filter_map(|e| e.value)
            .collect()
    }

    pub fn has_active_measurement(&self) -> bool {
        self.measurements.iter().any(|e| e.counts_toward_aggregate())
    }

    /// 派生状态
    ///
    /// # 规则
    /// - 已提交 → Completed
    /// - 有任一录入值或备注 → InProgress
    /// - 否则 → Pending
    pub fn status(&self) -> SlotStatus {
        if self.locked {
            SlotStatus::Completed
        } else if self.measurements.iter().any(|e| e.value.is_some()) || !self.notes.is_empty() {
            SlotStatus::InProgress
        } else {
            SlotStatus::Pending
        }
    }
}

// ==========================================
// LineAssignment - 产线模具分配
// ==========================================
// 每条产线同一时刻至多一个分配; 换模时整体替换而非修改
// locked: 操作员已确认该模具用于当日剩余时段 (不影响时段自身的提交锁)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAssignment {
    pub line_id: String,
    pub tool: Tool,
    pub locked: bool,
    pub assigned_at: NaiveDateTime,
}

impl LineAssignment {
    pub fn new(line_id: impl Into<String>, tool: Tool, assigned_at: NaiveDateTime) -> Self {
        Self {
            line_id: line_id.into(),
            tool,
            locked: true,
            assigned_at,
        }
    }
}
