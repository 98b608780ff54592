// ==========================================
// 注塑生产时段追踪 - 提交记录领域模型
// ==========================================
// 红线: 提交记录是只追加的审计条目
// 对齐: migrations/v0.1_slot_tracking.sql slot_submission / line_mold_assignment 表
// ==========================================

use crate::domain::types::{ReportKind, Shift, TimeWindow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// CavityRecord - 单穴提交明细
// ==========================================
// 仅保存激活穴位, 用于按原穴位重建时段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CavityRecord {
    pub position: usize,
    pub value: Option<f64>,
    pub detail: JsonValue, // 流程扩展字段 (JSON)
}

// ==========================================
// SubmittedSlotRecord - 时段提交记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedSlotRecord {
    // ===== 主键 =====
    pub submission_id: String,
    pub report_kind: ReportKind,

    // ===== 定位 =====
    pub line_id: String,
    pub slot_id: String,
    pub tool_id: String,
    pub tool_name: String,
    pub production_date: NaiveDate, // 生产日键, 非墙钟日期
    pub time_window: TimeWindow,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,

    // ===== 测量 =====
    pub cycle_time: f64,
    pub cavity_values: Vec<f64>, // 激活且已录入的值, 按穴位顺序
    pub cavity_details: Vec<CavityRecord>,
    pub average_value: f64, // 保留 3 位小数

    // ===== 换模 =====
    pub is_changeover_point: bool,
    pub previous_tool_name: Option<String>,
    pub changeover_at: Option<NaiveDateTime>,

    // ===== 审计 =====
    pub notes: String,
    pub submitted_by: String,
    pub submitted_at: NaiveDateTime,
}

impl SubmittedSlotRecord {
    /// 均值按 3 位小数取整
    pub fn round_average(value: f64) -> f64 {
        (value * 1000.0).round() / 1000.0
    }

    /// 存储前校验 (对齐写入接口的必填项约束)
    ///
    /// # 返回
    /// - Ok(()): 校验通过
    /// - Err(reason): 违反项说明
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("line_id", self.line_id.as_str()),
            ("tool_name", self.tool_name.as_str()),
            ("submitted_by", self.submitted_by.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("缺少必填字段: {}", field));
            }
        }

        if !self.cycle_time.is_finite() || !self.average_value.is_finite() {
            return Err("成型周期与均值必须为有效数字".to_string());
        }

        if self.cavity_values.iter().any(|v| !v.is_finite()) {
            return Err("穴重数组包含无效数字".to_string());
        }

        Ok(())
    }
}

// ==========================================
// LineMoldAssignmentRecord - 上模记录
// ==========================================
// 用途: 模具分配的审计追踪 (尽力写入)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineMoldAssignmentRecord {
    pub assignment_id: String,
    pub line_id: String,
    pub tool_id: String,
    pub tool_name: String,
    pub assignment_date: NaiveDate, // 生产日
    pub changeover_time: NaiveDateTime,
    pub shift: Shift, // 首个新时段所属班次
    pub first_window: Option<TimeWindow>,
    pub previous_tool_name: Option<String>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record() -> SubmittedSlotRecord {
        let window = TimeWindow::H08;
        SubmittedSlotRecord {
            submission_id: "sub1".to_string(),
            report_kind: ReportKind::CavityWeight,
            line_id: "L1".to_string(),
            slot_id: "s1".to_string(),
            tool_id: "T1".to_string(),
            tool_name: "Cap".to_string(),
            production_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            time_window: window,
            start_time: window.start_time(),
            end_time: window.end_time(),
            cycle_time: 30.0,
            cavity_values: vec![10.0, 12.0],
            cavity_details: vec![],
            average_value: 11.0,
            is_changeover_point: false,
            previous_tool_name: None,
            changeover_at: None,
            notes: String::new(),
            submitted_by: "op1".to_string(),
            submitted_at: NaiveDate::from_ymd_opt(2025, 5, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_round_average() {
        assert_eq!(SubmittedSlotRecord::round_average(12.34567), 12.346);
        assert_eq!(SubmittedSlotRecord::round_average(0.0), 0.0);
    }

    #[test]
    fn test_validate() {
        let record = make_record();
        assert!(record.validate().is_ok());

        let mut missing_actor = make_record();
        missing_actor.submitted_by = "  ".to_string();
        assert!(missing_actor.validate().unwrap_err().contains("submitted_by"));

        let mut bad_cycle = make_record();
        bad_cycle.cycle_time = f64::NAN;
        assert!(bad_cycle.validate().is_err());
    }
}
