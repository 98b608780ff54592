// ==========================================
// 注塑生产时段追踪 - 换模控制器
// ==========================================
// 职责: 根据产线现有时段与新选模具, 决定保留/丢弃的时段并生成新时段集合
// 输入: 产线现有时段 + 新模具
// 输出: 新时段集合 (已提交时段原样保留 + 剩余时段重新生成)
// 红线: 已提交时段不可修改、不可删除
// 红线: 未提交时段的录入数据在换模时全部丢弃 (含重选同一模具)
// ==========================================

use crate::domain::measurement::MeasurementKind;
use crate::domain::slot::Slot;
use crate::domain::tool::Tool;
use crate::domain::types::TimeWindow;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::slot_calendar::SlotCalendar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

// ==========================================
// 换模类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeoverKind {
    FirstAssignment, // 当日首次分配 (无已提交时段)
    MidDay,          // 当日中途换模
}

// ==========================================
// ChangeoverPlan - 换模结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeoverPlan<D> {
    pub kind: ChangeoverKind,
    pub slots: Vec<Slot<D>>,                  // 新时段集合 (规范顺序)
    pub retained_count: usize,                // 保留的已提交时段数
    pub discarded_count: usize,               // 丢弃的未提交时段数
    pub changeover_window: Option<TimeWindow>, // 换模点所在时段
    pub previous_tool_name: Option<String>,
}

impl<D> ChangeoverPlan<D> {
    /// 新生成的时段数
    pub fn created_count(&self) -> usize {
        self.slots.len() - self.retained_count
    }
}

// ==========================================
// ChangeoverController - 换模控制器
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct ChangeoverController {
    calendar: SlotCalendar,
}

impl ChangeoverController {
    pub fn new(calendar: SlotCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &SlotCalendar {
        &self.calendar
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 换模, 返回新时段集合
    pub fn changeover<K: MeasurementKind>(
        &self,
        line_id: &str,
        existing_slots: &[Slot<K::Detail>],
        new_tool: &Tool,
    ) -> EngineResult<Vec<Slot<K::Detail>>> {
        Ok(self.plan::<K>(line_id, existing_slots, new_tool)?.slots)
    }

    /// 计算换模结果 (不修改输入)
    ///
    /// # 步骤
    /// 1. 现有时段划分为已提交 / 未提交
    /// 2. 无已提交时段 → 全部丢弃, 生成完整 12 时段, 无换模点
    /// 3. 否则 剩余时段 = 规范时段 - 已提交时段 (保持规范顺序)
    /// 4. 剩余时段为空 → NoRemainingCapacity
    /// 5. 按新模具为剩余时段生成新时段, 第一个新时段标记为换模点,
    ///    previous_tool_name = 规范顺序最后一个已提交时段的模具
    /// 6. 返回 已提交 ++ 新时段, 按规范顺序
    pub fn plan<K: MeasurementKind>(
        &self,
        line_id: &str,
        existing_slots: &[Slot<K::Detail>],
        new_tool: &Tool,
    ) -> EngineResult<ChangeoverPlan<K::Detail>> {
        // 1. 划分
        let (locked, unlocked): (Vec<&Slot<K::Detail>>, Vec<&Slot<K::Detail>>) =
            existing_slots.iter().partition(|s| s.locked);

        // 2. 当日首次分配
        if locked.is_empty() {
            let slots = self.calendar.generate::<K>(new_tool);
            info!(
                line_id = line_id,
                tool_id = new_tool.tool_id.as_str(),
                discarded = unlocked.len(),
                "首次分配模具, 生成完整生产日时段"
            );
            return Ok(ChangeoverPlan {
                kind: ChangeoverKind::FirstAssignment,
                slots,
                retained_count: 0,
                discarded_count: unlocked.len(),
                changeover_window: None,
                previous_tool_name: None,
            });
        }

        // 3. 剩余时段
        let used_windows: HashSet<TimeWindow> = locked.iter().map(|s| s.time_window).collect();
        let remaining_windows: Vec<TimeWindow> = SlotCalendar::canonical_windows()
            .iter()
            .copied()
            .filter(|w| !used_windows.contains(w))
            .collect();

        // 4. 无剩余容量
        if remaining_windows.is_empty() {
            warn!(
                line_id = line_id,
                tool_id = new_tool.tool_id.as_str(),
                "当日所有时段均已提交, 拒绝换模"
            );
            return Err(EngineError::NoRemainingCapacity {
                line_id: line_id.to_string(),
            });
        }

        // 5. 生成新时段并标记换模点
        let previous_tool_name = locked
            .iter()
            .max_by_key(|s| s.time_window)
            .map(|s| s.tool_name.clone())
            .unwrap_or_default();

        let mut new_slots = self
            .calendar
            .generate_windows::<K>(new_tool, &remaining_windows);
        if let Some(first) = new_slots.first_mut() {
            first.mark_changeover(previous_tool_name.clone());
        }
        let changeover_window = new_slots.first().map(|s| s.time_window);

        // 6. 合并并按规范顺序排列
        let retained_count = locked.len();
        let mut slots: Vec<Slot<K::Detail>> = locked.into_iter().cloned().collect();
        slots.append(&mut new_slots);
        slots.sort_by_key(|s| s.time_window);

        info!(
            line_id = line_id,
            tool_id = new_tool.tool_id.as_str(),
            previous_tool = previous_tool_name.as_str(),
            retained = retained_count,
            discarded = unlocked.len(),
            changeover_window = ?changeover_window,
            "中途换模完成"
        );

        Ok(ChangeoverPlan {
            kind: ChangeoverKind::MidDay,
            slots,
            retained_count,
            discarded_count: unlocked.len(),
            changeover_window,
            previous_tool_name: Some(previous_tool_name),
        })
    }
}

impl Default for ChangeoverController {
    fn default() -> Self {
        Self::new(SlotCalendar::default())
    }
}
