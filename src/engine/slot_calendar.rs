// ==========================================
// 注塑生产时段追踪 - 时段日历
// ==========================================
// 职责: 生成生产日的规范检验时段集合
// 输入: 模具 + 全局最大穴数
// 输出: 12 个未提交时段 (或指定时段子集)
// 红线: 纯函数, 无副作用, 可重复调用
// ==========================================

use crate::domain::measurement::MeasurementKind;
use crate::domain::slot::{CavityEntry, Slot};
use crate::domain::tool::{Tool, ToolCatalog};
use crate::domain::types::TimeWindow;
use uuid::Uuid;

// ==========================================
// SlotCalendar - 时段日历
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct SlotCalendar {
    cavity_positions: usize, // 每个时段分配的穴位数
}

impl SlotCalendar {
    /// 构造函数
    ///
    /// # 参数
    /// - `cavity_positions`: 每个时段分配的穴位数 (所有模具最大穴数与下限取大)
    pub fn new(cavity_positions: usize) -> Self {
        Self { cavity_positions }
    }

    /// 按模具目录构造
    pub fn for_catalog(catalog: &ToolCatalog) -> Self {
        Self::new(catalog.max_cavity_positions())
    }

    pub fn cavity_positions(&self) -> usize {
        self.cavity_positions
    }

    /// 规范时段序列
    pub fn canonical_windows() -> &'static [TimeWindow] {
        &TimeWindow::ALL
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 生成完整生产日的时段集合
    ///
    /// # 返回
    /// 12 个未提交时段, 按规范顺序, 周期取模具默认值,
    /// 穴位数 = max(所有模具穴数, 8), 激活穴位 = position < 模具穴数
    pub fn generate<K: MeasurementKind>(&self, tool: &Tool) -> Vec<Slot<K::Detail>> {
        self.generate_windows::<K>(tool, Self::canonical_windows())
    }

    /// 为指定时段生成未提交时段
    ///
    /// # 参数
    /// - `tool`: 模具
    /// - `windows`: 目标时段 (调用方保证规范顺序、无重复)
    pub fn generate_windows<K: MeasurementKind>(
        &self,
        tool: &Tool,
        windows: &[TimeWindow],
    ) -> Vec<Slot<K::Detail>> {
        // 穴数超过目录最大值时 (目录外模具) 按模具穴数分配
        let positions = self.cavity_positions.max(tool.cavity_count);

        windows
            .iter()
            .map(|window| {
                let measurements = (0..positions)
                    .map(|position| CavityEntry {
                        position,
                        value: None,
                        is_active: tool.uses_position(position),
                        detail: K::new_detail(tool, position),
                    })
                    .collect();
                Slot::new(Uuid::new_v4().to_string(), *window, tool, measurements)
            })
            .collect()
    }
}

impl Default for SlotCalendar {
    fn default() -> Self {
        Self::for_catalog(&ToolCatalog::default())
    }
}
