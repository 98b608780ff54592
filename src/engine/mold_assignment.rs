// ==========================================
// 注塑生产时段追踪 - 模具分配登记表
// ==========================================
// 职责: 记录各检验流程下各产线当前占用的模具, 保证模具独占
// 红线: 同一模具同一时刻至多被一条产线占用 (锁定或未锁定均算占用,
//       不区分检验流程)
// 说明: 进程级共享, 两种检验流程的所有分配/换模必须经过此表;
//       条目按 (流程, 产线) 区分, 一个流程的换模或日切不影响另一流程的占用
// ==========================================

use crate::domain::types::ReportKind;
use crate::engine::error::{EngineError, EngineResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

// ==========================================
// MoldAssignmentRegistry - 模具分配登记表
// ==========================================
#[derive(Debug, Default)]
pub struct MoldAssignmentRegistry {
    // (report_kind, line_id) → tool_id
    assignments: Mutex<HashMap<HoldKey, String>>,
}

type HoldKey = (ReportKind, String);

impl MoldAssignmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, HashMap<HoldKey, String>>> {
        self.assignments
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 尝试为某检验流程下的产线分配模具
    ///
    /// # 参数
    /// - `kind`: 检验流程
    /// - `line_id`: 产线ID
    /// - `tool_id`: 模具ID
    ///
    /// # 返回
    /// - Ok(()): 分配成功; 该流程下产线原先占用的模具被释放
    /// - Err(ToolConflict): 模具已被其他产线占用 (任一流程), 双方状态均不变
    ///
    /// # 规则
    /// - 同一产线重复分配同一模具 → 无操作成功
    /// - 同一产线在另一流程中持有同一模具不算冲突
    /// - 检查与写入在同一把锁内完成
    pub fn try_assign(&self, kind: ReportKind, line_id: &str, tool_id: &str) -> EngineResult<()> {
        let mut assignments = self.lock()?;

        if let Some(((_, holder), _)) = assignments
            .iter()
            .find(|((_, line), tool)| line.as_str() != line_id && tool.as_str() == tool_id)
        {
            warn!(
                report_kind = %kind,
                line_id = line_id,
                tool_id = tool_id,
                held_by = holder.as_str(),
                "模具已被其他产线占用"
            );
            return Err(EngineError::ToolConflict {
                tool_id: tool_id.to_string(),
                held_by_line_id: holder.clone(),
            });
        }

        match assignments.insert((kind, line_id.to_string()), tool_id.to_string()) {
            Some(previous) if previous == tool_id => {
                debug!(line_id = line_id, tool_id = tool_id, "重复分配同一模具, 无操作");
            }
            Some(previous) => {
                info!(
                    report_kind = %kind,
                    line_id = line_id,
                    tool_id = tool_id,
                    released_tool_id = previous.as_str(),
                    "产线换用新模具, 释放原模具"
                );
            }
            None => {
                info!(report_kind = %kind, line_id = line_id, tool_id = tool_id, "产线分配模具");
            }
        }

        Ok(())
    }

    /// 释放某流程下产线的模具分配
    ///
    /// # 返回
    /// 被释放的模具ID (产线无分配时为 None)
    pub fn release(&self, kind: ReportKind, line_id: &str) -> EngineResult<Option<String>> {
        let released = self.lock()?.remove(&(kind, line_id.to_string()));
        if let Some(tool_id) = &released {
            info!(
                report_kind = %kind,
                line_id = line_id,
                tool_id = tool_id.as_str(),
                "释放产线模具分配"
            );
        }
        Ok(released)
    }

    /// 批量释放某流程下的产线 (生产日切换时使用)
    pub fn release_lines<'a, I>(&self, kind: ReportKind, line_ids: I) -> EngineResult<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut assignments = self.lock()?;
        let released = line_ids
            .into_iter()
            .filter(|line_id| assignments.remove(&(kind, line_id.to_string())).is_some())
            .count();
        Ok(released)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 占用模具的产线
    pub fn holder_of(&self, tool_id: &str) -> EngineResult<Option<String>> {
        Ok(self
            .lock()?
            .iter()
            .find(|(_, tool)| tool.as_str() == tool_id)
            .map(|((_, line), _)| line.clone()))
    }

    /// 某流程下产线当前模具
    pub fn tool_of(&self, kind: ReportKind, line_id: &str) -> EngineResult<Option<String>> {
        Ok(self.lock()?.get(&(kind, line_id.to_string())).cloned())
    }

    /// 当前全部占用 (产线, 模具), 两流程中同一产线持有同一模具只计一次
    pub fn snapshot(&self) -> EngineResult<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = self
            .lock()?
            .iter()
            .map(|((_, line), tool)| (line.clone(), tool.clone()))
            .collect();
        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }
}
