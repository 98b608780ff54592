// ==========================================
// 注塑生产时段追踪 - 生产日会话
// ==========================================
// 职责: 持有一个生产日内所有产线的模具分配与时段状态, 编排
//       登记表 / 换模控制器 / 提交台账 / 存储
// 红线: 选模失败 (容量不足或模具冲突) 时所有状态不变
// 红线: 产线有提交进行中时拒绝换模
// ==========================================

use crate::config::EngineConfig;
use crate::domain::measurement::MeasurementKind;
use crate::domain::production_day::ProductionDay;
use crate::domain::slot::{CavityEntry, LineAssignment, Slot};
use crate::domain::submission::{LineMoldAssignmentRecord, SubmittedSlotRecord};
use crate::domain::tool::{Tool, ToolCatalog};
use crate::domain::types::TimeWindow;
use crate::engine::aggregator::{CavityMeasurementAggregator, MeasurementAggregate};
use crate::engine::changeover::{ChangeoverController, ChangeoverKind};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::ledger::SlotSubmissionLedger;
use crate::engine::mold_assignment::MoldAssignmentRegistry;
use crate::engine::slot_calendar::SlotCalendar;
use crate::engine::store::SlotRecordStore;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument, warn};
use uuid::Uuid;

// ==========================================
// 操作结果
// ==========================================

/// 选模结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeoverOutcome {
    pub line_id: String,
    pub tool_id: String,
    pub kind: ChangeoverKind,
    pub retained_count: usize,
    pub discarded_count: usize,
    pub created_count: usize,
    pub changeover_window: Option<TimeWindow>,
    pub previous_tool_name: Option<String>,
}

/// 提交结果
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted(SubmittedSlotRecord),
    AlreadySubmitted, // 重复提交, 无操作
}

/// 历史重建结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRestore {
    pub line_id: String,
    pub restored_slots: usize,
    pub current_tool_id: Option<String>,
    pub conflict_with_line_id: Option<String>, // 模具已被其他产线占用时
}

// ==========================================
// ProductionDaySession - 生产日会话
// ==========================================
pub struct ProductionDaySession<K: MeasurementKind> {
    catalog: Arc<ToolCatalog>,
    registry: Arc<MoldAssignmentRegistry>,
    store: Arc<dyn SlotRecordStore>,
    config: EngineConfig,
    controller: ChangeoverController,
    aggregator: CavityMeasurementAggregator,
    ledger: SlotSubmissionLedger<K>,
    assignments: Mutex<HashMap<String, LineAssignment>>,
}

impl<K: MeasurementKind> ProductionDaySession<K> {
    /// 构造函数
    ///
    /// # 参数
    /// - `production_day`: 生产日
    /// - `catalog`: 模具目录 (决定时段穴位数)
    /// - `registry`: 进程级模具分配登记表 (各流程会话共享)
    /// - `store`: 提交记录存储
    /// - `config`: 引擎参数
    pub fn new(
        production_day: ProductionDay,
        catalog: Arc<ToolCatalog>,
        registry: Arc<MoldAssignmentRegistry>,
        store: Arc<dyn SlotRecordStore>,
        config: EngineConfig,
    ) -> Self {
        let calendar = SlotCalendar::new(
            catalog
                .max_cavity_positions()
                .max(config.min_cavity_positions),
        );
        let aggregator = CavityMeasurementAggregator::new(config.tolerance_band);
        let ledger = SlotSubmissionLedger::new(
            production_day,
            store.clone(),
            aggregator,
            config.require_active_measurement,
        );

        Self {
            catalog,
            registry,
            store,
            controller: ChangeoverController::new(calendar),
            aggregator,
            ledger,
            assignments: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn production_day(&self) -> ProductionDay {
        self.ledger.production_day()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    fn lock_assignments(&self) -> EngineResult<MutexGuard<'_, HashMap<String, LineAssignment>>> {
        self.assignments
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn slots(&self, line_id: &str) -> EngineResult<Vec<Slot<K::Detail>>> {
        self.ledger.slots(line_id)
    }

    pub fn slot(&self, line_id: &str, slot_id: &str) -> EngineResult<Slot<K::Detail>> {
        self.ledger.slot(line_id, slot_id)
    }

    pub fn assignment(&self, line_id: &str) -> EngineResult<Option<LineAssignment>> {
        Ok(self.lock_assignments()?.get(line_id).cloned())
    }

    /// 时段聚合 (均值 + 公差判定)
    pub fn aggregate(&self, line_id: &str, slot_id: &str) -> EngineResult<MeasurementAggregate> {
        let slot = self.ledger.slot(line_id, slot_id)?;
        Ok(self.aggregator.aggregate(&slot, self.standard_for(&slot)))
    }

    /// 时段对应的标准值
    ///
    /// 模具不在目录中时 (历史记录) 使用配置的默认标准重量
    fn standard_for(&self, slot: &Slot<K::Detail>) -> f64 {
        self.catalog
            .get(&slot.tool_id)
            .or_else(|| self.catalog.find_by_name(&slot.tool_name))
            .map(K::standard_value)
            .unwrap_or(self.config.default_std_weight)
    }

    // ==========================================
    // 选模 / 换模
    // ==========================================

    /// 为产线选择模具
    ///
    /// # 流程
    /// 1. 查找模具; 分配已锁定 → AssignmentLocked
    /// 2. 产线有提交进行中 → SubmitInFlight
    /// 3. 计算换模结果 (容量不足 → NoRemainingCapacity)
    /// 4. 登记表占用模具 (冲突 → ToolConflict)
    /// 5. 替换时段集合, 更新分配, 写上模记录 (尽力而为)
    #[instrument(skip(self), fields(production_day = %self.production_day()))]
    pub async fn select_tool(&self, line_id: &str, tool_id: &str) -> EngineResult<ChangeoverOutcome> {
        // 1. 模具与分配状态
        let tool = self
            .catalog
            .get(tool_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTool(tool_id.to_string()))?;

        let previous_tool_id = match self.lock_assignments()?.get(line_id) {
            Some(current) if current.locked => {
                warn!(line_id = line_id, tool_id = tool_id, "分配已锁定, 需先开始换模");
                return Err(EngineError::AssignmentLocked {
                    line_id: line_id.to_string(),
                });
            }
            Some(current) => Some(current.tool.tool_id.clone()),
            None => None,
        };

        // 2. 提交进行中
        if let Some(slot_id) = self.ledger.in_flight_slot(line_id)? {
            warn!(line_id = line_id, slot_id = slot_id.as_str(), "产线有提交进行中, 拒绝换模");
            return Err(EngineError::SubmitInFlight {
                line_id: line_id.to_string(),
                slot_id,
            });
        }

        // 3. 容量检查 (登记表之前, 失败时不占用模具)
        let existing = self.ledger.slots(line_id)?;
        let plan = self.controller.plan::<K>(line_id, &existing, &tool)?;

        // 4. 模具独占
        self.registry.try_assign(K::REPORT_KIND, line_id, &tool.tool_id)?;

        // 5. 应用
        if let Err(e) = self.ledger.replace_slots(line_id, plan.slots.clone()) {
            self.rollback_registry(line_id, previous_tool_id.as_deref());
            return Err(e);
        }

        let now = Local::now().naive_local();
        self.lock_assignments()?
            .insert(line_id.to_string(), LineAssignment::new(line_id, tool.clone(), now));

        let outcome = ChangeoverOutcome {
            line_id: line_id.to_string(),
            tool_id: tool.tool_id.clone(),
            kind: plan.kind,
            retained_count: plan.retained_count,
            discarded_count: plan.discarded_count,
            created_count: plan.created_count(),
            changeover_window: plan.changeover_window,
            previous_tool_name: plan.previous_tool_name.clone(),
        };

        self.log_assignment(&tool, &outcome, now).await;

        info!(
            line_id = line_id,
            tool_id = tool.tool_id.as_str(),
            kind = ?outcome.kind,
            retained = outcome.retained_count,
            created = outcome.created_count,
            "产线选模完成"
        );
        Ok(outcome)
    }

    /// 替换时段失败时恢复登记表
    fn rollback_registry(&self, line_id: &str, previous_tool_id: Option<&str>) {
        let restored = match previous_tool_id {
            Some(previous) => self.registry.try_assign(K::REPORT_KIND, line_id, previous),
            None => self.registry.release(K::REPORT_KIND, line_id).map(|_| ()),
        };
        if let Err(e) = restored {
            warn!(line_id = line_id, error = %e, "登记表回滚失败");
        }
    }

    /// 写上模记录 (失败只记录告警, 不撤销选模)
    async fn log_assignment(
        &self,
        tool: &Tool,
        outcome: &ChangeoverOutcome,
        changeover_time: chrono::NaiveDateTime,
    ) {
        let first_window = outcome.changeover_window.unwrap_or(TimeWindow::H08);
        let record = LineMoldAssignmentRecord {
            assignment_id: Uuid::new_v4().to_string(),
            line_id: outcome.line_id.clone(),
            tool_id: tool.tool_id.clone(),
            tool_name: tool.tool_name.clone(),
            assignment_date: self.production_day().date,
            changeover_time,
            shift: first_window.shift(),
            first_window: Some(first_window),
            previous_tool_name: outcome.previous_tool_name.clone(),
            is_active: true,
        };

        if let Err(e) = self.store.record_assignment(&record).await {
            warn!(
                line_id = record.line_id.as_str(),
                tool_id = record.tool_id.as_str(),
                error = %e,
                "上模记录写入失败"
            );
        }
    }

    /// 开始换模 (解锁当前分配, 允许重新选模)
    ///
    /// 产线有提交进行中时拒绝, 分配保持锁定
    pub fn begin_changeover(&self, line_id: &str) -> EngineResult<()> {
        if let Some(slot_id) = self.ledger.in_flight_slot(line_id)? {
            warn!(line_id = line_id, slot_id = slot_id.as_str(), "产线有提交进行中, 拒绝开始换模");
            return Err(EngineError::SubmitInFlight {
                line_id: line_id.to_string(),
                slot_id,
            });
        }

        let mut assignments = self.lock_assignments()?;
        let assignment = assignments
            .get_mut(line_id)
            .ok_or_else(|| EngineError::NoAssignment {
                line_id: line_id.to_string(),
            })?;
        assignment.locked = false;
        info!(
            line_id = line_id,
            tool_id = assignment.tool.tool_id.as_str(),
            "开始换模"
        );
        Ok(())
    }

    /// 释放产线模具 (时段保留)
    pub fn release_line(&self, line_id: &str) -> EngineResult<Option<String>> {
        self.lock_assignments()?.remove(line_id);
        self.registry.release(K::REPORT_KIND, line_id)
    }

    // ==========================================
    // 录入
    // ==========================================

    pub fn set_cavity_value(
        &self,
        line_id: &str,
        slot_id: &str,
        position: usize,
        value: Option<f64>,
    ) -> EngineResult<MeasurementAggregate> {
        self.ledger.set_cavity_value(line_id, slot_id, position, value)?;
        self.aggregate(line_id, slot_id)
    }

    pub fn set_cavity_detail(
        &self,
        line_id: &str,
        slot_id: &str,
        position: usize,
        detail: K::Detail,
    ) -> EngineResult<()> {
        self.ledger.set_cavity_detail(line_id, slot_id, position, detail)
    }

    /// 激活且未录入的穴位填入标准值
    pub fn fill_active_cavities(&self, line_id: &str, slot_id: &str) -> EngineResult<MeasurementAggregate> {
        let slot = self.ledger.slot(line_id, slot_id)?;
        let standard = self.standard_for(&slot);
        let filled = self.ledger.fill_active_cavities(line_id, slot_id, standard)?;
        info!(line_id = line_id, slot_id = slot_id, filled = filled, "按标准值填充穴位");
        self.aggregate(line_id, slot_id)
    }

    pub fn set_cycle_time(&self, line_id: &str, slot_id: &str, cycle_time: f64) -> EngineResult<()> {
        self.ledger.set_cycle_time(line_id, slot_id, cycle_time)
    }

    pub fn set_notes(&self, line_id: &str, slot_id: &str, notes: &str) -> EngineResult<()> {
        self.ledger.set_notes(line_id, slot_id, notes)
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 提交时段 (重复提交返回 AlreadySubmitted)
    pub async fn submit_slot(
        &self,
        line_id: &str,
        slot_id: &str,
        submitted_by: &str,
    ) -> EngineResult<SubmitOutcome> {
        match self.ledger.submit(line_id, slot_id, submitted_by).await {
            Ok(record) => Ok(SubmitOutcome::Submitted(record)),
            Err(e) if e.is_noop() => Ok(SubmitOutcome::AlreadySubmitted),
            Err(e) => Err(e),
        }
    }

    // ==========================================
    // 历史重建
    // ==========================================

    /// 从存储重建产线当日已提交时段
    ///
    /// # 规则
    /// - 同一时段多条记录以最后写入为准
    /// - 当前模具取规范顺序最后一条记录的模具, 并重新占用登记表;
    ///   被其他产线占用时记录告警, 产线保持无分配
    /// - 存储中无记录时内存状态不变
    #[instrument(skip(self), fields(production_day = %self.production_day()))]
    pub async fn load_line(&self, line_id: &str) -> EngineResult<LineRestore> {
        let records = self
            .store
            .find_submissions(K::REPORT_KIND, line_id, self.production_day().date)
            .await?;

        let mut restore = LineRestore {
            line_id: line_id.to_string(),
            restored_slots: 0,
            current_tool_id: None,
            conflict_with_line_id: None,
        };
        if records.is_empty() {
            return Ok(restore);
        }

        // 每个时段保留最后写入的记录
        let mut latest: BTreeMap<TimeWindow, &SubmittedSlotRecord> = BTreeMap::new();
        for record in &records {
            match latest.get(&record.time_window) {
                Some(kept) if kept.submitted_at > record.submitted_at => {}
                _ => {
                    latest.insert(record.time_window, record);
                }
            }
        }

        let slots: Vec<Slot<K::Detail>> = latest.values().map(|r| self.slot_from_record(r)).collect();
        restore.restored_slots = self.ledger.restore_line(line_id, slots)?;

        // 当前模具
        let Some(last) = latest.values().next_back() else {
            return Ok(restore);
        };
        let Some(tool) = self
            .catalog
            .get(&last.tool_id)
            .or_else(|| self.catalog.find_by_name(&last.tool_name))
            .cloned()
        else {
            warn!(
                line_id = line_id,
                tool_name = last.tool_name.as_str(),
                "历史记录中的模具不在目录中, 产线保持无分配"
            );
            return Ok(restore);
        };

        match self.registry.try_assign(K::REPORT_KIND, line_id, &tool.tool_id) {
            Ok(()) => {
                restore.current_tool_id = Some(tool.tool_id.clone());
                let now = Local::now().naive_local();
                self.lock_assignments()?
                    .insert(line_id.to_string(), LineAssignment::new(line_id, tool, now));
            }
            Err(EngineError::ToolConflict { held_by_line_id, .. }) => {
                warn!(
                    line_id = line_id,
                    tool_id = tool.tool_id.as_str(),
                    held_by = held_by_line_id.as_str(),
                    "历史模具已被其他产线占用, 产线保持无分配"
                );
                restore.conflict_with_line_id = Some(held_by_line_id);
            }
            Err(e) => return Err(e),
        }

        info!(
            line_id = line_id,
            restored = restore.restored_slots,
            current_tool = ?restore.current_tool_id,
            "产线历史重建完成"
        );
        Ok(restore)
    }

    /// 由提交记录重建已提交时段
    fn slot_from_record(&self, record: &SubmittedSlotRecord) -> Slot<K::Detail> {
        let tool = self
            .catalog
            .get(&record.tool_id)
            .or_else(|| self.catalog.find_by_name(&record.tool_name));

        let cavity_count = tool.map(|t| t.cavity_count).unwrap_or_else(|| {
            if record.cavity_details.is_empty() {
                record.cavity_values.len()
            } else {
                record.cavity_details.iter().map(|c| c.position + 1).max().unwrap_or(0)
            }
        });
        let positions = self.controller.calendar().cavity_positions().max(cavity_count);

        let mut measurements: Vec<CavityEntry<K::Detail>> = (0..positions)
            .map(|position| CavityEntry {
                position,
                value: None,
                is_active: position < cavity_count,
                detail: K::Detail::default(),
            })
            .collect();

        if record.cavity_details.is_empty() {
            // 仅有值列表的记录: 按穴位顺序回填
            for (entry, value) in measurements.iter_mut().zip(&record.cavity_values) {
                entry.value = Some(*value);
            }
        } else {
            for cavity in &record.cavity_details {
                let Some(entry) = measurements.get_mut(cavity.position) else {
                    continue;
                };
                entry.value = cavity.value;
                entry.detail = serde_json::from_value(cavity.detail.clone()).unwrap_or_else(|e| {
                    warn!(
                        submission_id = record.submission_id.as_str(),
                        position = cavity.position,
                        error = %e,
                        "穴位明细无法解析, 使用空明细"
                    );
                    K::Detail::default()
                });
            }
        }

        Slot {
            id: record.slot_id.clone(),
            time_window: record.time_window,
            tool_id: record.tool_id.clone(),
            tool_name: record.tool_name.clone(),
            cycle_time: record.cycle_time,
            measurements,
            average_value: record.average_value,
            notes: record.notes.clone(),
            is_changeover_point: record.is_changeover_point,
            previous_tool_name: record.previous_tool_name.clone(),
            locked: true,
            submitted_by: Some(record.submitted_by.clone()),
            submitted_at: Some(record.submitted_at),
        }
    }

    // ==========================================
    // 生产日切换
    // ==========================================

    /// 切换到新生产日: 释放本流程全部产线模具, 清空内存状态
    ///
    /// 其他检验流程会话的占用不受影响
    pub fn reset(&mut self, new_day: ProductionDay) -> EngineResult<()> {
        let mut line_ids = self.ledger.clear_all()?;
        line_ids.extend(self.lock_assignments()?.drain().map(|(line_id, _)| line_id));
        line_ids.sort();
        line_ids.dedup();

        let released = self
            .registry
            .release_lines(K::REPORT_KIND, line_ids.iter().map(String::as_str))?;

        info!(
            from = %self.production_day(),
            to = %new_day,
            lines = line_ids.len(),
            released = released,
            "生产日切换"
        );

        self.ledger = SlotSubmissionLedger::new(
            new_day,
            self.store.clone(),
            self.aggregator,
            self.config.require_active_measurement,
        );
        Ok(())
    }
}
