// ==========================================
// 注塑生产时段追踪 - 时段提交台账
// ==========================================
// 职责: 按产线管理当日时段集合, 执行追加/锁定语义, 提交时写入存储
// 红线: 已提交时段不可修改、不可删除 (生产日重置除外)
// 红线: 存储写入成功后才置为已提交; 写入失败时段保持未提交, 可重试
// 红线: 同一时段的提交未完成前, 不允许再次提交
// ==========================================

use crate::domain::measurement::MeasurementKind;
use crate::domain::production_day::ProductionDay;
use crate::domain::slot::Slot;
use crate::domain::submission::{CavityRecord, SubmittedSlotRecord};
use crate::domain::types::TimeWindow;
use crate::engine::aggregator::CavityMeasurementAggregator;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::store::SlotRecordStore;
use chrono::Local;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ==========================================
// LineLedger - 单产线台账
// ==========================================
#[derive(Debug)]
struct LineLedger<D> {
    slots: Vec<Slot<D>>,      // 规范顺序
    in_flight: HashSet<String>, // 提交进行中的时段ID
}

impl<D> Default for LineLedger<D> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            in_flight: HashSet::new(),
        }
    }
}

// ==========================================
// SlotSubmissionLedger - 时段提交台账
// ==========================================
pub struct SlotSubmissionLedger<K: MeasurementKind> {
    production_day: ProductionDay,
    lines: Mutex<HashMap<String, LineLedger<K::Detail>>>,
    store: Arc<dyn SlotRecordStore>,
    aggregator: CavityMeasurementAggregator,
    require_active_measurement: bool,
    _kind: PhantomData<fn() -> K>,
}

impl<K: MeasurementKind> SlotSubmissionLedger<K> {
    /// 构造函数
    ///
    /// # 参数
    /// - `production_day`: 生产日
    /// - `store`: 提交记录存储
    /// - `aggregator`: 均值计算
    /// - `require_active_measurement`: 提交时是否要求至少一个激活穴位有值
    pub fn new(
        production_day: ProductionDay,
        store: Arc<dyn SlotRecordStore>,
        aggregator: CavityMeasurementAggregator,
        require_active_measurement: bool,
    ) -> Self {
        Self {
            production_day,
            lines: Mutex::new(HashMap::new()),
            store,
            aggregator,
            require_active_measurement,
            _kind: PhantomData,
        }
    }

    pub fn production_day(&self) -> ProductionDay {
        self.production_day
    }

    fn lock_lines(&self) -> EngineResult<MutexGuard<'_, HashMap<String, LineLedger<K::Detail>>>> {
        self.lines
            .lock()
            .map_err(|e| EngineError::LockPoisoned(e.to_string()))
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 产线当前时段集合 (规范顺序, 副本)
    pub fn slots(&self, line_id: &str) -> EngineResult<Vec<Slot<K::Detail>>> {
        Ok(self
            .lock_lines()?
            .get(line_id)
            .map(|l| l.slots.clone())
            .unwrap_or_default())
    }

    pub fn slot(&self, line_id: &str, slot_id: &str) -> EngineResult<Slot<K::Detail>> {
        let lines = self.lock_lines()?;
        lines
            .get(line_id)
            .and_then(|l| l.slots.iter().find(|s| s.id == slot_id))
            .cloned()
            .ok_or_else(|| slot_not_found(line_id, slot_id))
    }

    pub fn line_ids(&self) -> EngineResult<Vec<String>> {
        let mut ids: Vec<String> = self.lock_lines()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    /// 产线是否有提交进行中
    pub fn has_in_flight(&self, line_id: &str) -> EngineResult<bool> {
        Ok(self.in_flight_slot(line_id)?.is_some())
    }

    /// 产线提交进行中的任一时段ID
    pub fn in_flight_slot(&self, line_id: &str) -> EngineResult<Option<String>> {
        Ok(self
            .lock_lines()?
            .get(line_id)
            .and_then(|l| l.in_flight.iter().next().cloned()))
    }

    // ==========================================
    // 时段集合替换
    // ==========================================

    /// 以换模结果替换产线时段集合
    ///
    /// # 校验
    /// - 产线无提交进行中
    /// - 现有已提交时段全部原样出现在新集合中
    /// - 新集合时段唯一且按规范顺序
    pub fn replace_slots(&self, line_id: &str, slots: Vec<Slot<K::Detail>>) -> EngineResult<()> {
        check_canonical_order(&slots)?;

        let mut lines = self.lock_lines()?;
        let ledger = lines.entry(line_id.to_string()).or_default();

        if let Some(slot_id) = ledger.in_flight.iter().next() {
            return Err(EngineError::SubmitInFlight {
                line_id: line_id.to_string(),
                slot_id: slot_id.clone(),
            });
        }

        for locked in ledger.slots.iter().filter(|s| s.locked) {
            if !slots.iter().any(|s| s == locked) {
                error!(
                    line_id = line_id,
                    slot_id = locked.id.as_str(),
                    "新时段集合缺少已提交时段, 拒绝替换"
                );
                return Err(EngineError::SlotLocked {
                    line_id: line_id.to_string(),
                    slot_id: locked.id.clone(),
                });
            }
        }

        ledger.slots = slots;
        Ok(())
    }

    /// 合并从存储重建的已提交时段
    ///
    /// # 规则
    /// - 内存中已提交的时段保留 (同时段以内存为准)
    /// - 内存中未提交的时段丢弃
    ///
    /// # 返回
    /// 合并后的时段数
    pub fn restore_line(
        &self,
        line_id: &str,
        restored: Vec<Slot<K::Detail>>,
    ) -> EngineResult<usize> {
        let mut lines = self.lock_lines()?;
        let ledger = lines.entry(line_id.to_string()).or_default();

        if let Some(slot_id) = ledger.in_flight.iter().next() {
            return Err(EngineError::SubmitInFlight {
                line_id: line_id.to_string(),
                slot_id: slot_id.clone(),
            });
        }

        let mut merged: Vec<Slot<K::Detail>> =
            ledger.slots.iter().filter(|s| s.locked).cloned().collect();
        let held: HashSet<TimeWindow> = merged.iter().map(|s| s.time_window).collect();
        merged.extend(
            restored
                .into_iter()
                .filter(|s| s.locked && !held.contains(&s.time_window)),
        );
        merged.sort_by_key(|s| s.time_window);

        ledger.slots = merged;
        Ok(ledger.slots.len())
    }

    /// 清空全部产线 (生产日重置)
    ///
    /// # 返回
    /// 被清空的产线ID
    pub fn clear_all(&self) -> EngineResult<Vec<String>> {
        let mut lines = self.lock_lines()?;
        let mut ids: Vec<String> = lines.keys().cloned().collect();
        ids.sort();
        lines.clear();
        Ok(ids)
    }

    // ==========================================
    // 录入 (仅未提交时段)
    // ==========================================

    /// 修改未提交时段并重算均值
    ///
    /// # 返回
    /// - Err(SlotLocked): 时段已提交, 不做任何修改
    /// - Err(SubmitInFlight): 时段提交进行中
    fn update_slot<R>(
        &self,
        line_id: &str,
        slot_id: &str,
        mutate: impl FnOnce(&mut Slot<K::Detail>) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut lines = self.lock_lines()?;
        let ledger = lines
            .get_mut(line_id)
            .ok_or_else(|| slot_not_found(line_id, slot_id))?;

        if ledger.in_flight.contains(slot_id) {
            return Err(EngineError::SubmitInFlight {
                line_id: line_id.to_string(),
                slot_id: slot_id.to_string(),
            });
        }

        let slot = ledger
            .slots
            .iter_mut()
            .find(|s| s.id == slot_id)
            .ok_or_else(|| slot_not_found(line_id, slot_id))?;

        if slot.locked {
            warn!(line_id = line_id, slot_id = slot_id, "拒绝修改已提交时段");
            return Err(EngineError::SlotLocked {
                line_id: line_id.to_string(),
                slot_id: slot_id.to_string(),
            });
        }

        let result = mutate(slot)?;
        slot.average_value = self.aggregator.average(slot);
        Ok(result)
    }

    /// 录入单穴测量值
    pub fn set_cavity_value(
        &self,
        line_id: &str,
        slot_id: &str,
        position: usize,
        value: Option<f64>,
    ) -> EngineResult<()> {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(EngineError::Validation(format!("测量值无效: {}", v)));
            }
        }

        self.update_slot(line_id, slot_id, |slot| {
            let positions = slot.measurements.len();
            let entry = slot
                .measurements
                .get_mut(position)
                .ok_or_else(|| EngineError::CavityOutOfRange {
                    slot_id: slot_id.to_string(),
                    position,
                    positions,
                })?;
            entry.value = value;
            debug!(
                line_id = line_id,
                slot_id = slot_id,
                position = position,
                value = ?value,
                "录入穴位测量值"
            );
            Ok(())
        })
    }

    /// 录入单穴扩展字段
    pub fn set_cavity_detail(
        &self,
        line_id: &str,
        slot_id: &str,
        position: usize,
        detail: K::Detail,
    ) -> EngineResult<()> {
        self.update_slot(line_id, slot_id, |slot| {
            let positions = slot.measurements.len();
            let entry = slot
                .measurements
                .get_mut(position)
                .ok_or_else(|| EngineError::CavityOutOfRange {
                    slot_id: slot_id.to_string(),
                    position,
                    positions,
                })?;
            entry.detail = detail;
            Ok(())
        })
    }

    pub fn set_cycle_time(&self, line_id: &str, slot_id: &str, cycle_time: f64) -> EngineResult<()> {
        if !cycle_time.is_finite() || cycle_time < 0.0 {
            return Err(EngineError::Validation(format!("成型周期无效: {}", cycle_time)));
        }
        self.update_slot(line_id, slot_id, |slot| {
            slot.cycle_time = cycle_time;
            Ok(())
        })
    }

    pub fn set_notes(&self, line_id: &str, slot_id: &str, notes: &str) -> EngineResult<()> {
        self.update_slot(line_id, slot_id, |slot| {
            slot.notes = notes.to_string();
            Ok(())
        })
    }

    /// 激活且未录入的穴位填入标准值
    ///
    /// # 返回
    /// 被填充的穴位数 (已录入值不覆盖)
    pub fn fill_active_cavities(
        &self,
        line_id: &str,
        slot_id: &str,
        standard: f64,
    ) -> EngineResult<usize> {
        self.update_slot(line_id, slot_id, |slot| {
            let mut filled = 0;
            for entry in slot
                .measurements
                .iter_mut()
                .filter(|e| e.is_active && e.value.is_none())
            {
                entry.value = Some(standard);
                filled += 1;
            }
            Ok(filled)
        })
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 提交时段
    ///
    /// # 流程
    /// 1. 校验: 已提交 → AlreadyLocked; 提交中 → SubmitInFlight; 数据校验
    /// 2. 标记提交中, 生成提交记录
    /// 3. 写入存储 (不持有状态锁)
    /// 4. 写入成功 → 置为已提交; 写入失败 → 清除提交中标记, 时段保持未提交
    pub async fn submit(
        &self,
        line_id: &str,
        slot_id: &str,
        submitted_by: &str,
    ) -> EngineResult<SubmittedSlotRecord> {
        // 1-2. 校验并标记提交中
        let record = {
            let mut lines = self.lock_lines()?;
            let ledger = lines
                .get_mut(line_id)
                .ok_or_else(|| slot_not_found(line_id, slot_id))?;

            let slot = ledger
                .slots
                .iter()
                .find(|s| s.id == slot_id)
                .ok_or_else(|| slot_not_found(line_id, slot_id))?;

            if slot.locked {
                debug!(line_id = line_id, slot_id = slot_id, "重复提交, 忽略");
                return Err(EngineError::AlreadyLocked {
                    line_id: line_id.to_string(),
                    slot_id: slot_id.to_string(),
                });
            }
            if ledger.in_flight.contains(slot_id) {
                return Err(EngineError::SubmitInFlight {
                    line_id: line_id.to_string(),
                    slot_id: slot_id.to_string(),
                });
            }
            if self.require_active_measurement && !slot.has_active_measurement() {
                return Err(EngineError::Validation(format!(
                    "时段 {} 至少需要一个激活穴位的测量值",
                    slot.time_window
                )));
            }

            let record = self.build_record(line_id, slot, submitted_by)?;
            record.validate().map_err(EngineError::Validation)?;

            ledger.in_flight.insert(slot_id.to_string());
            record
        };

        // 3. 写入存储
        let write_result = self.store.insert_submission(&record).await;

        // 4. 按写入结果更新内存
        let mut lines = self.lock_lines()?;
        let ledger = lines.get_mut(line_id);

        match write_result {
            Ok(submission_id) => {
                match ledger.and_then(|l| {
                    l.in_flight.remove(slot_id);
                    l.slots.iter_mut().find(|s| s.id == slot_id)
                }) {
                    Some(slot) => {
                        slot.locked = true;
                        slot.submitted_by = Some(record.submitted_by.clone());
                        slot.submitted_at = Some(record.submitted_at);
                    }
                    None => {
                        // 提交期间产线状态被重置, 记录已持久化
                        warn!(
                            line_id = line_id,
                            slot_id = slot_id,
                            "提交完成时时段已不在台账中"
                        );
                    }
                }
                info!(
                    line_id = line_id,
                    slot_id = slot_id,
                    submission_id = submission_id.as_str(),
                    time_window = %record.time_window,
                    average = record.average_value,
                    "时段提交成功"
                );
                Ok(record)
            }
            Err(e) => {
                if let Some(l) = ledger {
                    l.in_flight.remove(slot_id);
                }
                error!(
                    line_id = line_id,
                    slot_id = slot_id,
                    error = %e,
                    "时段提交写入失败, 保持未提交"
                );
                Err(EngineError::Storage(e))
            }
        }
    }

    /// 由时段生成提交记录
    fn build_record(
        &self,
        line_id: &str,
        slot: &Slot<K::Detail>,
        submitted_by: &str,
    ) -> EngineResult<SubmittedSlotRecord> {
        let submitted_at = Local::now().naive_local();

        let cavity_details = slot
            .active_entries()
            .map(|e| {
                Ok(CavityRecord {
                    position: e.position,
                    value: e.value,
                    detail: serde_json::to_value(&e.detail)
                        .map_err(|err| EngineError::Validation(format!("穴位明细序列化失败: {}", err)))?,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(SubmittedSlotRecord {
            submission_id: Uuid::new_v4().to_string(),
            report_kind: K::REPORT_KIND,
            line_id: line_id.to_string(),
            slot_id: slot.id.clone(),
            tool_id: slot.tool_id.clone(),
            tool_name: slot.tool_name.clone(),
            production_date: self.production_day.date,
            time_window: slot.time_window,
            start_time: slot.time_window.start_time(),
            end_time: slot.time_window.end_time(),
            cycle_time: slot.cycle_time,
            cavity_values: slot.active_values(),
            cavity_details,
            average_value: SubmittedSlotRecord::round_average(self.aggregator.average(slot)),
            is_changeover_point: slot.is_changeover_point,
            previous_tool_name: slot.previous_tool_name.clone(),
            changeover_at: slot.is_changeover_point.then_some(submitted_at),
            notes: slot.notes.clone(),
            submitted_by: submitted_by.to_string(),
            submitted_at,
        })
    }
}

fn slot_not_found(line_id: &str, slot_id: &str) -> EngineError {
    EngineError::SlotNotFound {
        line_id: line_id.to_string(),
        slot_id: slot_id.to_string(),
    }
}

/// 时段唯一且按规范顺序
fn check_canonical_order<D>(slots: &[Slot<D>]) -> EngineResult<()> {
    if slots
        .windows(2)
        .all(|pair| pair[0].time_window < pair[1].time_window)
    {
        Ok(())
    } else {
        Err(EngineError::Validation(
            "时段集合必须唯一且按规范顺序排列".to_string(),
        ))
    }
}
