// ==========================================
// 注塑生产时段追踪 - 穴位测量聚合器
// ==========================================
// 职责: 由时段各穴测量值计算产线级均值, 并按标准值判定公差
// 输入: 时段 + 标准值
// 输出: 均值 + 公差判定
// 红线: 纯函数, 仅依赖当前时段状态
// ==========================================

use crate::domain::slot::Slot;
use crate::domain::types::ToleranceClass;
use serde::{Deserialize, Serialize};

/// 默认公差带 (±0.5)
pub const DEFAULT_TOLERANCE_BAND: f64 = 0.5;

// ==========================================
// MeasurementAggregate - 聚合结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementAggregate {
    pub average: f64,
    pub classification: ToleranceClass,
    pub sample_count: usize, // 参与均值的穴数
}

impl MeasurementAggregate {
    pub fn no_data() -> Self {
        Self {
            average: 0.0,
            classification: ToleranceClass::NoData,
            sample_count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.sample_count > 0
    }
}

// ==========================================
// CavityMeasurementAggregator - 聚合器
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct CavityMeasurementAggregator {
    tolerance_band: f64,
}

impl Default for CavityMeasurementAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_BAND)
    }
}

impl CavityMeasurementAggregator {
    pub fn new(tolerance_band: f64) -> Self {
        Self { tolerance_band }
    }

    pub fn tolerance_band(&self) -> f64 {
        self.tolerance_band
    }

    /// 聚合时段测量值
    ///
    /// # 规则
    /// - 仅激活穴位参与
    /// - 未录入 (None) 的穴位不计入均值, 不按 0 处理
    /// - 无任何有效值 → 均值 0, 判定 NoData
    pub fn aggregate<D>(&self, slot: &Slot<D>, standard: f64) -> MeasurementAggregate {
        let values = slot.active_values();
        if values.is_empty() {
            return MeasurementAggregate::no_data();
        }

        let average = values.iter().sum::<f64>() / values.len() as f64;
        MeasurementAggregate {
            average,
            classification: self.classify(average, standard),
            sample_count: values.len(),
        }
    }

    /// 仅计算均值 (无数据时为 0)
    pub fn average<D>(&self, slot: &Slot<D>) -> f64 {
        let values = slot.active_values();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// 公差判定
    ///
    /// # 规则
    /// - |avg - std| == 0 → Exact
    /// - 0 < |avg - std| <= 公差带 → WithinTolerance
    /// - |avg - std| > 公差带 → OutOfTolerance
    pub fn classify(&self, average: f64, standard: f64) -> ToleranceClass {
        let diff = (average - standard).abs();
        if diff == 0.0 {
            ToleranceClass::Exact
        } else if diff <= self.tolerance_band {
            ToleranceClass::WithinTolerance
        } else {
            ToleranceClass::OutOfTolerance
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::slot::CavityEntry;
    use crate::domain::tool::Tool;
    use crate::domain::types::TimeWindow;

    fn slot_with(values: &[(Option<f64>, bool)]) -> Slot<()> {
        let tool = Tool::new("T1", "Cap", values.len(), Some(12.0), None);
        let measurements = values
            .iter()
            .enumerate()
            .map(|(position, (value, is_active))| CavityEntry {
                position,
                value: *value,
                is_active: *is_active,
                detail: (),
            })
            .collect();
        Slot::new("s1".to_string(), TimeWindow::H08, &tool, measurements)
    }

    #[test]
    fn test_null_entries_excluded_from_mean() {
        let slot = slot_with(&[
            (Some(10.0), true),
            (None, true),
            (Some(12.0), true),
            (Some(14.0), true),
        ]);
        let aggregator = CavityMeasurementAggregator::default();

        let exact = aggregator.aggregate(&slot, 12.0);
        assert_eq!(exact.average, 12.0);
        assert_eq!(exact.sample_count, 3);
        assert_eq!(exact.classification, ToleranceClass::Exact);

        assert_eq!(
            aggregator.aggregate(&slot, 11.6).classification,
            ToleranceClass::WithinTolerance
        );
        assert_eq!(
            aggregator.aggregate(&slot, 10.0).classification,
            ToleranceClass::OutOfTolerance
        );
    }

    #[test]
    fn test_inactive_entries_excluded() {
        let slot = slot_with(&[(Some(10.0), true), (Some(500.0), false), (Some(14.0), true)]);
        let aggregate = CavityMeasurementAggregator::default().aggregate(&slot, 12.0);
        assert_eq!(aggregate.average, 12.0);
        assert_eq!(aggregate.sample_count, 2);
    }

    #[test]
    fn test_no_data() {
        let slot = slot_with(&[(None, true), (Some(7.0), false)]);
        let aggregate = CavityMeasurementAggregator::default().aggregate(&slot, 12.0);
        assert_eq!(aggregate, MeasurementAggregate::no_data());
        assert!(!aggregate.has_data());
    }

    #[test]
    fn test_tolerance_boundary_inclusive() {
        let aggregator = CavityMeasurementAggregator::default();
        assert_eq!(aggregator.classify(100.5, 100.0), ToleranceClass::WithinTolerance);
        assert_eq!(aggregator.classify(99.5, 100.0), ToleranceClass::WithinTolerance);
        assert_eq!(aggregator.classify(100.75, 100.0), ToleranceClass::OutOfTolerance);
    }

    #[test]
    fn test_custom_band() {
        let aggregator = CavityMeasurementAggregator::new(1.0);
        assert_eq!(aggregator.classify(100.75, 100.0), ToleranceClass::WithinTolerance);
    }

    #[test]
    fn test_average_only() {
        let slot = slot_with(&[(Some(1.0), true), (Some(2.0), true)]);
        assert_eq!(CavityMeasurementAggregator::default().average(&slot), 1.5);
        assert_eq!(CavityMeasurementAggregator::default().average(&slot_with(&[(None, true)])), 0.0);
    }
}
