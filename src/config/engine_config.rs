// ==========================================
// 注塑生产时段追踪 - 引擎配置
// ==========================================
// 存储: config_kv (scope_id = 'global'), 键见 config_keys
// ==========================================

use crate::domain::tool::{
    Tool, ToolCatalog, ToolMaster, DEFAULT_CYCLE_TIME_S, DEFAULT_STD_WEIGHT_G, MIN_CAVITY_POSITIONS,
};
use crate::engine::aggregator::DEFAULT_TOLERANCE_BAND;
use serde::{Deserialize, Serialize};

// ==========================================
// EngineConfig - 引擎参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub tolerance_band: f64,              // 公差带 (±)
    pub min_cavity_positions: usize,      // 时段穴位数下限
    pub default_std_weight: f64,          // 模具未配置标准重量时的回退值 (g)
    pub default_cycle_time_s: f64,        // 模具未配置成型周期时的回退值 (s)
    pub require_active_measurement: bool, // 提交时要求至少一个激活穴位有值
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerance_band: DEFAULT_TOLERANCE_BAND,
            min_cavity_positions: MIN_CAVITY_POSITIONS,
            default_std_weight: DEFAULT_STD_WEIGHT_G,
            default_cycle_time_s: DEFAULT_CYCLE_TIME_S,
            require_active_measurement: true,
        }
    }
}

impl EngineConfig {
    /// 参数合法性校验
    pub fn validate(&self) -> Result<(), String> {
        if !self.tolerance_band.is_finite() || self.tolerance_band < 0.0 {
            return Err(format!("公差带无效: {}", self.tolerance_band));
        }
        if self.min_cavity_positions == 0 {
            return Err("穴位数下限必须大于 0".to_string());
        }
        if !self.default_std_weight.is_finite() || self.default_std_weight <= 0.0 {
            return Err(format!("默认标准重量无效: {}", self.default_std_weight));
        }
        if !self.default_cycle_time_s.is_finite() || self.default_cycle_time_s <= 0.0 {
            return Err(format!("默认成型周期无效: {}", self.default_cycle_time_s));
        }
        Ok(())
    }

    /// 按配置回退值构造模具 (模具主数据缺少标准重量/周期时)
    pub fn build_tool(&self, master: &ToolMaster) -> Tool {
        let std_weight = master.std_weight.unwrap_or(self.default_std_weight);
        Tool::new(
            master.tool_id.clone(),
            master.tool_name.clone(),
            master.cavity_count,
            Some(std_weight),
            Some(master.default_cycle_time.unwrap_or(self.default_cycle_time_s)),
        )
        .with_int_weight(master.int_weight.unwrap_or(std_weight))
        .with_description(master.description.clone())
    }

    /// 由模具主数据构造会话目录 (回退值与穴位数下限取自配置)
    pub fn build_catalog(&self, masters: &[ToolMaster]) -> ToolCatalog {
        ToolCatalog::new(masters.iter().map(|m| self.build_tool(m)).collect())
            .with_min_cavity_positions(self.min_cavity_positions)
    }
}
