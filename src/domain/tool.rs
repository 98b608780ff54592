// ==========================================
// 注塑生产时段追踪 - 模具 (Tool / Mold) 领域模型
// ==========================================
// 说明: 模具主数据由外部维护, 引擎只读取
// ==========================================

use serde::{Deserialize, Serialize};

/// 未配置标准单重时的回退值 (g)
pub const DEFAULT_STD_WEIGHT_G: f64 = 100.0;

/// 未配置成型周期时的回退值 (s)
pub const DEFAULT_CYCLE_TIME_S: f64 = 30.0;

/// 时段穴位数下限 (界面列数稳定)
pub const MIN_CAVITY_POSITIONS: usize = 8;

// ==========================================
// Tool - 模具
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub tool_id: String,   // 模具ID
    pub tool_name: String, // 模具名称
    pub cavity_count: usize, // 穴数

    pub std_weight: f64,         // 标准单重 (g), 穴重追踪使用
    pub int_weight: f64,         // 首件初始重量 (g), 首件确认使用
    pub default_cycle_time: f64, // 默认成型周期 (s)

    pub description: String, // 产品描述
}

impl Tool {
    /// 创建模具
    ///
    /// 未提供的标准值使用回退值 (100g / 30s)
    pub fn new(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        cavity_count: usize,
        std_weight: Option<f64>,
        default_cycle_time: Option<f64>,
    ) -> Self {
        let std_weight = std_weight.unwrap_or(DEFAULT_STD_WEIGHT_G);
        Self {
            tool_id: tool_id.into(),
            tool_name: tool_name.into(),
            cavity_count,
            std_weight,
            int_weight: std_weight,
            default_cycle_time: default_cycle_time.unwrap_or(DEFAULT_CYCLE_TIME_S),
            description: String::new(),
        }
    }

    pub fn with_int_weight(mut self, int_weight: f64) -> Self {
        self.int_weight = int_weight;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 穴位是否被该模具实际使用
    pub fn uses_position(&self, position: usize) -> bool {
        position < self.cavity_count
    }
}

// ==========================================
// ToolMaster - 模具主数据行
// ==========================================
// 外部主数据原样传入, 缺失的标准值由引擎配置回退值补齐
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMaster {
    pub tool_id: String,
    pub tool_name: String,
    pub cavity_count: usize,
    pub std_weight: Option<f64>,
    pub int_weight: Option<f64>, // 缺失时取标准单重
    pub default_cycle_time: Option<f64>,
    pub description: String,
}

impl ToolMaster {
    pub fn new(tool_id: impl Into<String>, tool_name: impl Into<String>, cavity_count: usize) -> Self {
        Self {
            tool_id: tool_id.into(),
            tool_name: tool_name.into(),
            cavity_count,
            ..Self::default()
        }
    }
}

// ==========================================
// ToolCatalog - 模具目录
// ==========================================
// 用途: 计算全局最大穴数, 按ID/名称查找模具
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
    min_cavity_positions: usize,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ToolCatalog {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            min_cavity_positions: MIN_CAVITY_POSITIONS,
        }
    }

    /// 覆写穴位数下限
    pub fn with_min_cavity_positions(mut self, min_cavity_positions: usize) -> Self {
        self.min_cavity_positions = min_cavity_positions;
        self
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, tool_id: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.tool_id == tool_id)
    }

    pub fn find_by_name(&self, tool_name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.tool_name == tool_name)
    }

    /// 时段分配的穴位数
    ///
    /// # 返回
    /// max(所有模具的最大穴数, 下限)
    pub fn max_cavity_positions(&self) -> usize {
        self.tools
            .iter()
            .map(|t| t.cavity_count)
            .max()
            .unwrap_or(0)
            .max(self.min_cavity_positions)
    }
}
