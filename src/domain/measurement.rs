// ==========================================
// 注塑生产时段追踪 - 测量类型
// ==========================================
// 职责: 统一"班次穴重追踪"与"首件尺寸确认"两种流程
// 说明: 引擎对测量类型泛型化, 流程差异只体现在:
//       1) 每穴扩展字段 (Detail)
//       2) 聚合所对比的标准值
//       3) 存储鉴别字段 (ReportKind)
// ==========================================

use crate::domain::tool::Tool;
use crate::domain::types::ReportKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

// ==========================================
// Trait: MeasurementKind
// ==========================================
pub trait MeasurementKind: Send + Sync + 'static {
    /// 每穴扩展字段
    type Detail: Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// 存储鉴别字段
    const REPORT_KIND: ReportKind;

    /// 聚合对比的标准值
    fn standard_value(tool: &Tool) -> f64;

    /// 生成时段时的每穴初始扩展字段
    fn new_detail(_tool: &Tool, _position: usize) -> Self::Detail {
        Self::Detail::default()
    }
}

// ==========================================
// CavityWeightTrail - 班次穴重追踪
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct CavityWeightTrail;

impl MeasurementKind for CavityWeightTrail {
    type Detail = ();

    const REPORT_KIND: ReportKind = ReportKind::CavityWeight;

    fn standard_value(tool: &Tool) -> f64 {
        tool.std_weight
    }
}

// ==========================================
// FirstPiecesApproval - 首件尺寸确认
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstPiecesApproval;

impl MeasurementKind for FirstPiecesApproval {
    type Detail = DimensionalDetail;

    const REPORT_KIND: ReportKind = ReportKind::FirstPieces;

    /// 首件以初始重量为标准
    fn standard_value(tool: &Tool) -> f64 {
        tool.int_weight
    }

    fn new_detail(tool: &Tool, _position: usize) -> DimensionalDetail {
        DimensionalDetail {
            fitment: vec![false; tool.cavity_count],
            ..DimensionalDetail::default()
        }
    }
}

// ==========================================
// 壁厚测量象限
// ==========================================
// 每件制品切成 4 个象限 (X1, X2, Y1, Y2) 测壁厚
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    X1,
    X2,
    Y1,
    Y2,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::X1, Quadrant::X2, Quadrant::Y1, Quadrant::Y2];
}

/// 单象限壁厚读数
///
/// points 依次为 A 顶部 / B 底部 / C 中部 / D 一阶 / E 堆叠区 / F 底座 / G 底部圆角
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallThicknessReading {
    pub quadrant: Quadrant,
    pub points: [f64; 7],
}

impl WallThicknessReading {
    pub fn empty(quadrant: Quadrant) -> Self {
        Self {
            quadrant,
            points: [0.0; 7],
        }
    }

    /// 按测点字母取值 ('A'..='G')
    pub fn point(&self, label: char) -> Option<f64> {
        let idx = (label.to_ascii_uppercase() as usize).checked_sub('A' as usize)?;
        self.points.get(idx).copied()
    }
}

// ==========================================
// DimensionalDetail - 首件每穴尺寸明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionalDetail {
    pub surface_finish: String,
    pub volume: Option<f64>,
    pub length_inner_dia: Option<f64>,
    pub breadth_outer_dia: Option<f64>,
    pub height: Option<f64>,
    pub fitment: Vec<bool>, // 与各穴的配合检查
    pub leakage_test: String,
    pub remarks: String,
    pub wall_thickness: Vec<WallThicknessReading>,
}

impl Default for DimensionalDetail {
    fn default() -> Self {
        Self {
            surface_finish: String::new(),
            volume: None,
            length_inner_dia: None,
            breadth_outer_dia: None,
            height: None,
            fitment: Vec::new(),
            leakage_test: String::new(),
            remarks: String::new(),
            wall_thickness: Quadrant::ALL
                .iter()
                .map(|q| WallThicknessReading::empty(*q))
                .collect(),
        }
    }
}

impl DimensionalDetail {
    /// 配合检查是否全部通过
    pub fn fitment_passed(&self) -> bool {
        !self.fitment.is_empty() && self.fitment.iter().all(|f| *f)
    }
}
