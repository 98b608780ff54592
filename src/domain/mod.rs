// ==========================================
// 注塑生产时段追踪 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、测量类型接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod measurement;
pub mod production_day;
pub mod slot;
pub mod submission;
pub mod tool;
pub mod types;

// 重导出核心类型
pub use measurement::{
    CavityWeightTrail, DimensionalDetail, FirstPiecesApproval, MeasurementKind, Quadrant,
    WallThicknessReading,
};
pub use production_day::ProductionDay;
pub use slot::{CavityEntry, LineAssignment, Slot};
pub use submission::{CavityRecord, LineMoldAssignmentRecord, SubmittedSlotRecord};
pub use tool::{Tool, ToolCatalog, ToolMaster};
pub use types::{ReportKind, Shift, SlotStatus, TimeWindow, ToleranceClass};
