// ==========================================
// 注塑生产时段追踪 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 注塑车间按生产日、按产线的两小时检验时段追踪
//           (穴重追踪 / 首件确认)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ReportKind, Shift, SlotStatus, TimeWindow, ToleranceClass};

// 领域实体
pub use domain::{
    CavityEntry, CavityWeightTrail, DimensionalDetail, FirstPiecesApproval, LineAssignment,
    MeasurementKind, ProductionDay, Slot, SubmittedSlotRecord, Tool, ToolCatalog, ToolMaster,
};

// 引擎
pub use engine::{
    CavityMeasurementAggregator, ChangeoverController, EngineError, EngineResult,
    MoldAssignmentRegistry, ProductionDaySession, SlotCalendar, SlotRecordStore,
    SlotSubmissionLedger, SubmitOutcome,
};

// 配置
pub use config::{ConfigManager, EngineConfig};

// 应用
pub use app::AppState;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "注塑生产时段追踪";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";
