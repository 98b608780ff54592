// ==========================================
// 注塑生产时段追踪 - 引擎层
// ==========================================
// 职责: 时段生成、模具独占、换模、均值判定、提交锁定
// 红线: Engine 不拼 SQL, 存储通过 SlotRecordStore 注入
// ==========================================

pub mod aggregator;
pub mod changeover;
pub mod error;
pub mod ledger;
pub mod mold_assignment;
pub mod session;
pub mod slot_calendar;
pub mod store;

// 重导出核心引擎
pub use aggregator::{CavityMeasurementAggregator, MeasurementAggregate, DEFAULT_TOLERANCE_BAND};
pub use changeover::{ChangeoverController, ChangeoverKind, ChangeoverPlan};
pub use error::{EngineError, EngineResult};
pub use ledger::SlotSubmissionLedger;
pub use mold_assignment::MoldAssignmentRegistry;
pub use session::{ChangeoverOutcome, LineRestore, ProductionDaySession, SubmitOutcome};
pub use slot_calendar::SlotCalendar;
pub use store::SlotRecordStore;
