// ==========================================
// 注塑生产时段追踪 - 应用层
// ==========================================
// 职责: 组装数据库、配置、登记表与仓储, 为各检验流程打开会话
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
