// ==========================================
// 注塑生产时段追踪 - 应用状态
// ==========================================
// 职责: 管理共享连接、配置、模具分配登记表与仓储
// 说明: 登记表进程级唯一, 两种检验流程的会话共享同一登记表
// ==========================================

use crate::config::{ConfigManager, EngineConfig};
use crate::db::{init_schema, open_sqlite_connection, read_schema_version, CURRENT_SCHEMA_VERSION};
use crate::domain::measurement::MeasurementKind;
use crate::domain::production_day::ProductionDay;
use crate::domain::tool::ToolMaster;
use crate::engine::mold_assignment::MoldAssignmentRegistry;
use crate::engine::session::ProductionDaySession;
use crate::engine::store::SlotRecordStore;
use crate::repository::SlotSubmissionRepository;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

// ==========================================
// AppState - 应用状态
// ==========================================
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 启动时加载的引擎配置
    pub engine_config: EngineConfig,

    /// 模具分配登记表
    pub registry: Arc<MoldAssignmentRegistry>,

    /// 时段提交仓储
    pub submission_repo: Arc<SlotSubmissionRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径 (不存在则创建并建表)
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;

        match read_schema_version(&conn) {
            Ok(Some(v)) if v == CURRENT_SCHEMA_VERSION => {}
            Ok(v) => tracing::warn!(
                found = ?v,
                expected = CURRENT_SCHEMA_VERSION,
                "schema_version 与当前代码不一致"
            ),
            Err(e) => tracing::warn!("读取 schema_version 失败: {}", e),
        }

        let conn = Arc::new(Mutex::new(conn));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let engine_config = config_manager
            .load_engine_config()
            .map_err(|e| format!("引擎配置加载失败: {}", e))?;

        let submission_repo = Arc::new(SlotSubmissionRepository::new(conn.clone()));

        tracing::info!(
            tolerance_band = engine_config.tolerance_band,
            min_cavity_positions = engine_config.min_cavity_positions,
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            conn,
            config_manager,
            engine_config,
            registry: Arc::new(MoldAssignmentRegistry::new()),
            submission_repo,
        })
    }

    /// 打开某检验流程在指定生产日的会话
    ///
    /// # 参数
    /// - `production_day`: 生产日
    /// - `masters`: 模具主数据 (缺失的标准重量/周期与穴位数下限取当前引擎配置)
    pub fn open_session<K: MeasurementKind>(
        &self,
        production_day: ProductionDay,
        masters: &[ToolMaster],
    ) -> ProductionDaySession<K> {
        let catalog = self.engine_config.build_catalog(masters);
        let store: Arc<dyn SlotRecordStore> = self.submission_repo.clone();
        ProductionDaySession::new(
            production_day,
            Arc::new(catalog),
            self.registry.clone(),
            store,
            self.engine_config.clone(),
        )
    }

    /// 重新加载引擎配置 (对之后打开的会话生效)
    pub fn reload_engine_config(&mut self) -> Result<(), String> {
        self.engine_config = self
            .config_manager
            .load_engine_config()
            .map_err(|e| format!("引擎配置加载失败: {}", e))?;
        Ok(())
    }
}

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 MOLDING_SHIFT_TRACKER_DB_PATH (非空时)
/// - 开发环境: 用户数据目录/molding-shift-tracker-dev/molding_shift_tracker.db
/// - 生产环境: 用户数据目录/molding-shift-tracker/molding_shift_tracker.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("MOLDING_SHIFT_TRACKER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./molding_shift_tracker.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("molding-shift-tracker-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("molding-shift-tracker");
        }

        // 确保目录存在
        std::fs::create_dir_all(&path).ok();
        path = path.join("molding_shift_tracker.db");
    }

    path.to_string_lossy().to_string()
}
