// ==========================================
// 注塑生产时段追踪 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::engine_config::EngineConfig;
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (存在则覆盖)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(config_key = key, value = value, "更新全局配置");
        Ok(())
    }

    /// 读取并解析配置值, 缺失时使用默认值
    ///
    /// # 返回
    /// - Err: 配置存在但无法解析 (不静默回退)
    fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| {
                tracing::error!(config_key = key, raw_value = %raw, "配置值无法解析");
                format!("配置项 {} 的值 '{}' 无法解析: {}", key, raw, e).into()
            }),
        }
    }

    /// 加载引擎配置
    ///
    /// # 规则
    /// - 缺失的键使用默认值
    /// - 无法解析或不合法的值返回错误
    pub fn load_engine_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            tolerance_band: self.get_parsed_or(config_keys::TOLERANCE_BAND, defaults.tolerance_band)?,
            min_cavity_positions: self
                .get_parsed_or(config_keys::MIN_CAVITY_POSITIONS, defaults.min_cavity_positions)?,
            default_std_weight: self
                .get_parsed_or(config_keys::DEFAULT_STD_WEIGHT, defaults.default_std_weight)?,
            default_cycle_time_s: self
                .get_parsed_or(config_keys::DEFAULT_CYCLE_TIME_S, defaults.default_cycle_time_s)?,
            require_active_measurement: self.get_parsed_or(
                config_keys::REQUIRE_ACTIVE_MEASUREMENT,
                defaults.require_active_measurement,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 公差判定
    pub const TOLERANCE_BAND: &str = "slot_tracking/tolerance_band";

    // 时段生成
    pub const MIN_CAVITY_POSITIONS: &str = "slot_tracking/min_cavity_positions";

    // 模具主数据回退值
    pub const DEFAULT_STD_WEIGHT: &str = "slot_tracking/default_std_weight";
    pub const DEFAULT_CYCLE_TIME_S: &str = "slot_tracking/default_cycle_time_s";

    // 提交校验
    pub const REQUIRE_ACTIVE_MEASUREMENT: &str = "slot_tracking/require_active_measurement";
}
