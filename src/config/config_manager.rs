// ==========================================
// 应收账款催收系统 - 配置管理器
// ==========================================
// 依据: Dunning_Engine_Specs_v1.0.md - 9. 配置项全集
// ==========================================
// 职责: 配置加载、查询、快照
// 存储: config_kv 表 (key-value + scope)
// 口径: 不缓存,每次读取都打到库,改库即生效
// ==========================================

use crate::config::dunning_config_trait::DunningConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 按路径独立开一条连接(调参工具用)
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 挂到已有共享连接上
    ///
    /// 说明: 为保证连接行为一致,对传入连接再应用一次统一 PRAGMA(幂等)。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Box<dyn Error>> {
        self.conn
            .lock()
            .map_err(|e| format!("锁获取失败: {}", e).into())
    }

    /// 读 global scope 配置值,缺省为 None
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值(公开方法,供其他模块复用)
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入/覆盖 global scope 配置值(UPSERT)
    ///
    /// # 用途
    /// - CLI 调参与测试准备数据
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now', 'localtime')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 全部 global 配置的 JSON 快照
    ///
    /// # 用途
    /// - 运行日志记录本次运行的有效参数,便于排障
    ///
    /// # 说明
    /// - BTreeMap 保证键序稳定,两次快照可直接文本比对
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global'")?;

        let mut snapshot: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            snapshot.insert(key, value);
        }

        Ok(serde_json::to_string(&snapshot)?)
    }
}

// ==========================================
// DunningConfigReader Trait 实现
// ==========================================
#[async_trait]
impl DunningConfigReader for ConfigManager {
    // ===== 分片与并发 =====

    async fn get_dispatch_chunk_size(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DISPATCH_CHUNK_SIZE, "100")?;
        let n = value.parse::<usize>().unwrap_or(100);
        Ok(if n == 0 { 100 } else { n })
    }

    async fn get_dispatch_max_concurrency(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DISPATCH_MAX_CONCURRENCY, "4")?;
        let n = value.parse::<usize>().unwrap_or(4);
        // 并发上限钳制,避免把外部投递服务打垮
        Ok(n.clamp(1, 8))
    }

    async fn get_reassign_chunk_size(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::REASSIGN_CHUNK_SIZE, "200")?;
        let n = value.parse::<usize>().unwrap_or(200);
        Ok(if n == 0 { 200 } else { n })
    }

    // ===== 外部投递 =====

    async fn get_delivery_timeout_secs(&self) -> Result<u64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DELIVERY_TIMEOUT_SECS, "10")?;
        let secs = value.parse::<u64>().unwrap_or(10);
        Ok(if secs == 0 { 10 } else { secs })
    }

    // ===== 展示 =====

    async fn get_default_currency(&self) -> Result<String, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::DEFAULT_CURRENCY, "CNY")?;
        let v = value.trim().to_uppercase();
        Ok(if v.is_empty() { "CNY".to_string() } else { v })
    }
}

// ==========================================
// 配置键常量 (依据 Dunning_Engine_Specs 9)
// ==========================================
pub mod config_keys {
    // 分片与并发
    pub const DISPATCH_CHUNK_SIZE: &str = "dispatch_chunk_size";
    pub const DISPATCH_MAX_CONCURRENCY: &str = "dispatch_max_concurrency";
    pub const REASSIGN_CHUNK_SIZE: &str = "reassign_chunk_size";

    // 外部投递
    pub const DELIVERY_TIMEOUT_SECS: &str = "delivery_timeout_secs";

    // 展示
    pub const DEFAULT_CURRENCY: &str = "default_currency";
}
