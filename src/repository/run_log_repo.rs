// ==========================================
// 应收账款催收系统 - 引擎运行日志仓储
// ==========================================
// 依据: Collections_Master_Spec.md - PART A3 审计增强
// 红线: 三个批量操作每次运行必须写入 started 行,结束时回填结果
// ==========================================

use crate::domain::run_log::EngineRunLog;
use crate::domain::types::RunStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use tracing::warn;

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub struct RunLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunLogRepository {
    /// 创建仓储并确保审计表存在
    ///
    /// # 说明
    /// - 建表失败只告警不中断:审计能力降级,业务操作继续
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let repo = Self { conn };
        if let Err(e) = repo.ensure_table() {
            warn!("创建 engine_run_log 表失败,运行审计不可用: {}", e);
        }
        repo
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_table(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS engine_run_log (
                run_id TEXT PRIMARY KEY,
                operation TEXT NOT NULL,
                owner_scope TEXT NOT NULL,
                run_date TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                duration_ms INTEGER,
                status TEXT NOT NULL CHECK(status IN ('RUNNING', 'COMPLETED', 'PARTIAL', 'FAILED')),
                summary_json TEXT,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_run_log_started ON engine_run_log(started_at DESC);
            "#,
        )?;
        Ok(())
    }

    /// 记录运行开始（状态 RUNNING）
    pub fn insert_started(&self, run: &EngineRunLog) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO engine_run_log (
                run_id, operation, owner_scope, run_date,
                started_at, completed_at, duration_ms, status,
                summary_json, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, NULL, NULL)
            "#,
            params![
                run.run_id,
                run.operation,
                run.owner_scope,
                run.run_date.format("%Y-%m-%d").to_string(),
                run.started_at.format(DATETIME_FMT).to_string(),
                run.status.to_db_str(),
            ],
        )?;
        Ok(())
    }

    /// 回填运行结果
    ///
    /// # 说明
    /// - 耗时按 started_at 与当前时间之差计算
    pub fn mark_completed(
        &self,
        run_id: &str,
        status: RunStatus,
        summary_json: Option<&JsonValue>,
        error_message: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let started_at = {
            let mut stmt =
                tx.prepare("SELECT started_at FROM engine_run_log WHERE run_id = ?1")?;
            match stmt.query_row(params![run_id], |row| row.get::<_, String>(0)) {
                Ok(s) => s,
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    return Err(RepositoryError::NotFound {
                        entity: "EngineRunLog".to_string(),
                        id: run_id.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        let now = Local::now().naive_local();
        let duration_ms = NaiveDateTime::parse_from_str(&started_at, DATETIME_FMT)
            .map(|s| now.signed_duration_since(s).num_milliseconds().max(0))
            .unwrap_or(0);

        tx.execute(
            r#"
            UPDATE engine_run_log
            SET completed_at = ?1, duration_ms = ?2, status = ?3,
                summary_json = ?4, error_message = ?5
            WHERE run_id = ?6
            "#,
            params![
                now.format(DATETIME_FMT).to_string(),
                duration_ms,
                status.to_db_str(),
                summary_json.map(|v| v.to_string()),
                error_message,
                run_id,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// 最近的运行记录(新记录在前)
    pub fn recent_runs(&self, limit: usize) -> RepositoryResult<Vec<EngineRunLog>> {
        let conn = self.get_conn()?;
        // LIMIT 拼常量而非绑定参数,规避部分 SQLite 版本的参数限制
        let sql = format!(
            "{} ORDER BY started_at DESC, run_id DESC LIMIT {}",
            SELECT_RUN_LOG,
            limit.min(1000)
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_row_to_run_log)?;
        Ok(rows.collect::<SqliteResult<Vec<_>>>()?)
    }
}

const SELECT_RUN_LOG: &str = r#"
SELECT
    run_id, operation, owner_scope, run_date,
    started_at, completed_at, duration_ms, status,
    summary_json, error_message
FROM engine_run_log
"#;

fn map_row_to_run_log(row: &Row) -> SqliteResult<EngineRunLog> {
    let run_date_str: String = row.get(3)?;
    let run_date = NaiveDate::parse_from_str(&run_date_str, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let started_at_str: String = row.get(4)?;
    let started_at = NaiveDateTime::parse_from_str(&started_at_str, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status_str: String = row.get(7)?;
    let summary_raw: Option<String> = row.get(8)?;

    Ok(EngineRunLog {
        run_id: row.get(0)?,
        operation: row.get(1)?,
        owner_scope: row.get(2)?,
        run_date,
        started_at,
        completed_at: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FMT).ok()),
        duration_ms: row.get(6)?,
        status: RunStatus::from_str(&status_str),
        summary_json: summary_raw.and_then(|s| serde_json::from_str(&s).ok()),
        error_message: row.get(9)?,
    })
}
