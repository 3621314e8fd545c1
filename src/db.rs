// ==========================================
// 应收账款催收系统 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表语句集中于此，二进制入口与测试共用同一份 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// 说明：
/// - init_schema 为幂等建表（CREATE TABLE IF NOT EXISTS），不做破坏性迁移。
/// - 版本号用于**提示/告警**（不做自动迁移），避免静默在旧库上运行导致隐性错误。
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开催收库: 连接 + PRAGMA + SQL 性能探针 + 幂等建表 + 版本戳
pub fn open_dunning_database(db_path: &str) -> rusqlite::Result<Connection> {
    let mut conn = open_sqlite_connection(db_path)?;
    crate::perf::install_sqlite_tracing(&mut conn);
    init_schema(&conn)?;
    Ok(conn)
}

/// 幂等建表
///
/// 约束要点:
/// - workflow_step 对 dunning_workflow 级联删除, (workflow_id, seq_no) 唯一
/// - draft_template 不设步骤外键: 工作流重配后的孤儿模板自然失配,不阻塞删除
/// - dispatch_record 不设模板外键: 模板重新生成(删除+新建)后历史记录保留
/// - ux_dispatch_live 部分唯一索引是幂等口径的数据库兜底
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );

        CREATE TABLE IF NOT EXISTS obligation (
            obligation_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            customer_name TEXT,
            contact_email TEXT,
            contact_phone TEXT,
            contact_outreach_enabled INTEGER NOT NULL DEFAULT 1,
            amount_cents INTEGER NOT NULL DEFAULT 0,
            currency TEXT NOT NULL DEFAULT 'CNY',
            due_date TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN (
                'OPEN', 'IN_PAYMENT_PLAN', 'PAID', 'DISPUTED', 'SETTLED', 'CANCELED'
            )),
            current_bucket TEXT,
            bucket_entered_on TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );
        CREATE INDEX IF NOT EXISTS idx_obligation_owner ON obligation(owner_id);
        CREATE INDEX IF NOT EXISTS idx_obligation_status ON obligation(status);
        CREATE INDEX IF NOT EXISTS idx_obligation_bucket ON obligation(current_bucket);

        CREATE TABLE IF NOT EXISTS owner_profile (
            owner_id TEXT PRIMARY KEY,
            outreach_paused INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );

        CREATE TABLE IF NOT EXISTS dunning_workflow (
            workflow_id TEXT PRIMARY KEY,
            owner_id TEXT,
            bucket TEXT NOT NULL,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 0,
            locked INTEGER NOT NULL DEFAULT 0,
            cloned_from TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );
        CREATE INDEX IF NOT EXISTS idx_workflow_bucket ON dunning_workflow(bucket);
        CREATE INDEX IF NOT EXISTS idx_workflow_owner ON dunning_workflow(owner_id);

        CREATE TABLE IF NOT EXISTS workflow_step (
            step_id TEXT PRIMARY KEY,
            workflow_id TEXT NOT NULL REFERENCES dunning_workflow(workflow_id) ON DELETE CASCADE,
            seq_no INTEGER NOT NULL,
            day_offset INTEGER NOT NULL,
            channel TEXT NOT NULL CHECK(channel IN ('EMAIL', 'SMS')),
            tone TEXT NOT NULL,
            UNIQUE(workflow_id, seq_no)
        );
        CREATE INDEX IF NOT EXISTS idx_step_workflow ON workflow_step(workflow_id);

        CREATE TABLE IF NOT EXISTS draft_template (
            template_id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            bucket TEXT NOT NULL,
            workflow_id TEXT NOT NULL,
            step_id TEXT NOT NULL,
            step_seq_no INTEGER NOT NULL,
            channel TEXT NOT NULL,
            tone TEXT NOT NULL,
            subject TEXT,
            body TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'PENDING_APPROVAL' CHECK(state IN (
                'PENDING_APPROVAL', 'APPROVED', 'DISCARDED'
            )),
            created_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );
        CREATE INDEX IF NOT EXISTS idx_template_owner_bucket ON draft_template(owner_id, bucket);
        CREATE INDEX IF NOT EXISTS idx_template_state ON draft_template(state);
        CREATE INDEX IF NOT EXISTS idx_template_step ON draft_template(step_id);

        CREATE TABLE IF NOT EXISTS dispatch_record (
            dispatch_id TEXT PRIMARY KEY,
            obligation_id TEXT NOT NULL,
            template_id TEXT NOT NULL,
            channel TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK(outcome IN ('DELIVERED', 'FAILED')),
            failure_reason TEXT,
            dispatched_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        );
        CREATE INDEX IF NOT EXISTS idx_dispatch_obligation ON dispatch_record(obligation_id);
        CREATE INDEX IF NOT EXISTS idx_dispatch_template ON dispatch_record(template_id);
        CREATE UNIQUE INDEX IF NOT EXISTS ux_dispatch_live
            ON dispatch_record(obligation_id, template_id)
            WHERE outcome != 'FAILED';

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

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime')),
            PRIMARY KEY (scope_id, key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
