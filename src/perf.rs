// ==========================================
// 性能观测: SQL 计数 + 慢 SQL 告警 + 操作耗时
// ==========================================
// 依据: Collections_Master_Spec.md - PART E 工程结构
// 说明: 计数器为进程级单调值,PerfGuard 记快照差值;
//       发送引擎的分片在 Tokio 里并发执行,差值口径为
//       "本操作期间全进程执行的语句数",不是精确归属
// ==========================================

use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static SQL_TRACING_ON: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

// 进程级语句计数(只增不减)
static SQL_STATEMENTS: AtomicU64 = AtomicU64::new(0);
static SLOW_STATEMENTS: AtomicU64 = AtomicU64::new(0);

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(
            v.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => default,
    }
}

// 慢 SQL 日志里的语句截断;按字符边界截,避免多字节文本切半
fn truncate_sql(sql: &str, max_chars: usize) -> String {
    let flat = sql.trim().replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &flat[..byte_idx]),
        None => flat,
    }
}

/// 给连接挂上 SQLite 语句 trace/profile 回调
///
/// # 开关
/// - Debug 构建默认开启,Release 默认关闭
/// - `AR_DUNNING_PERF_SQL=1` 强制开启
/// - `AR_DUNNING_SLOW_SQL_MS=50` 调整慢 SQL 阈值(毫秒)
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = env_flag("AR_DUNNING_PERF_SQL", cfg!(debug_assertions));
    SQL_TRACING_ON.store(enabled, Ordering::Relaxed);

    if !enabled {
        // 连接可能被复用,关闭时清掉残留回调
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var("AR_DUNNING_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(count_statement));
    conn.profile(Some(report_statement));
}

fn count_statement(_sql: &str) {
    if SQL_TRACING_ON.load(Ordering::Relaxed) {
        SQL_STATEMENTS.fetch_add(1, Ordering::Relaxed);
    }
}

fn report_statement(sql: &str, duration: Duration) {
    if !SQL_TRACING_ON.load(Ordering::Relaxed) {
        return;
    }
    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold > 0 && ms >= threshold {
        SLOW_STATEMENTS.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            target: "slow_sql",
            duration_ms = ms,
            sql = %truncate_sql(sql, 420),
            "slow sql"
        );
    }
}

/// 操作耗时统计 Guard
///
/// 构造时记语句计数快照,Drop 时输出 elapsed_ms 与差值。
///
/// ```ignore
/// let _perf = ar_dunning_engine::perf::PerfGuard::new("api.dispatch_approved_templates");
/// ```
pub struct PerfGuard {
    op: &'static str,
    started: Instant,
    sql_snapshot: u64,
    slow_snapshot: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            started: Instant::now(),
            sql_snapshot: SQL_STATEMENTS.load(Ordering::Relaxed),
            slow_snapshot: SLOW_STATEMENTS.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let sql_count = SQL_STATEMENTS
            .load(Ordering::Relaxed)
            .saturating_sub(self.sql_snapshot);
        let slow_sql_count = SLOW_STATEMENTS
            .load(Ordering::Relaxed)
            .saturating_sub(self.slow_snapshot);

        tracing::info!(
            target: "perf",
            op = self.op,
            elapsed_ms,
            sql_count,
            slow_sql_count,
            "done"
        );
    }
}
